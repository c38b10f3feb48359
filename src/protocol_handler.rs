/*!
 * RESP Session Glue
 *
 * Bridges a byte stream to a [`CommandHandler`]: feed incoming bytes to
 * [`ProtocolHandler::handle_data`], drain outgoing replies through
 * [`ProtocolHandler::get_operation`]. One instance per connection.
 *
 * Every complete value read off the wire must be a top-level array (a
 * command and its arguments) — anything else is rejected with
 * `Invalid operation`, mirroring the reference session handler, which
 * only recognizes `visitVector` and fails every other `Visitor` case.
 * A parse error or a stalled write is not recoverable within a
 * session: both latch the handler into `Failed`, which tells the
 * caller to close the connection once the queued replies drain.
 */

use std::collections::VecDeque;

use crate::command::CommandHandler;
use crate::error::{messages, Error};
use crate::resp::{Parser, Writer};
use crate::value::Value;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Sending,
    Failed,
}

/// What the caller should do next: send `data_to_send` (if any) and
/// close the connection once it's flushed if `close` is set.
pub struct Operation {
    pub data_to_send: Option<Vec<u8>>,
    pub close: bool,
}

/// Per-connection RESP session, generic over the [`CommandHandler`] it
/// dispatches commands to.
pub struct ProtocolHandler<'a, H: CommandHandler> {
    ch: &'a H,
    parser: Parser,
    outgoing: VecDeque<Vec<u8>>,
    state: State,
}

impl<'a, H: CommandHandler> ProtocolHandler<'a, H> {
    pub fn new(ch: &'a H) -> Self {
        let mut parser = Parser::new();
        parser.set_accept_short_form(true);
        ProtocolHandler {
            ch,
            parser,
            outgoing: VecDeque::new(),
            state: State::Idle,
        }
    }

    /// Acknowledge the previously-returned send, then report what to
    /// send next (if anything) and whether to close the connection.
    pub fn get_operation(&mut self) -> Operation {
        if self.state == State::Sending {
            self.outgoing.pop_front();
            self.state = State::Idle;
        }

        let data_to_send = if self.state == State::Idle {
            match self.outgoing.front() {
                Some(buf) => {
                    self.state = State::Sending;
                    Some(buf.clone())
                }
                None => None,
            }
        } else {
            None
        };

        Operation { data_to_send, close: self.state == State::Failed }
    }

    /// Feed newly-received bytes. Each complete value is dispatched and
    /// its reply (or error) enqueued; a syntax error fails the session.
    pub fn handle_data(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            match self.parser.handle_data(&mut bytes) {
                Ok(true) => {
                    let value = self.parser.extract();
                    self.handle_new_value(value);
                }
                Ok(false) => break,
                Err(e) => {
                    log::warn!("session failed: {e}");
                    self.state = State::Failed;
                    return;
                }
            }
        }
    }

    /// The peer stalled on a reply it was sent; nothing to do but fail
    /// the session, same as the reference handler.
    pub fn handle_send_timeout(&mut self) {
        log::warn!("send timed out, failing session");
        self.state = State::Failed;
    }

    pub fn handle_connection_close(&mut self) {}

    fn handle_new_value(&mut self, value: Option<Value>) {
        let mut out = Vec::new();
        {
            let mut writer = Writer::new(&mut out);
            match value {
                Some(Value::Vector(vv)) => match self.ch.call(vv.segment()) {
                    Ok(result) => writer.write_value(result.as_ref()),
                    Err(e) => writer.send_error(&wire_message(&e)),
                },
                _ => writer.send_error(messages::INVALID_OPERATION),
            }
        }
        self.outgoing.push_back(out);
    }
}

fn wire_message(e: &Error) -> String {
    e.wire_message()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::make_command;
    use crate::database::Database;

    fn drain(h: &mut ProtocolHandler<'_, Database>) -> Vec<u8> {
        let mut all = Vec::new();
        loop {
            let op = h.get_operation();
            match op.data_to_send {
                Some(data) => all.extend(data),
                None => break,
            }
        }
        all
    }

    #[test]
    fn dispatches_array_command_and_replies() {
        let db = Database::new();
        let mut h = ProtocolHandler::new(&db);
        h.handle_data(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
        let reply = drain(&mut h);
        assert_eq!(reply, b"$2\r\nOK\r\n");
    }

    #[test]
    fn dispatches_short_form_command() {
        let db = Database::new();
        let mut h = ProtocolHandler::new(&db);
        db.call_void(&make_command(["SET", "k", "v"])).unwrap();
        h.handle_data(b"GET k\r\n");
        let reply = drain(&mut h);
        assert_eq!(reply, b"$1\r\nv\r\n");
    }

    #[test]
    fn non_array_top_level_value_is_invalid_operation() {
        let db = Database::new();
        let mut h = ProtocolHandler::new(&db);
        h.handle_data(b"+OK\r\n");
        let reply = drain(&mut h);
        assert_eq!(reply, b"-Invalid operation\r\n");
    }

    #[test]
    fn database_error_is_reported_as_resp_error() {
        let db = Database::new();
        let mut h = ProtocolHandler::new(&db);
        h.handle_data(b"*1\r\n$7\r\nBOGUSOP\r\n");
        let reply = drain(&mut h);
        assert_eq!(reply, b"-Invalid command\r\n");
    }

    #[test]
    fn syntax_error_fails_the_session() {
        let db = Database::new();
        let mut h = ProtocolHandler::new(&db);
        h.handle_data(b"?\r\n");
        assert!(h.get_operation().close);
    }

    #[test]
    fn commands_queue_across_multiple_requests() {
        let db = Database::new();
        let mut h = ProtocolHandler::new(&db);
        h.handle_data(b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n*2\r\n$3\r\nGET\r\n$1\r\nb\r\n");
        let first = h.get_operation();
        assert_eq!(first.data_to_send.unwrap(), b"$-1\r\n");
        let second = h.get_operation();
        assert_eq!(second.data_to_send.unwrap(), b"$-1\r\n");
        assert!(h.get_operation().data_to_send.is_none());
    }
}
