/*!
 * flexdb Server Main Entry Point
 *
 * Starts a TCP listener speaking RESP (with short-form commands
 * accepted for interactive/telnet-style clients) against a single
 * shared, in-memory [`flexdb::Database`]. One thread per connection;
 * the database's own mutex serializes access across them.
 */

use anyhow::*;
use flexdb::{Database, ProtocolHandler};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

const DEFAULT_ADDR: &str = "127.0.0.1:6380";
const READ_BUF: usize = 4096;

fn handle_connection(mut stream: TcpStream, db: Arc<Database>) -> Result<()> {
    stream.set_nodelay(true).ok();
    let mut handler = ProtocolHandler::new(db.as_ref());
    let mut buf = [0u8; READ_BUF];

    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            handler.handle_connection_close();
            return Ok(());
        }
        handler.handle_data(&buf[..n]);

        loop {
            let op = handler.get_operation();
            if let Some(data) = &op.data_to_send {
                if let Err(e) = stream.write_all(data) {
                    handler.handle_send_timeout();
                    return Err(e.into());
                }
            }
            if op.close {
                return Ok(());
            }
            if op.data_to_send.is_none() {
                break;
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let addr = std::env::var("FLEXDB_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr)?;
    log::info!("flexdb listening on {addr}");

    let db = Arc::new(Database::new());

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                log::warn!("accept failed: {e}");
                continue;
            }
        };
        let peer = stream.peer_addr().ok();
        let db = Arc::clone(&db);
        thread::spawn(move || {
            if let Err(e) = handle_connection(stream, db) {
                log::warn!("connection {peer:?} ended: {e}");
            }
        });
    }

    Ok(())
}
