/*!
 * RESP Wire Codec
 *
 * Parsing and writing of the Redis Serialization Protocol:
 * <https://redis.io/docs/latest/develop/reference/protocol-spec/>. The
 * parser is push-style — `handle_data` is fed arbitrary byte chunks as
 * they arrive off the wire and reports whether a complete [`Value`] is
 * ready, so it can sit behind a non-blocking socket without its own
 * buffering or blocking reads.
 *
 * ```text
 * +OK\r\n                 simple string
 * -ERR message\r\n        error
 * :1000\r\n               integer
 * $6\r\nfoobar\r\n        bulk string
 * $-1\r\n                 null (bulk form)
 * *2\r\n$3\r\nfoo\r\n...  array
 * *-1\r\n                 null (array form)
 * ```
 */

use crate::error::Error;
use crate::value::{DefaultValueFactory, Segment, Value, ValueFactory, Visitor};

/// Sink for raw bytes, implemented by anything a [`Writer`] can target:
/// an in-memory buffer, a socket, an outgoing-queue adapter.
pub trait DataSink {
    fn handle_data(&mut self, data: &[u8]);
}

impl DataSink for Vec<u8> {
    fn handle_data(&mut self, data: &[u8]) {
        self.extend_from_slice(data);
    }
}

const SOURCE_ID: &str = "<Parser>";

fn syntax_error() -> Error {
    Error::file_format(SOURCE_ID, crate::error::messages::SYNTAX_ERROR)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntKind {
    Integer,
    Bulk,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sign {
    Virgin,
    Positive,
    PositiveDigits,
    Negative,
    NegativeDigits,
}

enum State {
    Root,
    /// `+`/`-` line: `success` picks string-vs-error on completion.
    Str { success: bool, value: Vec<u8> },
    Int {
        kind: IntKind,
        sign: Sign,
        value: i32,
    },
    /// Reading `size` remaining payload bytes, then a trailing CRLF.
    Bulk { remaining: u32, value: Vec<u8>, trailing: bool },
    /// Whitespace-delimited short form (`setAcceptShortForm`).
    Short { accumulator: Vec<u8> },
}

/// One pending array: how many more elements it needs, and what it has
/// collected so far. A stack of these replaces the reference
/// implementation's recursive `Parser`-inside-`ArrayState` so arrays of
/// arrays don't need actual call-stack recursion.
struct Frame {
    remaining: u32,
    values: Segment,
}

/// Push-mode RESP decoder. Generic over the [`ValueFactory`] used to
/// mint the primitives it parses; defaults to [`DefaultValueFactory`].
pub struct Parser<F: ValueFactory = DefaultValueFactory> {
    accept_short: bool,
    factory: F,
    state: State,
    stack: Vec<Frame>,
    ready: bool,
    value: Option<Value>,
}

impl Parser<DefaultValueFactory> {
    pub fn new() -> Self {
        Parser::with_factory(DefaultValueFactory)
    }
}

impl Default for Parser<DefaultValueFactory> {
    fn default() -> Self {
        Parser::new()
    }
}

impl<F: ValueFactory> Parser<F> {
    pub fn with_factory(factory: F) -> Self {
        Parser {
            accept_short: false,
            factory,
            state: State::Root,
            stack: Vec::new(),
            ready: false,
            value: None,
        }
    }

    /// Accept whitespace-delimited "short form" lines (a line of bare
    /// words, parsed as an array of strings) in addition to the
    /// standard typed forms. Useful for interactive/telnet-style
    /// clients that don't speak RESP arrays.
    pub fn set_accept_short_form(&mut self, accept_short: bool) {
        self.accept_short = accept_short;
    }

    /// Consume as much of `data` as is needed to complete one value,
    /// advancing `*data` past what was consumed. Returns `true` once a
    /// complete value (possibly null) is ready for [`Parser::extract`].
    pub fn handle_data(&mut self, data: &mut &[u8]) -> Result<bool, Error> {
        while !self.ready && !data.is_empty() {
            self.step(data)?;
        }
        Ok(self.ready)
    }

    /// Take the parsed result and reset the parser to read the next
    /// value. Must only be called after `handle_data` returned `true`.
    pub fn extract(&mut self) -> Option<Value> {
        debug_assert!(self.ready, "extract: no value ready");
        self.ready = false;
        self.state = State::Root;
        self.stack.clear();
        self.value.take()
    }

    fn step(&mut self, data: &mut &[u8]) -> Result<(), Error> {
        match &mut self.state {
            State::Root => {
                let byte = data[0];
                *data = &data[1..];
                self.state = match byte {
                    b'+' => State::Str { success: true, value: Vec::new() },
                    b'-' => State::Str { success: false, value: Vec::new() },
                    b':' => State::Int { kind: IntKind::Integer, sign: Sign::Virgin, value: 0 },
                    b'$' => State::Int { kind: IntKind::Bulk, sign: Sign::Virgin, value: 0 },
                    b'*' => State::Int { kind: IntKind::Array, sign: Sign::Virgin, value: 0 },
                    c if self.accept_short && self.stack.is_empty() && c.is_ascii_alphabetic() => {
                        State::Short { accumulator: vec![c] }
                    }
                    _ => return Err(syntax_error()),
                };
                Ok(())
            }
            State::Str { .. } => self.step_str(data),
            State::Int { .. } => self.step_int(data),
            State::Bulk { .. } => self.step_bulk(data),
            State::Short { .. } => self.step_short(data),
        }
    }

    fn step_str(&mut self, data: &mut &[u8]) -> Result<(), Error> {
        let (success, value) = match &mut self.state {
            State::Str { success, value } => (*success, value),
            _ => unreachable!(),
        };
        while !data.is_empty() {
            let c = data[0];
            *data = &data[1..];
            match c {
                b'\r' => {}
                b'\n' => {
                    let text = String::from_utf8_lossy(value).into_owned();
                    let result = if success {
                        self.factory.create_string(std::mem::take(value))
                    } else {
                        self.factory.create_error(SOURCE_ID, &text)
                    };
                    self.finish(result);
                    return Ok(());
                }
                c => value.push(c),
            }
        }
        Ok(())
    }

    fn step_int(&mut self, data: &mut &[u8]) -> Result<(), Error> {
        loop {
            if data.is_empty() {
                return Ok(());
            }
            let c = data[0];
            let (kind, sign, value) = match &mut self.state {
                State::Int { kind, sign, value } => (*kind, sign, value),
                _ => unreachable!(),
            };
            match c {
                b'+' if *sign == Sign::Virgin => {
                    *data = &data[1..];
                    *sign = Sign::Positive;
                }
                b'-' if *sign == Sign::Virgin => {
                    *data = &data[1..];
                    *sign = Sign::Negative;
                }
                b'0'..=b'9' => {
                    *data = &data[1..];
                    let digit = (c - b'0') as i32;
                    if *sign == Sign::Negative || *sign == Sign::NegativeDigits {
                        if *value < i32::MIN / 10
                            || (*value != 0 && 10i32.wrapping_mul(*value).wrapping_sub(i32::MIN) < digit)
                        {
                            return Err(syntax_error());
                        }
                        *value = 10 * *value - digit;
                        *sign = Sign::NegativeDigits;
                    } else {
                        if *value > i32::MAX / 10 || i32::MAX - 10 * *value < digit {
                            return Err(syntax_error());
                        }
                        *value = 10 * *value + digit;
                        *sign = Sign::PositiveDigits;
                    }
                }
                b'\r' => {
                    *data = &data[1..];
                }
                b'\n' => {
                    *data = &data[1..];
                    if *sign != Sign::PositiveDigits && *sign != Sign::NegativeDigits {
                        return Err(syntax_error());
                    }
                    let value = *value;
                    self.finish_int(kind, value)?;
                    return Ok(());
                }
                _ => return Err(syntax_error()),
            }
        }
    }

    fn finish_int(&mut self, kind: IntKind, value: i32) -> Result<(), Error> {
        match kind {
            IntKind::Integer => {
                let v = self.factory.create_integer(value);
                self.finish(v);
            }
            IntKind::Array => {
                if value < 0 {
                    self.finish(None);
                } else if value == 0 {
                    // Must not create a state that could consume zero
                    // bytes: a zero-length array finishes immediately.
                    let v = self.factory.create_vector(Segment::new());
                    self.finish(v);
                } else {
                    self.stack.push(Frame {
                        remaining: value as u32,
                        values: Segment::new(),
                    });
                    self.state = State::Root;
                }
            }
            IntKind::Bulk => {
                if value < 0 {
                    self.finish(None);
                } else if value == 0 {
                    self.state = State::Bulk {
                        remaining: 0,
                        value: Vec::new(),
                        trailing: true,
                    };
                } else {
                    self.state = State::Bulk {
                        remaining: value as u32,
                        value: Vec::with_capacity(value as usize),
                        trailing: false,
                    };
                }
            }
        }
        Ok(())
    }

    fn step_bulk(&mut self, data: &mut &[u8]) -> Result<(), Error> {
        loop {
            let (remaining, value, trailing) = match &mut self.state {
                State::Bulk { remaining, value, trailing } => (remaining, value, trailing),
                _ => unreachable!(),
            };
            if *remaining > 0 {
                let take = (*remaining as usize).min(data.len());
                value.extend_from_slice(&data[..take]);
                *data = &data[take..];
                *remaining -= take as u32;
                if *remaining == 0 {
                    *trailing = true;
                }
                if data.is_empty() {
                    return Ok(());
                }
                continue;
            }
            debug_assert!(*trailing);
            if data.is_empty() {
                return Ok(());
            }
            let c = data[0];
            *data = &data[1..];
            match c {
                b'\r' => {}
                b'\n' => {
                    let value = std::mem::take(value);
                    let result = self.factory.create_string(value);
                    self.finish(result);
                    return Ok(());
                }
                _ => return Err(syntax_error()),
            }
        }
    }

    fn step_short(&mut self, data: &mut &[u8]) -> Result<(), Error> {
        let accumulator = match &mut self.state {
            State::Short { accumulator } => accumulator,
            _ => unreachable!(),
        };
        while !data.is_empty() {
            let c = data[0];
            *data = &data[1..];
            match c {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    // The short-form line owns one frame on the stack
                    // for the duration of the line, even though it
                    // isn't nested inside a real array.
                    if self.stack.is_empty() {
                        self.stack.push(Frame {
                            remaining: u32::MAX,
                            values: Segment::new(),
                        });
                    }
                    if !accumulator.is_empty() {
                        let word = std::mem::take(accumulator);
                        self.stack.last_mut().unwrap().values.push_back_string(word);
                    }
                    if c == b'\n' {
                        let frame = self.stack.pop().expect("short-form frame present");
                        let v = self.factory.create_vector(frame.values);
                        self.finish(v);
                        return Ok(());
                    }
                }
                c => accumulator.push(c),
            }
        }
        Ok(())
    }

    /// A leaf value (or null) completed. Either it is the whole result,
    /// or it belongs to the array frame on top of the stack — which may
    /// itself complete and bubble up through further nested frames.
    fn finish(&mut self, mut result: Option<Value>) {
        loop {
            match self.stack.last_mut() {
                None => {
                    self.value = result;
                    self.ready = true;
                    self.state = State::Root;
                    return;
                }
                Some(frame) => {
                    frame.values.push_back(result);
                    frame.remaining -= 1;
                    if frame.remaining != 0 {
                        self.state = State::Root;
                        return;
                    }
                    let frame = self.stack.pop().unwrap();
                    result = self.factory.create_vector(frame.values);
                }
            }
        }
    }
}

/// Writes [`Value`]s as canonical RESP bytes onto a [`DataSink`].
pub struct Writer<'a, S: DataSink> {
    sink: &'a mut S,
}

impl<'a, S: DataSink> Writer<'a, S> {
    pub fn new(sink: &'a mut S) -> Self {
        Writer { sink }
    }

    fn write(&mut self, bytes: &[u8]) {
        self.sink.handle_data(bytes);
    }

    /// `*-1\r\n` / `$-1\r\n` via [`crate::value::visit`] — write a
    /// possibly-null value.
    pub fn write_value(&mut self, value: Option<&Value>) {
        crate::value::visit(value, self);
    }

    /// `-source: text\r\n`, trimmed to the first line.
    pub fn send_error(&mut self, text: &str) {
        self.visit_error(SOURCE_ID, text);
    }

    /// `+text\r\n` — used for simple acknowledgement replies like `OK`.
    pub fn send_success(&mut self, text: &str) {
        self.write(b"+");
        self.write(text.as_bytes());
        self.write(b"\r\n");
    }

}

impl<'a, S: DataSink> Visitor for Writer<'a, S> {
    fn visit_string(&mut self, str: &[u8]) {
        self.write(format!("${}\r\n", str.len()).as_bytes());
        self.write(str);
        self.write(b"\r\n");
    }

    fn visit_integer(&mut self, iv: i32) {
        self.visit_string(crate::format::decimal(iv).as_bytes());
    }

    fn visit_float(&mut self, fv: f64) {
        self.visit_string(crate::format::general_float(fv).as_bytes());
    }

    fn visit_boolean(&mut self, bv: bool) {
        self.visit_string(if bv { b"1" } else { b"0" });
    }

    fn visit_hash(&mut self, hv: &crate::value::Hash) {
        let keys = hv.keys();
        let n = keys.len();
        self.write(format!("*{}\r\n", 2 * n).as_bytes());
        for i in 0..n {
            let name = keys.get_name_by_index(i).unwrap_or("");
            self.visit_string(name.as_bytes());
            self.write_value(hv.values().get(i));
        }
    }

    fn visit_vector(&mut self, vv: &crate::value::Vector) {
        let seg = vv.segment();
        self.write(format!("*{}\r\n", seg.len()).as_bytes());
        for i in 0..seg.len() {
            self.write_value(seg.get(i));
        }
    }

    fn visit_error(&mut self, _source: &str, text: &str) {
        let line = match text.find(['\r', '\n']) {
            Some(n) => &text[..n],
            None => text,
        };
        self.write(b"-");
        self.write(line.as_bytes());
        self.write(b"\r\n");
    }

    fn visit_null(&mut self) {
        self.write(b"$-1\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Access;

    fn parse_complete(bytes: &[u8]) -> Option<Value> {
        let mut parser = Parser::new();
        let mut rest = bytes;
        let ready = parser.handle_data(&mut rest).unwrap();
        assert!(ready, "expected a complete value from {:?}", bytes);
        assert!(rest.is_empty());
        parser.extract()
    }

    #[test]
    fn parses_simple_string() {
        let v = parse_complete(b"+OK\r\n").unwrap();
        assert_eq!(Access::new(Some(&v)).to_string().unwrap(), b"OK");
    }

    #[test]
    fn parses_error() {
        let v = parse_complete(b"-ERR bad\r\n").unwrap();
        assert_eq!(Access::new(Some(&v)).is_error().unwrap().1, "ERR bad");
    }

    #[test]
    fn parses_integer_with_sign() {
        let v = parse_complete(b":-42\r\n").unwrap();
        assert_eq!(Access::new(Some(&v)).to_integer().unwrap(), -42);
    }

    #[test]
    fn parses_bulk_string_and_null() {
        let v = parse_complete(b"$6\r\nfoobar\r\n").unwrap();
        assert_eq!(Access::new(Some(&v)).to_string().unwrap(), b"foobar");
        assert!(parse_complete(b"$-1\r\n").is_none());
    }

    #[test]
    fn parses_zero_length_bulk_string() {
        let v = parse_complete(b"$0\r\n\r\n").unwrap();
        assert_eq!(Access::new(Some(&v)).to_string().unwrap(), b"");
    }

    #[test]
    fn parses_array_and_null_array() {
        let v = parse_complete(b"*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n").unwrap();
        let a = Access::new(Some(&v));
        assert_eq!(a.get_array_size().unwrap(), 2);
        assert_eq!(a.index(0).unwrap().to_string().unwrap(), b"foo");
        assert!(parse_complete(b"*-1\r\n").is_none());
    }

    #[test]
    fn parses_zero_length_array() {
        let v = parse_complete(b"*0\r\n").unwrap();
        assert_eq!(Access::new(Some(&v)).get_array_size().unwrap(), 0);
    }

    #[test]
    fn parses_nested_arrays() {
        let v = parse_complete(b"*1\r\n*2\r\n:1\r\n:2\r\n").unwrap();
        let a = Access::new(Some(&v));
        assert_eq!(a.get_array_size().unwrap(), 1);
        assert_eq!(a.index(0).unwrap().get_array_size().unwrap(), 2);
    }

    #[test]
    fn short_form_splits_on_whitespace() {
        let mut parser = Parser::new();
        parser.set_accept_short_form(true);
        let mut rest: &[u8] = b"GET foo\r\n";
        assert!(parser.handle_data(&mut rest).unwrap());
        let v = parser.extract().unwrap();
        let a = Access::new(Some(&v));
        assert_eq!(a.get_array_size().unwrap(), 2);
        assert_eq!(a.index(0).unwrap().to_string().unwrap(), b"GET");
        assert_eq!(a.index(1).unwrap().to_string().unwrap(), b"foo");
    }

    #[test]
    fn short_form_is_rejected_below_top_level() {
        let mut parser = Parser::new();
        parser.set_accept_short_form(true);
        let mut rest: &[u8] = b"*1\r\nGET foo\r\n";
        assert!(parser.handle_data(&mut rest).is_err());
    }

    #[test]
    fn rejects_unknown_type_byte() {
        let mut parser = Parser::new();
        let mut rest: &[u8] = b"?\r\n";
        assert!(parser.handle_data(&mut rest).is_err());
    }

    #[test]
    fn feeding_byte_by_byte_matches_feeding_whole() {
        let whole = parse_complete(b"*2\r\n$3\r\nfoo\r\n:7\r\n").unwrap();

        let mut parser = Parser::new();
        let input = b"*2\r\n$3\r\nfoo\r\n:7\r\n";
        let mut ready = false;
        for byte in input {
            let mut one = std::slice::from_ref(byte);
            ready = parser.handle_data(&mut one).unwrap();
            if ready {
                break;
            }
        }
        assert!(ready);
        let piecewise = parser.extract().unwrap();
        assert_eq!(
            Access::new(Some(&whole)).to_string().unwrap(),
            Access::new(Some(&piecewise)).to_string().unwrap()
        );
    }

    #[test]
    fn writer_round_trips_values() {
        // Scalars are always written as bulk strings, even integers —
        // matching the reference writer's visitInteger/visitFloat/
        // visitBoolean, which all delegate to visitString.
        let mut out = Vec::new();
        {
            let mut w = Writer::new(&mut out);
            w.write_value(Some(&Value::Integer(42)));
        }
        assert_eq!(out, b"$2\r\n42\r\n");

        let mut out = Vec::new();
        {
            let mut w = Writer::new(&mut out);
            w.write_value(None);
        }
        assert_eq!(out, b"$-1\r\n");
    }

    #[test]
    fn writer_send_error_trims_to_first_line() {
        let mut out = Vec::new();
        Writer::new(&mut out).send_error("bad thing\nmore detail");
        assert_eq!(out, b"-bad thing\r\n");
    }
}
