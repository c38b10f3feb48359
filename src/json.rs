/*!
 * JSON Writer
 *
 * Formats a [`Value`](crate::value::Value) tree as JSON text through the
 * same [`Visitor`] dispatch the RESP writer uses. Pretty-printing is
 * optional and driven by two knobs: a line-length target (wrap once a
 * line would exceed it) and an indent step (nest hashes/vectors onto
 * their own lines, `indent_step` spaces per level). With both left at
 * zero the output is a single compact line.
 */

use crate::bits::SmallSet;
use crate::resp::DataSink;
use crate::value::{Hash, Value, Vector, Visitor};

const NEWLINE_BEFORE: u32 = 0;
const NEWLINE_AFTER: u32 = 1;
const INDENT_AFTER: u32 = 2;
const UNDENT_BEFORE: u32 = 3;

/// Writes [`Value`]s as JSON onto a [`DataSink`].
pub struct Writer<'a, S: DataSink> {
    line_length: usize,
    indent_step: usize,
    sink: &'a mut S,

    current_line_length: usize,
    current_indent_level: usize,
    current_allow_newline: bool,
}

impl<'a, S: DataSink> Writer<'a, S> {
    pub fn new(sink: &'a mut S) -> Self {
        Writer {
            line_length: 0,
            indent_step: 0,
            sink,
            current_line_length: 0,
            current_indent_level: 0,
            current_allow_newline: false,
        }
    }

    /// Output lines are wrapped to around this many bytes (not a hard
    /// limit). `0` (the default) means no wrapping.
    pub fn set_line_length(&mut self, line_length: usize) {
        self.line_length = line_length;
    }

    /// Nonzero enables pretty-printing: hashes and vectors break onto
    /// multiple lines, indented by this many spaces per level.
    pub fn set_indent_step(&mut self, indent_step: usize) {
        self.indent_step = indent_step;
    }

    pub fn write_value(&mut self, value: Option<&Value>) {
        crate::value::visit(value, self);
    }

    /// `token` is written as raw bytes, never reinterpreted as Unicode
    /// scalars — it may already hold UTF-8 multi-byte sequences escaped
    /// by [`write_string_literal`], which must pass through unchanged.
    fn write(&mut self, token: &[u8], flags: SmallSet) {
        if flags.contains(UNDENT_BEFORE) {
            self.current_indent_level = self.current_indent_level.saturating_sub(self.indent_step);
        }

        let newline_allowed = flags.contains(NEWLINE_BEFORE) || self.current_allow_newline;
        let newline_wanted = self.indent_step > 0
            || (self.line_length != 0 && self.current_line_length + token.len() > self.line_length);
        if newline_allowed && newline_wanted {
            self.sink.handle_data(b"\n");
            if self.current_indent_level > 0 {
                let indent = " ".repeat(self.current_indent_level);
                self.sink.handle_data(indent.as_bytes());
            }
            self.current_line_length = self.current_indent_level;
        }

        self.sink.handle_data(token);
        self.current_line_length += token.len();

        if flags.contains(INDENT_AFTER) {
            self.current_indent_level += self.indent_step;
        }
        self.current_allow_newline = flags.contains(NEWLINE_AFTER);
    }

    /// Bytes `>= 32` that aren't `"`/`\` are passed through unchanged —
    /// never reinterpreted as a Unicode scalar, so a byte `>= 0x80` that
    /// is part of a UTF-8 multi-byte sequence in `str` round-trips
    /// instead of being re-encoded into a different, longer sequence.
    fn write_string_literal(&mut self, str: &[u8]) {
        let mut out = Vec::with_capacity(str.len() + 2);
        out.push(b'"');
        for &ch in str {
            match ch {
                b'\\' => out.extend_from_slice(b"\\\\"),
                b'"' => out.extend_from_slice(b"\\\""),
                b'\n' => out.extend_from_slice(b"\\n"),
                b'\r' => out.extend_from_slice(b"\\r"),
                0x08 => out.extend_from_slice(b"\\b"),
                b'\t' => out.extend_from_slice(b"\\t"),
                0x0C => out.extend_from_slice(b"\\f"),
                _ if ch >= 32 => out.push(ch),
                _ => out.extend_from_slice(format!("\\u{}", crate::format::hex4_upper(ch)).as_bytes()),
            }
        }
        out.push(b'"');
        self.write(&out, SmallSet::empty());
    }
}

impl<'a, S: DataSink> Visitor for Writer<'a, S> {
    fn visit_string(&mut self, str: &[u8]) {
        self.write_string_literal(str);
    }

    fn visit_integer(&mut self, iv: i32) {
        self.write(crate::format::decimal(iv).as_bytes(), SmallSet::empty());
    }

    fn visit_float(&mut self, fv: f64) {
        self.write(crate::format::general_float(fv).as_bytes(), SmallSet::empty());
    }

    fn visit_boolean(&mut self, bv: bool) {
        self.write(if bv { b"true" } else { b"false" }, SmallSet::empty());
    }

    fn visit_hash(&mut self, hv: &Hash) {
        self.write(b"{", SmallSet::empty().with(NEWLINE_AFTER).with(INDENT_AFTER));
        let keys = hv.keys();
        for i in 0..keys.len() {
            if i != 0 {
                self.write(b",", SmallSet::empty().with(NEWLINE_AFTER));
            }
            self.write_string_literal(keys.get_name_by_index(i).unwrap_or("").as_bytes());
            self.write(b":", SmallSet::empty());
            self.write_value(hv.values().get(i));
        }
        self.write(b"}", SmallSet::empty().with(NEWLINE_BEFORE).with(UNDENT_BEFORE));
    }

    fn visit_vector(&mut self, vv: &Vector) {
        self.write(b"[", SmallSet::empty().with(NEWLINE_AFTER).with(INDENT_AFTER));
        for i in 0..vv.len() {
            if i != 0 {
                self.write(b",", SmallSet::empty().with(NEWLINE_AFTER));
            }
            self.write_value(vv.get(i));
        }
        self.write(b"]", SmallSet::empty().with(NEWLINE_BEFORE).with(UNDENT_BEFORE));
    }

    fn visit_error(&mut self, _source: &str, _text: &str) {
        self.write(b"null", SmallSet::empty());
    }

    fn visit_null(&mut self) {
        self.write(b"null", SmallSet::empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{HashBuilder, Segment};

    fn render(value: &Value, line_length: usize, indent_step: usize) -> String {
        let mut out = Vec::new();
        {
            let mut w = Writer::new(&mut out);
            w.set_line_length(line_length);
            w.set_indent_step(indent_step);
            w.write_value(Some(value));
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn compact_scalar_values() {
        assert_eq!(render(&Value::Integer(42), 0, 0), "42");
        assert_eq!(render(&Value::Boolean(true), 0, 0), "true");
        assert_eq!(render(&Value::string("a\"b"), 0, 0), "\"a\\\"b\"");
    }

    #[test]
    fn control_characters_escape_to_unicode() {
        assert_eq!(render(&Value::string("\x01"), 0, 0), "\"\\u0001\"");
        assert_eq!(render(&Value::string("\n\t"), 0, 0), "\"\\n\\t\"");
    }

    #[test]
    fn compact_vector_has_no_whitespace() {
        let mut seg = Segment::new();
        seg.push_back_integer(1);
        seg.push_back_integer(2);
        let v = Value::Vector(Vector::new(seg));
        assert_eq!(render(&v, 0, 0), "[1,2]");
    }

    #[test]
    fn indented_hash_breaks_onto_lines() {
        let mut b = HashBuilder::new();
        b.set("a", Some(Value::Integer(1)));
        b.set("b", Some(Value::Integer(2)));
        let v = Value::Hash(b.freeze());
        let text = render(&v, 0, 2);
        assert_eq!(text, "{\n  \"a\":1,\n  \"b\":2\n}");
    }

    #[test]
    fn bytes_above_127_pass_through_unchanged() {
        // "café" as UTF-8: 0x63,0x61,0x66,0xC3,0xA9. Writing it must not
        // reinterpret the 0xC3/0xA9 bytes as separate Unicode scalars,
        // which would re-encode them into a longer, different sequence.
        let cafe = vec![0x63, 0x61, 0x66, 0xC3, 0xA9];
        let mut out = Vec::new();
        Writer::new(&mut out).write_value(Some(&Value::string(cafe)));
        assert_eq!(out, b"\"caf\xC3\xA9\"");
        assert_eq!(std::str::from_utf8(&out).unwrap(), "\"café\"");
    }

    #[test]
    fn error_and_null_both_render_as_json_null() {
        assert_eq!(render(&Value::error("<x>", "boom"), 0, 0), "null");
        let mut out = Vec::new();
        Writer::new(&mut out).write_value(None);
        assert_eq!(out, b"null");
    }
}
