/*!
 * Command Interpreter Interface
 *
 * A [`CommandHandler`] executes commands given as a positional list of
 * values and returns a value (or nothing). The in-memory database
 * (`database.rs`) is the reference implementation; the RESP session
 * glue (`protocol_handler.rs`) is the reference caller.
 *
 * Commands with named arguments are out of scope here — a hash can be
 * passed as a single positional argument when that's needed. Most
 * commands are a verb in position 0 followed by scalar arguments, but
 * nothing in this interface assumes that shape.
 */

use crate::error::Error;
use crate::value::{Access, Segment, Value};

/// Interpreter for positional commands.
///
/// `call` and `callVoid` are independent entry points so a caller that
/// doesn't need the result can skip converting/allocating it — an
/// implementation is free to implement one in terms of the other.
pub trait CommandHandler {
    /// Execute `command` and return its result, which may be null.
    /// Implementations should signal failures as `Err`, never as an
    /// `Value::Error`-valued `Ok`.
    fn call(&self, command: &Segment) -> Result<Option<Value>, Error>;

    /// Execute `command`, discarding any result.
    fn call_void(&self, command: &Segment) -> Result<(), Error> {
        self.call(command).map(|_| ())
    }

    /// `call`, then interpret the result as an integer.
    fn call_int(&self, command: &Segment) -> Result<i32, Error> {
        let result = self.call(command)?;
        Access::new(result.as_ref()).to_integer()
    }

    /// `call`, then interpret the result as an optional integer: `None`
    /// if the result was null, `Some` otherwise.
    fn call_optional_int(&self, command: &Segment) -> Result<Option<i32>, Error> {
        let result = self.call(command)?;
        match result {
            None => Ok(None),
            Some(v) => Access::new(Some(&v)).to_integer().map(Some),
        }
    }

    /// `call`, then interpret the result as a string.
    fn call_string(&self, command: &Segment) -> Result<Vec<u8>, Error> {
        let result = self.call(command)?;
        Access::new(result.as_ref()).to_string()
    }
}

/// Build a command [`Segment`] from string-like arguments — the common
/// case of a verb followed by scalar arguments.
pub fn make_command<I, S>(args: I) -> Segment
where
    I: IntoIterator<Item = S>,
    S: Into<Vec<u8>>,
{
    let mut seg = Segment::new();
    for a in args {
        seg.push_back_string(a);
    }
    seg
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    impl CommandHandler for Echo {
        fn call(&self, command: &Segment) -> Result<Option<Value>, Error> {
            Ok(command.get(0).cloned())
        }
    }

    #[test]
    fn call_int_converts_result() {
        let h = Echo;
        let cmd = make_command(["42"]);
        assert_eq!(h.call_int(&cmd).unwrap(), 42);
    }

    #[test]
    fn call_optional_int_distinguishes_null() {
        let h = Echo;
        let empty = Segment::new();
        assert_eq!(h.call_optional_int(&empty).unwrap(), None);
    }
}
