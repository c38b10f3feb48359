/*!
 * Error Taxonomy
 *
 * Three kinds of failure are enough to describe everything that can go
 * wrong in the core: a malformed wire value, a command that was executed
 * but rejected, and a value that could not be coerced to the type a
 * caller asked for. A fourth variant backs test assertions.
 */

/// The error taxonomy shared by the parser, the in-memory database, and
/// `Access`'s fuzzy conversions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The peer signalled an error, or a command's precondition was
    /// violated (wrong type, bad argument count, unknown verb).
    #[error("{source}: {text}")]
    RemoteError {
        /// Name of whoever raised the error (`<InternalDatabase>`, …).
        source: String,
        text: String,
    },

    /// A value could not be interpreted as the type the caller requested.
    #[error("{0}")]
    InvalidData(String),

    /// The RESP parser detected a syntax violation. Not recoverable
    /// within a session.
    #[error("{source}: {text}")]
    FileFormat { source: String, text: String },

    /// Invariant violated; used by tests.
    #[error("assertion failed: {text} at {location}")]
    AssertionFailed { text: String, location: String },
}

impl Error {
    pub fn remote(source: impl Into<String>, text: impl Into<String>) -> Error {
        Error::RemoteError {
            source: source.into(),
            text: text.into(),
        }
    }

    pub fn invalid_data(text: impl Into<String>) -> Error {
        Error::InvalidData(text.into())
    }

    pub fn file_format(source: impl Into<String>, text: impl Into<String>) -> Error {
        Error::FileFormat {
            source: source.into(),
            text: text.into(),
        }
    }

    /// The one-line message a RESP/TEXT peer would see, truncated at the
    /// first CR or LF the way `resp::Writer::visitError` does.
    pub fn wire_message(&self) -> String {
        let text = match self {
            Error::RemoteError { text, .. } => text.clone(),
            Error::InvalidData(text) => text.clone(),
            Error::FileFormat { text, .. } => text.clone(),
            Error::AssertionFailed { text, .. } => text.clone(),
        };
        match text.find(['\r', '\n']) {
            Some(n) => text[..n].to_string(),
            None => text,
        }
    }
}

/// Messages reused verbatim by more than one caller, mirroring
/// `afl::string::Messages`.
pub mod messages {
    pub const INVALID_NUMBER: &str = "Invalid number";
    pub const SYNTAX_ERROR: &str = "Syntax error";
    pub const INVALID_OPERATION: &str = "Invalid operation";
}

pub type Result<T> = std::result::Result<T, Error>;
