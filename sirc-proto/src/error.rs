//! IRC protocol errors.

use std::io::Error as IoError;

use thiserror::Error;

/// A `Result` type for IRC `ProtocolError`s.
pub type Result<T> = ::std::result::Result<T, ProtocolError>;

/// An IRC protocol error.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An internal I/O error.
    #[error("an io error occurred")]
    Io(#[from] IoError),

    /// A line exceeded the maximum frame length without a delimiter.
    #[error("line exceeded the maximum length of {max} bytes")]
    LineTooLong {
        /// The configured maximum line length.
        max: usize,
    },

    /// Error for invalid messages.
    #[error("invalid message: {string}")]
    InvalidMessage {
        /// The string that failed to parse.
        string: String,
        /// The detailed message parsing error.
        #[source]
        cause: MessageParseError,
    },
}

/// Errors that occur when parsing messages.
#[derive(Debug, Error)]
pub enum MessageParseError {
    /// The message was empty.
    #[error("empty message")]
    EmptyMessage,

    /// The message began with whitespace.
    #[error("leading whitespace")]
    LeadingWhitespace,

    /// The command was missing (e.g. nothing followed the prefix).
    #[error("missing command")]
    MissingCommand,
}
