//! Errors for the `sirc` crate.

use std::io;

use thiserror::Error;

use sirc_proto::error::ProtocolError;

/// A `Result` type for `sirc` errors.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Everything the library can fail with.
#[derive(Debug, Error)]
pub enum Error {
    /// Name resolution failed or returned an empty address list.
    #[error("could not resolve {host}")]
    Resolve {
        /// The host that failed to resolve.
        host: String,
    },

    /// No resolved candidate address accepted a connection.
    #[error("could not connect to {host}:{port}")]
    Connect {
        /// The destination host.
        host: String,
        /// The destination port.
        port: u16,
    },

    /// An operation did not complete within its budget.
    #[error("operation timed out")]
    Timeout,

    /// The proxy rejected the request or replied with garbage.
    #[error("proxy handshake failed: {0}")]
    Proxy(String),

    /// The TLS handshake or session failed.
    #[error("TLS failure: {0}")]
    Tls(String),

    /// A transport read or write failed.
    #[error("an io error occurred")]
    Io(#[from] io::Error),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Eof,

    /// An incoming line could not be tokenised, or a handler flagged a
    /// protocol violation.
    #[error("protocol error: {0}")]
    Proto(String),

    /// The server rejected our credentials (464, or a must-have SASL
    /// failure).
    #[error("authentication rejected by server")]
    Auth,

    /// The nick mutator gave up while walking nickname collisions.
    #[error("ran out of nicknames")]
    OutOfNicks,

    /// A must-have capability was not offered, or the CAP ACK did not
    /// match the request.
    #[error("capability negotiation failed: {0}")]
    Cap(String),

    /// A single incoming line exceeded the receive buffer.
    #[error("line exceeds the receive buffer")]
    TooLong,

    /// `connect` was called on an object that is already online.
    #[error("already connected")]
    AlreadyConnected,

    /// An operation that needs a live connection found none.
    #[error("not connected")]
    NotConnected,
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Error {
        match e {
            ProtocolError::Io(io) => Error::Io(io),
            ProtocolError::LineTooLong { .. } => Error::TooLong,
            ProtocolError::InvalidMessage { string, .. } => Error::Proto(string),
        }
    }
}

impl From<native_tls::Error> for Error {
    fn from(e: native_tls::Error) -> Error {
        Error::Tls(e.to_string())
    }
}
