//! Error types for the `sse` crate.
//!
//! Follows the same pattern as the other layers: a root `Error` struct holding an
//! `error_kind` and an optional `source` for chaining.

use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// The kinds of failures a connection or the server can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The response writer cannot flush incrementally.
    StreamingUnsupported,
    /// A targeted write named a connection that is not registered.
    UnknownConnection,
    /// A write raced with, or came after, the connection closing.
    ConnectionClosed,
    /// `serve()` was called on a connection that has already closed.
    AlreadyClosed,
    /// `serve()` was called a second time on the same connection.
    AlreadyServing,
    /// The underlying stream failed mid-write.
    Write,
    /// The server has been shut down and accepts no new connections.
    ServerClosed,
    /// A configured custom header name or value is not valid HTTP.
    InvalidHeader,
}

impl Error {
    pub fn new(error_kind: ErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
        }
    }

    pub fn with_source<E>(error_kind: ErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self {
            source: Some(source.into()),
            error_kind,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(error_kind: ErrorKind) -> Self {
        Self::new(error_kind)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            ErrorKind::StreamingUnsupported => "streaming not supported",
            ErrorKind::UnknownConnection => "connection not found",
            ErrorKind::ConnectionClosed => "connection closed",
            ErrorKind::AlreadyClosed => "connection already closed",
            ErrorKind::AlreadyServing => "connection is already being served",
            ErrorKind::Write => "write failed",
            ErrorKind::ServerClosed => "server closed",
            ErrorKind::InvalidHeader => "invalid custom header",
        };
        f.write_str(msg)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "SSE error: {}: {source}", self.error_kind),
            None => write!(f, "SSE error: {}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}
