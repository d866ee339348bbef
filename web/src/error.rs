use std::error::Error as StdError;

use ::sse::{Error as SseError, ErrorKind};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::*;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error(SseError);

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.0)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{}", self.0)
    }
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self.0.error_kind {
            ErrorKind::UnknownConnection => StatusCode::NOT_FOUND,
            ErrorKind::ConnectionClosed | ErrorKind::AlreadyClosed => StatusCode::GONE,
            ErrorKind::ServerClosed => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::StreamingUnsupported
            | ErrorKind::AlreadyServing
            | ErrorKind::Write
            | ErrorKind::InvalidHeader => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Responding {status}: {}", self.0);
        } else {
            debug!("Responding {status}: {}", self.0);
        }

        let reason = status.canonical_reason().unwrap_or("ERROR").to_uppercase();
        (status, reason).into_response()
    }
}

impl<E> From<E> for Error
where
    E: Into<SseError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
