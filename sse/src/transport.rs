//! The boundary between the SSE core and the hosting HTTP server.
//!
//! The core never touches sockets. It needs a response it can set headers on,
//! write frames to, and flush; plus a request-scoped `CancellationToken` that
//! fires when the client goes away or the host shuts down.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::HeaderMap;
use std::io;

#[async_trait]
pub trait ResponseWriter: Send {
    /// Response headers. Changes made after the first `write` or `flush` are ignored.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Whether the writer can push bytes to the client incrementally.
    fn supports_flush(&self) -> bool {
        true
    }

    async fn write(&mut self, frame: Bytes) -> io::Result<()>;

    async fn flush(&mut self) -> io::Result<()>;
}
