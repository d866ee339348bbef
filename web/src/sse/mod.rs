//! SSE HTTP adapter for the web layer.
//!
//! The core SSE infrastructure (Server, Connection, ConnectionRegistry, Event)
//! lives in the `sse` crate. This module only bridges it to axum: a channel
//! backed `ResponseWriter` and the handler that opens a stream.

pub mod handler;
pub(crate) mod response;
