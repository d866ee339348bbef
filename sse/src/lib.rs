//! Server-Sent Events (SSE) push messaging.
//!
//! This crate keeps long-lived HTTP responses open and pushes application
//! events down them, one frame at a time, until the client goes away or the
//! server closes the stream.
//!
//! # Architecture
//!
//! - **One serve loop per connection**: every [`Connection`] owns its response
//!   writer and a single-consumer mailbox. Only the task running
//!   [`Connection::serve`] writes to the wire, so frames never interleave.
//! - **Rendezvous mailbox**: a producer calling `write` waits until the serve
//!   loop has taken and written its frame. A slow client pushes back on its
//!   producers instead of growing an unbounded buffer.
//! - **Heartbeats**: when enabled, a timer task feeds comment frames into the
//!   same mailbox so idle proxies don't time the stream out.
//! - **Registry**: a reader/writer locked map from [`ConnectionId`] to
//!   connection. The lock never spans a network write; broadcasts iterate a
//!   snapshot.
//! - **Ephemeral events**: nothing is persisted or replayed. A client that is
//!   not connected misses the event.
//!
//! # Flow
//!
//! 1. The HTTP layer calls [`Server::accept`] with the request's cancellation
//!    token and a [`ResponseWriter`].
//! 2. The server negotiates headers, registers the connection, and returns it.
//! 3. The HTTP layer spawns [`Connection::serve`].
//! 4. Anywhere in the application, [`Server::write`] targets one connection and
//!    [`Server::broadcast`] targets all of them.
//! 5. When the request is cancelled, the connection closes, leaves the registry
//!    and the optional [`DisconnectHandler`] is notified on its own task.
//!
//! # Example
//!
//! ```rust,ignore
//! use sse::{Event, Server};
//!
//! let connection = server.accept(&cancellation, response)?;
//! tokio::spawn(async move { connection.serve().await });
//!
//! server.broadcast(&Event::new("message", "hello").with_id("1")).await;
//! ```
//!
//! # Modules
//!
//! - `event`: the event type and its wire format
//! - `transport`: what the core needs from the hosting HTTP server
//! - `connection`: per-connection lifecycle, mailbox and heartbeat
//! - `registry`: id to connection map
//! - `server`: accept, targeted write, broadcast, configuration and shutdown

pub mod connection;
pub mod error;
pub mod event;
pub mod registry;
pub mod server;
pub mod transport;

#[cfg(test)]
mod testing;

pub use connection::{Connection, ConnectionId};
pub use error::{Error, ErrorKind};
pub use event::{Event, HEARTBEAT_FRAME};
pub use server::{DisconnectHandler, Server};
pub use transport::ResponseWriter;
