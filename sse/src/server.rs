use crate::connection::{Connection, ConnectionId, DisconnectFn};
use crate::error::{Error, ErrorKind, Result};
use crate::event::Event;
use crate::registry::ConnectionRegistry;
use crate::transport::ResponseWriter;
use async_trait::async_trait;
use futures::future::join_all;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE, TRANSFER_ENCODING};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use log::*;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Receives a notification each time a connection closes.
///
/// Notifications run on their own Tokio task, so a slow handler never holds up
/// the connection's teardown.
#[async_trait]
pub trait DisconnectHandler: Send + Sync {
    async fn on_disconnect(&self, connection_id: ConnectionId);
}

/// Settings snapshotted into each connection at accept time.
#[derive(Default)]
struct Settings {
    custom_headers: HeaderMap,
    heartbeat_interval: Duration,
    disconnect_handler: Option<Arc<dyn DisconnectHandler>>,
    closed: bool,
}

/// Accepts SSE streams and routes events to them.
pub struct Server {
    registry: Arc<ConnectionRegistry>,
    settings: RwLock<Settings>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").finish_non_exhaustive()
    }
}

impl Server {
    /// A server with heartbeats disabled and no custom headers.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            settings: RwLock::new(Settings::default()),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Replaces the custom response headers. They are applied after the built-in
    /// SSE headers, so they win on collision. Connections that are already open
    /// keep the headers they were accepted with.
    pub fn set_custom_headers<I, K, V>(&self, headers: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut custom_headers = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_ref().as_bytes())
                .map_err(|e| Error::with_source(ErrorKind::InvalidHeader, e))?;
            let value = HeaderValue::from_str(value.as_ref())
                .map_err(|e| Error::with_source(ErrorKind::InvalidHeader, e))?;
            custom_headers.insert(name, value);
        }

        self.settings_mut().custom_headers = custom_headers;
        Ok(())
    }

    /// Sets the heartbeat interval for connections accepted from now on.
    /// `Duration::ZERO` disables heartbeats entirely.
    pub fn set_heartbeat_interval(&self, interval: Duration) {
        self.settings_mut().heartbeat_interval = interval;
    }

    pub fn set_disconnect_handler(&self, handler: Arc<dyn DisconnectHandler>) {
        self.settings_mut().disconnect_handler = Some(handler);
    }

    /// Negotiates headers on `response`, registers a new connection for it and
    /// returns the connection. The caller must drive it with [`Connection::serve`].
    ///
    /// `cancellation` must fire when the client disconnects or the host shuts down.
    /// Must be called from within a Tokio runtime.
    pub fn accept<W>(
        &self,
        cancellation: &CancellationToken,
        mut response: W,
    ) -> Result<Arc<Connection>>
    where
        W: ResponseWriter + 'static,
    {
        // Held until the connection is registered so `close()` cannot miss it.
        let settings = self.settings();
        if settings.closed {
            return Err(ErrorKind::ServerClosed.into());
        }
        if !response.supports_flush() {
            return Err(ErrorKind::StreamingUnsupported.into());
        }

        negotiate_headers(response.headers_mut(), &settings.custom_headers);

        let connection = Connection::open(
            Box::new(response),
            cancellation,
            settings.heartbeat_interval,
            self.on_disconnect(settings.disconnect_handler.clone()),
        );
        self.registry.add(connection.clone());

        // A request that was already cancelled may have closed the connection
        // before it was registered, in which case its own cleanup ran too early.
        if connection.closed() {
            self.registry.remove(connection.id());
        }

        info!(
            "Registered new SSE connection {} ({} open)",
            connection.id(),
            self.registry.len()
        );
        Ok(connection)
    }

    /// Sends `event` to one connection, waiting until its serve loop takes it.
    pub async fn write(&self, connection_id: &ConnectionId, event: &Event) -> Result<()> {
        let connection = self
            .registry
            .get(connection_id)
            .ok_or_else(|| Error::new(ErrorKind::UnknownConnection))?;

        connection.write(event).await
    }

    /// Sends `event` to every open connection and returns how many were targeted.
    ///
    /// Deliveries run concurrently, so a stalled client never delays the others,
    /// but the call only resolves once every recipient has taken the frame or
    /// closed. Each connection therefore holds at most one pending frame per
    /// caller, and sequential broadcasts arrive in call order. Failures only
    /// surface through each connection's own `serve()` outcome.
    pub async fn broadcast(&self, event: &Event) -> usize {
        let frame = event.format();
        let connections = self.registry.snapshot();

        join_all(connections.iter().map(|connection| {
            let frame = frame.clone();
            async move {
                if let Err(e) = connection.deliver(frame).await {
                    debug!(
                        "Skipped broadcast to SSE connection {}: {e}",
                        connection.id()
                    );
                }
            }
        }))
        .await;

        debug!("Broadcast SSE event to {} connection(s)", connections.len());
        connections.len()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Stops accepting connections and closes every open one. Idempotent.
    pub fn close(&self) {
        {
            let mut settings = self.settings_mut();
            if settings.closed {
                return;
            }
            settings.closed = true;
        }

        let connections = self.registry.snapshot();
        info!(
            "Closing SSE server with {} open connection(s)",
            connections.len()
        );
        for connection in connections {
            connection.close();
        }
    }

    fn on_disconnect(&self, handler: Option<Arc<dyn DisconnectHandler>>) -> DisconnectFn {
        let registry = Arc::downgrade(&self.registry);

        Box::new(move |connection_id: &ConnectionId| {
            if let Some(registry) = registry.upgrade() {
                registry.remove(connection_id);
                info!(
                    "Unregistered SSE connection {connection_id} ({} open)",
                    registry.len()
                );
            }

            if let Some(handler) = handler {
                notify_disconnect(handler, connection_id.clone());
            }
        })
    }

    fn settings(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn settings_mut(&self) -> RwLockWriteGuard<'_, Settings> {
        self.settings.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

fn negotiate_headers(headers: &mut HeaderMap, custom_headers: &HeaderMap) {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

    for (name, value) in custom_headers {
        headers.insert(name.clone(), value.clone());
    }
}

fn notify_disconnect(handler: Arc<dyn DisconnectHandler>, connection_id: ConnectionId) {
    match Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move { handler.on_disconnect(connection_id).await });
        }
        Err(_) => warn!(
            "No async runtime available, dropping disconnect notification for {connection_id}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingWriter;
    use axum::body::Bytes;
    use std::collections::HashSet;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    struct ChannelHandler(mpsc::UnboundedSender<ConnectionId>);

    #[async_trait]
    impl DisconnectHandler for ChannelHandler {
        async fn on_disconnect(&self, connection_id: ConnectionId) {
            let _ = self.0.send(connection_id);
        }
    }

    fn accept_recording(
        server: &Server,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<Bytes>, CancellationToken) {
        let (writer, frames) = RecordingWriter::new();
        let cancellation = CancellationToken::new();
        let connection = server.accept(&cancellation, writer).unwrap();
        (connection, frames, cancellation)
    }

    fn spawn_serve(connection: &Arc<Connection>) -> JoinHandle<Result<()>> {
        let connection = connection.clone();
        tokio::spawn(async move { connection.serve().await })
    }

    #[tokio::test]
    async fn accept_rejects_writers_that_cannot_flush() {
        let server = Server::new();
        let (writer, _frames) = RecordingWriter::new();

        let err = server
            .accept(&CancellationToken::new(), writer.unflushable())
            .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::StreamingUnsupported);
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn accepted_connections_have_distinct_ids() {
        let server = Server::new();
        let ids: HashSet<ConnectionId> = (0..50)
            .map(|_| accept_recording(&server).0.id().clone())
            .collect();

        assert_eq!(ids.len(), 50);
        assert_eq!(server.connection_count(), 50);
    }

    #[tokio::test]
    async fn closing_a_connection_unregisters_it_and_notifies_once() {
        let server = Server::new();
        let (tx, mut disconnected) = mpsc::unbounded_channel();
        server.set_disconnect_handler(Arc::new(ChannelHandler(tx)));

        let (connection, _frames, _cancellation) = accept_recording(&server);
        assert!(server.registry().get(connection.id()).is_some());

        connection.close();
        connection.close();

        assert!(server.registry().get(connection.id()).is_none());
        let notified = timeout(WAIT, disconnected.recv()).await.unwrap().unwrap();
        assert_eq!(&notified, connection.id());

        // No second notification for the repeated close.
        assert!(timeout(Duration::from_millis(50), disconnected.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn request_cancellation_unregisters_the_connection() {
        let server = Server::new();
        let (connection, _frames, cancellation) = accept_recording(&server);
        let serving = spawn_serve(&connection);

        cancellation.cancel();

        assert!(timeout(WAIT, serving).await.unwrap().unwrap().is_ok());
        assert!(connection.closed());
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn already_cancelled_request_is_not_left_registered() {
        let server = Server::new();
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let (writer, _frames) = RecordingWriter::new();
        let connection = server.accept(&cancellation, writer).unwrap();

        timeout(WAIT, async {
            while !connection.closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn write_reaches_the_targeted_connection() {
        let server = Server::new();
        let (connection, mut frames, _cancellation) = accept_recording(&server);
        let serving = spawn_serve(&connection);

        let event = Event::new("message", "hello").with_id("1");
        server.write(connection.id(), &event).await.unwrap();

        assert_eq!(frames.recv().await.unwrap(), event.format());

        connection.close();
        assert!(serving.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn write_to_unknown_connection_fails_without_side_effects() {
        let server = Server::new();
        let (connection, mut frames, _cancellation) = accept_recording(&server);
        let serving = spawn_serve(&connection);

        let err = server
            .write(
                &ConnectionId::from("nonexistent-id"),
                &Event::new("message", "lost"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::UnknownConnection);

        assert!(timeout(Duration::from_millis(50), frames.recv())
            .await
            .is_err());
        assert!(!connection.closed());
        assert_eq!(server.connection_count(), 1);

        connection.close();
        assert!(serving.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn broadcast_delivers_once_to_every_connection() {
        let server = Server::new();
        let mut accepted: Vec<_> = (0..3).map(|_| accept_recording(&server)).collect();
        let serving: Vec<_> = accepted.iter().map(|(c, _, _)| spawn_serve(c)).collect();

        let event = Event::new("message", "to everyone");
        assert_eq!(server.broadcast(&event).await, 3);

        for (_, frames, _) in accepted.iter_mut() {
            let frame = timeout(WAIT, frames.recv()).await.unwrap().unwrap();
            assert_eq!(frame, event.format());
            assert!(timeout(Duration::from_millis(50), frames.recv())
                .await
                .is_err());
        }

        server.close();
        for serve in serving {
            assert!(serve.await.unwrap().is_ok());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sequential_broadcasts_arrive_in_call_order() {
        let server = Server::new();
        let (connection, mut frames, _cancellation) = accept_recording(&server);
        let serving = spawn_serve(&connection);

        for n in 0..200 {
            server
                .broadcast(&Event::new("message", format!("m{n}")))
                .await;
        }

        for n in 0..200 {
            let frame = timeout(WAIT, frames.recv()).await.unwrap().unwrap();
            assert_eq!(frame, Event::new("message", format!("m{n}")).format());
        }

        server.close();
        assert!(serving.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn stalled_connection_does_not_hold_up_broadcast() {
        let server = Arc::new(Server::new());
        // Never served, so deliveries to it cannot complete.
        let (stalled, _stalled_frames, _stalled_cancellation) = accept_recording(&server);
        let (live, mut frames, _cancellation) = accept_recording(&server);
        let serving = spawn_serve(&live);

        let event = Event::new("message", "still arrives");
        let broadcaster = {
            let server = server.clone();
            let event = event.clone();
            tokio::spawn(async move { server.broadcast(&event).await })
        };

        let frame = timeout(WAIT, frames.recv()).await.unwrap().unwrap();
        assert_eq!(frame, event.format());

        // The caller is held back instead of queueing more work for the stalled peer.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!broadcaster.is_finished());
        assert!(!stalled.closed());

        stalled.close();
        let recipients = timeout(WAIT, broadcaster).await.unwrap().unwrap();
        assert_eq!(recipients, 2);

        server.close();
        assert!(serving.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn broadcast_with_no_connections_targets_nobody() {
        let server = Server::new();
        assert_eq!(server.broadcast(&Event::new("message", "void")).await, 0);
    }

    #[test]
    fn negotiated_headers_include_sse_defaults() {
        let mut headers = HeaderMap::new();
        negotiate_headers(&mut headers, &HeaderMap::new());

        assert_eq!(headers[CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers[CACHE_CONTROL], "no-cache");
        assert_eq!(headers[CONNECTION], "keep-alive");
        assert_eq!(headers[TRANSFER_ENCODING], "chunked");
    }

    #[tokio::test]
    async fn custom_headers_are_applied_after_the_defaults() {
        let server = Server::new();
        server
            .set_custom_headers([
                ("Access-Control-Allow-Origin", "*"),
                ("Cache-Control", "no-store"),
            ])
            .unwrap();

        let mut headers = HeaderMap::new();
        negotiate_headers(&mut headers, &server.settings().custom_headers);

        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers[CACHE_CONTROL], "no-store");
        assert_eq!(headers.get_all(CACHE_CONTROL).iter().count(), 1);
        assert_eq!(headers[CONTENT_TYPE], "text/event-stream");
    }

    #[test]
    fn invalid_custom_headers_are_rejected() {
        let server = Server::new();

        let err = server
            .set_custom_headers([("bad header", "value")])
            .unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::InvalidHeader);

        let err = server
            .set_custom_headers([("X-Ok", "bad\nvalue")])
            .unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::InvalidHeader);
    }

    #[tokio::test]
    async fn heartbeat_interval_is_fixed_at_accept_time() {
        let server = Server::new();
        server.set_heartbeat_interval(Duration::from_secs(10));
        let (first, _first_frames, _first_cancellation) = accept_recording(&server);

        server.set_heartbeat_interval(Duration::ZERO);
        let (second, _second_frames, _second_cancellation) = accept_recording(&server);

        assert_eq!(first.heartbeat_interval(), Duration::from_secs(10));
        assert_eq!(second.heartbeat_interval(), Duration::ZERO);
    }

    #[tokio::test]
    async fn closed_server_closes_connections_and_refuses_new_ones() {
        let server = Server::new();
        let (tx, mut disconnected) = mpsc::unbounded_channel();
        server.set_disconnect_handler(Arc::new(ChannelHandler(tx)));

        let (first, _first_frames, _first_cancellation) = accept_recording(&server);
        let (second, _second_frames, _second_cancellation) = accept_recording(&server);

        server.close();
        server.close();

        assert!(first.closed());
        assert!(second.closed());
        assert_eq!(server.connection_count(), 0);

        let mut notified = HashSet::new();
        for _ in 0..2 {
            notified.insert(timeout(WAIT, disconnected.recv()).await.unwrap().unwrap());
        }
        assert!(notified.contains(first.id()));
        assert!(notified.contains(second.id()));

        let (writer, _frames) = RecordingWriter::new();
        let err = server
            .accept(&CancellationToken::new(), writer)
            .unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::ServerClosed);
    }
}
