use crate::error::{Error, ErrorKind, Result};
use crate::event::{Event, HEARTBEAT_FRAME};
use crate::transport::ResponseWriter;
use axum::body::Bytes;
use log::*;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Invoked exactly once when a connection starts closing.
pub(crate) type DisconnectFn = Box<dyn FnOnce(&ConnectionId) + Send>;

/// A frame in flight from a producer to the serve loop. `taken` fires once the
/// frame has been written and flushed, which is what turns the bounded channel
/// into a rendezvous.
struct Handoff {
    frame: Bytes,
    taken: oneshot::Sender<()>,
}

/// Producer side of a connection's mailbox, shared by writers and the heartbeat task.
#[derive(Clone)]
struct Mailbox {
    sender: mpsc::Sender<Handoff>,
    shutdown: CancellationToken,
}

impl Mailbox {
    async fn deliver(&self, frame: Bytes) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(ErrorKind::ConnectionClosed.into());
        }

        let (taken, taken_rx) = oneshot::channel();
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(ErrorKind::ConnectionClosed.into()),
            sent = self.sender.send(Handoff { frame, taken }) => {
                if sent.is_err() {
                    return Err(ErrorKind::ConnectionClosed.into());
                }
            }
        }

        tokio::select! {
            biased;
            taken = taken_rx => taken.map_err(|_| Error::new(ErrorKind::ConnectionClosed)),
            _ = self.shutdown.cancelled() => Err(ErrorKind::ConnectionClosed.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Closing,
    Closed,
}

/// Everything that changes when the connection is served or closed, behind one lock.
struct Lifecycle {
    state: State,
    mailbox: Option<mpsc::Receiver<Handoff>>,
    writer: Option<Box<dyn ResponseWriter>>,
    on_disconnect: Option<DisconnectFn>,
}

/// One open client stream.
///
/// The connection owns its response writer and a single-consumer mailbox. Any
/// number of producers may call [`Connection::write`]; only the task running
/// [`Connection::serve`] ever touches the writer, so frames are never interleaved.
pub struct Connection {
    id: ConnectionId,
    heartbeat_interval: Duration,
    mailbox: Mailbox,
    lifecycle: Mutex<Lifecycle>,
}

impl Connection {
    /// Creates an open connection and starts watching `cancellation`.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn open(
        writer: Box<dyn ResponseWriter>,
        cancellation: &CancellationToken,
        heartbeat_interval: Duration,
        on_disconnect: DisconnectFn,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(1);

        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            heartbeat_interval,
            mailbox: Mailbox {
                sender,
                shutdown: cancellation.child_token(),
            },
            lifecycle: Mutex::new(Lifecycle {
                state: State::Open,
                mailbox: Some(receiver),
                writer: Some(writer),
                on_disconnect: Some(on_disconnect),
            }),
        });

        connection.watch_cancellation();
        connection
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// True from the moment the connection starts closing.
    pub fn closed(&self) -> bool {
        self.lifecycle().state != State::Open
    }

    /// Hands `event` to the serve loop, waiting until it has been written.
    ///
    /// Blocks while the serve loop is busy or not yet running. Returns
    /// `ConnectionClosed` if the connection closes before the frame is taken.
    pub async fn write(&self, event: &Event) -> Result<()> {
        self.deliver(event.format()).await
    }

    pub(crate) async fn deliver(&self, frame: Bytes) -> Result<()> {
        self.mailbox.deliver(frame).await
    }

    /// Drives delivery until the connection closes. Call at most once.
    ///
    /// Returns `Ok(())` when closed by cancellation or [`Connection::close`], and a
    /// `Write` error if the underlying stream fails. The connection is closed on return
    /// in every case.
    pub async fn serve(&self) -> Result<()> {
        let (mut mailbox, mut writer) = self.start_serving()?;
        debug!("Serving SSE connection {}", self.id);

        let heartbeat = self.spawn_heartbeat();
        let outcome = self.deliver_until_closed(&mut mailbox, writer.as_mut()).await;

        if let Some(heartbeat) = heartbeat {
            heartbeat.abort();
        }
        drop(mailbox);
        self.close();

        match &outcome {
            Ok(()) => debug!("SSE connection {} finished", self.id),
            Err(e) => warn!("SSE connection {} failed: {e}", self.id),
        }
        outcome
    }

    /// Closes the connection. Only the first call has any effect: it notifies the
    /// owner, then releases the mailbox so blocked producers return.
    pub fn close(&self) {
        let (on_disconnect, mailbox, writer) = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.state != State::Open {
                return;
            }
            lifecycle.state = State::Closing;
            (
                lifecycle.on_disconnect.take(),
                lifecycle.mailbox.take(),
                lifecycle.writer.take(),
            )
        };

        debug!("Closing SSE connection {}", self.id);

        if let Some(on_disconnect) = on_disconnect {
            on_disconnect(&self.id);
        }

        self.mailbox.shutdown.cancel();
        drop(mailbox);
        drop(writer);

        self.lifecycle().state = State::Closed;
    }

    fn start_serving(&self) -> Result<(mpsc::Receiver<Handoff>, Box<dyn ResponseWriter>)> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != State::Open {
            return Err(ErrorKind::AlreadyClosed.into());
        }

        lifecycle
            .mailbox
            .take()
            .zip(lifecycle.writer.take())
            .ok_or_else(|| Error::new(ErrorKind::AlreadyServing))
    }

    async fn deliver_until_closed(
        &self,
        mailbox: &mut mpsc::Receiver<Handoff>,
        writer: &mut dyn ResponseWriter,
    ) -> Result<()> {
        // Commits the negotiated headers before the first event arrives.
        writer
            .flush()
            .await
            .map_err(|e| Error::with_source(ErrorKind::Write, e))?;

        loop {
            tokio::select! {
                biased;
                _ = self.mailbox.shutdown.cancelled() => return Ok(()),
                handoff = mailbox.recv() => {
                    let Some(Handoff { frame, taken }) = handoff else {
                        return Ok(());
                    };
                    write_frame(writer, frame).await?;
                    let _ = taken.send(());
                }
            }
        }
    }

    fn spawn_heartbeat(&self) -> Option<JoinHandle<()>> {
        if self.heartbeat_interval.is_zero() {
            return None;
        }

        let period = self.heartbeat_interval;
        let mailbox = self.mailbox.clone();
        let id = self.id.clone();

        Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = mailbox.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if mailbox.deliver(Bytes::from_static(HEARTBEAT_FRAME)).await.is_err() {
                            break;
                        }
                        trace!("Sent heartbeat on SSE connection {id}");
                    }
                }
            }
        }))
    }

    /// Closes the connection as soon as the request is cancelled, whether or not
    /// anyone is running `serve()`.
    fn watch_cancellation(self: &Arc<Self>) {
        let shutdown = self.mailbox.shutdown.clone();
        let connection = Arc::downgrade(self);

        tokio::spawn(async move {
            shutdown.cancelled().await;
            if let Some(connection) = connection.upgrade() {
                connection.close();
            }
        });
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn write_frame(writer: &mut dyn ResponseWriter, frame: Bytes) -> Result<()> {
    writer
        .write(frame)
        .await
        .map_err(|e| Error::with_source(ErrorKind::Write, e))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::with_source(ErrorKind::Write, e))
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Lets the cancellation watcher exit.
        self.mailbox.shutdown.cancel();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("closed", &self.closed())
            .finish()
    }
}
