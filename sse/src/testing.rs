//! In-memory response writers for unit tests.

use crate::transport::ResponseWriter;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::HeaderMap;
use std::io;
use tokio::sync::mpsc;

/// Records every written frame on a channel the test can read from.
pub(crate) struct RecordingWriter {
    headers: HeaderMap,
    frames: mpsc::UnboundedSender<Bytes>,
    flushable: bool,
    fail_writes: bool,
}

impl RecordingWriter {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (frames, rx) = mpsc::unbounded_channel();
        let writer = Self {
            headers: HeaderMap::new(),
            frames,
            flushable: true,
            fail_writes: false,
        };
        (writer, rx)
    }

    pub(crate) fn unflushable(mut self) -> Self {
        self.flushable = false;
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail_writes = true;
        self
    }
}

#[async_trait]
impl ResponseWriter for RecordingWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn supports_flush(&self) -> bool {
        self.flushable
    }

    async fn write(&mut self, frame: Bytes) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"));
        }
        self.frames
            .send(frame)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "recorder dropped"))
    }

    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
