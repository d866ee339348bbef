use ::sse::ResponseWriter;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::HeaderMap;
use std::io;
use tokio::sync::{mpsc, oneshot};

/// Frames buffered between the serve loop and hyper. Kept at one so a slow
/// client pushes back on the serve loop, and from there on producers.
const BODY_BUFFER: usize = 1;

/// A `ResponseWriter` whose body is drained by an axum streaming response.
///
/// Headers are handed over on the first `write` or `flush`, which is when the
/// handler can start the HTTP response.
pub(crate) struct ChannelResponse {
    headers: HeaderMap,
    head: Option<oneshot::Sender<HeaderMap>>,
    body: mpsc::Sender<Bytes>,
}

impl ChannelResponse {
    pub(crate) fn new() -> (Self, oneshot::Receiver<HeaderMap>, mpsc::Receiver<Bytes>) {
        let (head, head_rx) = oneshot::channel();
        let (body, body_rx) = mpsc::channel(BODY_BUFFER);

        let response = Self {
            headers: HeaderMap::new(),
            head: Some(head),
            body,
        };
        (response, head_rx, body_rx)
    }

    fn commit_head(&mut self) {
        if let Some(head) = self.head.take() {
            let _ = head.send(std::mem::take(&mut self.headers));
        }
    }
}

#[async_trait]
impl ResponseWriter for ChannelResponse {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    async fn write(&mut self, frame: Bytes) -> io::Result<()> {
        self.commit_head();
        self.body
            .send(frame)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"))
    }

    // Every frame reaches hyper as its own body chunk, so there is nothing
    // buffered here to push out.
    async fn flush(&mut self) -> io::Result<()> {
        self.commit_head();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::CONTENT_TYPE;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_flush_commits_headers_once() {
        let (mut response, head, _body) = ChannelResponse::new();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));

        response.flush().await.unwrap();
        response.flush().await.unwrap();

        let headers = head.await.unwrap();
        assert_eq!(headers[CONTENT_TYPE], "text/event-stream");
    }

    #[tokio::test]
    async fn test_write_forwards_frames_in_order() {
        let (mut response, _head, mut body) = ChannelResponse::new();

        let writer = tokio::spawn(async move {
            response.write(Bytes::from_static(b"one")).await.unwrap();
            response.write(Bytes::from_static(b"two")).await.unwrap();
        });

        assert_eq!(body.recv().await.unwrap(), Bytes::from_static(b"one"));
        assert_eq!(body.recv().await.unwrap(), Bytes::from_static(b"two"));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_write_fails_once_the_body_is_dropped() {
        let (mut response, _head, body) = ChannelResponse::new();
        drop(body);

        let err = response
            .write(Bytes::from_static(b"lost"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
