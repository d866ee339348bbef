use crate::sse::response::ChannelResponse;
use crate::{AppState, Error};
use ::sse::ErrorKind;
use async_stream::stream;
use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use log::*;
use std::convert::Infallible;
use tokio_util::sync::CancellationToken;

/// SSE handler that establishes a long-lived event stream.
///
/// The stream stays open until the client disconnects or the server shuts
/// down. Client disconnects are noticed when hyper drops the response body,
/// which cancels the request token and closes the connection.
pub(crate) async fn sse_handler(State(app_state): State<AppState>) -> Result<Response, Error> {
    let cancellation = CancellationToken::new();
    // Lives inside the body stream; dropping either this handler or the body cancels.
    let disconnect_guard = cancellation.clone().drop_guard();

    let (response, head, mut frames) = ChannelResponse::new();
    let connection = app_state.sse_server.accept(&cancellation, response)?;
    let connection_id = connection.id().clone();
    debug!("Establishing SSE connection {connection_id}");

    tokio::spawn(async move {
        if let Err(e) = connection.serve().await {
            debug!("SSE connection {} ended with: {e}", connection.id());
        }
    });

    // The serve loop flushes once on start, which hands over the negotiated headers.
    let headers = head
        .await
        .map_err(|_| Error::from(ErrorKind::ConnectionClosed))?;

    let stream = stream! {
        let _disconnect_guard = disconnect_guard;

        while let Some(frame) = frames.recv().await {
            yield Ok::<_, Infallible>(frame);
        }

        debug!("SSE body for connection {connection_id} finished");
    };

    let mut response = Body::from_stream(stream).into_response();
    *response.headers_mut() = headers;
    Ok(response)
}
