use crate::controller::ApiResponse;
use crate::params::event::EventParams;
use crate::{AppState, Error};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use log::*;

#[derive(Debug, Serialize, ToSchema)]
pub struct BroadcastSummary {
    /// Number of connections the event was handed to.
    pub recipients: usize,
}

/// POST broadcast an event to every open SSE connection
#[utoipa::path(
    post,
    path = "/events",
    request_body = EventParams,
    responses(
        (status = 202, description = "Event taken by every open connection, or dropped for those that closed", body = BroadcastSummary),
        (status = 422, description = "Unprocessable Entity"),
    )
)]
pub async fn broadcast(
    State(app_state): State<AppState>,
    Json(params): Json<EventParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST broadcast SSE event: {params:?}");

    let recipients = app_state.sse_server.broadcast(&params.into()).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(
            StatusCode::ACCEPTED.into(),
            BroadcastSummary { recipients },
        )),
    ))
}
