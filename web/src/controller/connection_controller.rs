use crate::controller::ApiResponse;
use crate::params::event::EventParams;
use crate::{AppState, Error};
use ::sse::ConnectionId;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use log::*;

#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectionsSummary {
    pub count: usize,
    pub ids: Vec<String>,
}

/// GET all open SSE connections
#[utoipa::path(
    get,
    path = "/connections",
    responses(
        (status = 200, description = "Currently registered SSE connections", body = ConnectionsSummary),
    )
)]
pub async fn index(State(app_state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let ids: Vec<String> = app_state
        .sse_server
        .registry()
        .ids()
        .iter()
        .map(|id| id.to_string())
        .collect();

    debug!("GET {} open SSE connection(s)", ids.len());

    Ok(Json(ApiResponse::new(
        StatusCode::OK.into(),
        ConnectionsSummary {
            count: ids.len(),
            ids,
        },
    )))
}

/// POST an event to a single SSE connection
#[utoipa::path(
    post,
    path = "/connections/{id}/events",
    params(
        ("id" = String, Path, description = "Id of the SSE connection to write to")
    ),
    request_body = EventParams,
    responses(
        (status = 202, description = "Event was written to the connection"),
        (status = 404, description = "No open connection with this id"),
        (status = 410, description = "Connection closed before the event was written"),
        (status = 422, description = "Unprocessable Entity"),
    )
)]
pub async fn write(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(params): Json<EventParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST SSE event to connection {id}: {params:?}");

    app_state
        .sse_server
        .write(&ConnectionId::from(id), &params.into())
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::<()>::no_content(StatusCode::ACCEPTED.into())),
    ))
}
