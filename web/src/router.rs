use crate::{
    controller::{connection_controller, event_controller, health_check_controller},
    params, sse, AppState,
};
use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI document. To be a part
// of the rendered docs, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "SSE Broker API"
        ),
        paths(
            connection_controller::index,
            connection_controller::write,
            event_controller::broadcast,
            health_check_controller::health_check,
        ),
        components(
            schemas(
                connection_controller::ConnectionsSummary,
                event_controller::BroadcastSummary,
                params::event::EventParams,
            )
        ),
        tags(
            (name = "sse_broker", description = "Server-Sent Events push messaging API")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(sse_routes(app_state.clone()))
        .merge(event_routes(app_state.clone()))
        .merge(connection_routes(app_state))
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/rapidoc"))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn sse_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/sse", get(sse::handler::sse_handler))
        .with_state(app_state)
}

fn event_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/events", post(event_controller::broadcast))
        .with_state(app_state)
}

fn connection_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/connections", get(connection_controller::index))
        .route(
            "/connections/{id}/events",
            post(connection_controller::write),
        )
        .with_state(app_state)
}
