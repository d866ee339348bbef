use serde::Deserialize;
use utoipa::ToSchema;

/// An event to push to one or all open SSE connections.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[schema(example = json!({"id": "event-id-1", "event": "message", "data": "hello"}))]
pub struct EventParams {
    /// Optional event id; omitted from the frame when empty.
    #[serde(default)]
    pub id: String,
    /// Event type name; empty is the default event type.
    #[serde(default)]
    pub event: String,
    /// Event payload. Newlines split it into several `data:` lines.
    #[serde(default)]
    pub data: String,
}

impl From<EventParams> for ::sse::Event {
    fn from(params: EventParams) -> Self {
        Self {
            id: params.id,
            event: params.event,
            data: params.data,
        }
    }
}
