use axum::body::Bytes;
use serde::{Deserialize, Serialize};

/// Comment-only frame written periodically to keep idle connections alive.
/// Clients and intermediaries ignore lines that start with `:`.
pub const HEARTBEAT_FRAME: &[u8] = b": heartbeat\n\n";

/// An application-defined event. All three fields are opaque strings; an empty
/// `id` omits the `id:` line, an empty `event` still emits an `event:` line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub data: String,
}

impl Event {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            event: event.into(),
            data: data.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Serializes the event into a single wire frame terminated by a blank line.
    pub fn format(&self) -> Bytes {
        let mut frame =
            String::with_capacity(self.id.len() + self.event.len() + self.data.len() + 32);

        if !self.id.is_empty() {
            frame.push_str("id: ");
            push_single_line(&mut frame, &self.id);
            frame.push('\n');
        }

        frame.push_str("event: ");
        push_single_line(&mut frame, &self.event);
        frame.push('\n');

        // `split` always yields at least one item, so empty data still gets a `data:` line.
        for line in self.data.split('\n') {
            frame.push_str("data: ");
            frame.push_str(line);
            frame.push('\n');
        }

        frame.push('\n');
        Bytes::from(frame)
    }
}

fn push_single_line(frame: &mut String, value: &str) {
    frame.extend(value.chars().filter(|c| *c != '\n'));
}
