use log::*;
use sse::{Event, Server};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

/// Broadcasts a numbered `message` event to every open connection each `period`.
pub(crate) fn spawn_broadcaster(server: Arc<Server>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        let mut count: u64 = 0;

        loop {
            ticker.tick().await;
            count += 1;

            let recipients = server.broadcast(&demo_event(count)).await;
            debug!("Demo event {count} sent to {recipients} connection(s)");
        }
    })
}

fn demo_event(count: u64) -> Event {
    Event::new("message", format!("test {count}")).with_id(format!("event-id-{count}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_events_are_numbered() {
        assert_eq!(
            demo_event(3),
            Event {
                id: "event-id-3".to_string(),
                event: "message".to_string(),
                data: "test 3".to_string(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcaster_keeps_running_without_connections() {
        let server = Arc::new(Server::new());
        let broadcaster = spawn_broadcaster(Arc::clone(&server), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(16)).await;

        assert!(!broadcaster.is_finished());
        broadcaster.abort();
    }
}
