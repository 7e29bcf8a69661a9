//! Live-reload channel.
//!
//! Connected browsers subscribe to `/__assetflow/events` and receive
//! [`ReloadEvent`]s as Server-Sent Events. The event name is the event
//! type; the data is the JSON form of the event.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Message pushed to connected browsers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReloadEvent {
    /// Reload the page
    Reload,
    /// Scroll to `ratio` of the page height; sent by the browser `origin`
    Scroll { ratio: f64, origin: String },
}

impl ReloadEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            ReloadEvent::Reload => "reload",
            ReloadEvent::Scroll { .. } => "scroll",
        }
    }
}

/// Sender side of the live-reload channel.
///
/// Cheap to clone; every clone feeds the same subscribers.
#[derive(Debug, Clone)]
pub struct Reloader {
    tx: broadcast::Sender<ReloadEvent>,
    delay: Duration,
}

impl Reloader {
    /// Create a channel whose reloads are delayed by `delay`.
    pub fn new(delay: Duration) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, delay }
    }

    /// Subscribe to events sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.tx.subscribe()
    }

    /// Number of connected subscribers.
    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Send an event immediately. Returns how many subscribers got it.
    pub fn send(&self, event: ReloadEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Wait for the reload delay, then tell every browser to reload.
    pub async fn reload(&self) -> usize {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reached = self.send(ReloadEvent::Reload);
        tracing::debug!(browsers = reached, "reload sent");
        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json() {
        assert_eq!(serde_json::to_string(&ReloadEvent::Reload).unwrap(), r#"{"type":"reload"}"#);
        let scroll = ReloadEvent::Scroll { ratio: 0.5, origin: "abc".to_string() };
        assert_eq!(serde_json::to_string(&scroll).unwrap(), r#"{"type":"scroll","ratio":0.5,"origin":"abc"}"#);
        assert_eq!(scroll.name(), "scroll");
    }

    #[test]
    fn test_send_without_subscribers() {
        let reloader = Reloader::new(Duration::ZERO);
        assert_eq!(reloader.send(ReloadEvent::Reload), 0);
    }

    #[tokio::test]
    async fn test_reload_reaches_subscribers_after_delay() {
        let reloader = Reloader::new(Duration::from_millis(20));
        let mut first = reloader.subscribe();
        let mut second = reloader.clone().subscribe();
        assert_eq!(reloader.subscribers(), 2);

        let start = tokio::time::Instant::now();
        assert_eq!(reloader.reload().await, 2);
        assert!(start.elapsed() >= Duration::from_millis(20));

        assert_eq!(first.recv().await.unwrap(), ReloadEvent::Reload);
        assert_eq!(second.recv().await.unwrap(), ReloadEvent::Reload);
    }
}
