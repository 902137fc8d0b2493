//! Worker to page messages.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Platform sync tags handled by the worker.
pub const SYNC_GAME_LOGS_TAG: &str = "sync-game-logs";
pub const SYNC_ACHIEVEMENTS_TAG: &str = "sync-achievements";

const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub enum WorkerMessage {
    SyncGameLogs,
    SyncAchievements,
    /// The worker took control of open pages after activating.
    Claimed,
}

impl WorkerMessage {
    pub fn from_sync_tag(tag: &str) -> Option<Self> {
        match tag {
            SYNC_GAME_LOGS_TAG => Some(Self::SyncGameLogs),
            SYNC_ACHIEVEMENTS_TAG => Some(Self::SyncAchievements),
            _ => None,
        }
    }
}

/// Broadcast channel from the worker to every open page.
#[derive(Debug, Clone)]
pub struct MessageBus {
    tx: broadcast::Sender<WorkerMessage>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerMessage> {
        self.tx.subscribe()
    }

    /// Deliver to every subscriber. Returns how many pages received it.
    pub fn post(&self, message: WorkerMessage) -> usize {
        let delivered = self.tx.send(message).unwrap_or(0);
        debug!(?message, delivered, "Worker message posted");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_string(&WorkerMessage::SyncGameLogs).expect("serialize");
        assert_eq!(json, r#"{"type":"SYNC_GAME_LOGS"}"#);
        let back: WorkerMessage =
            serde_json::from_str(r#"{"type":"SYNC_ACHIEVEMENTS"}"#).expect("parse");
        assert_eq!(back, WorkerMessage::SyncAchievements);
    }

    #[test]
    fn test_sync_tags() {
        assert_eq!(
            WorkerMessage::from_sync_tag("sync-game-logs"),
            Some(WorkerMessage::SyncGameLogs)
        );
        assert_eq!(
            WorkerMessage::from_sync_tag("sync-achievements"),
            Some(WorkerMessage::SyncAchievements)
        );
        assert_eq!(WorkerMessage::from_sync_tag("sync-content"), None);
    }

    #[tokio::test]
    async fn test_post_reaches_all_subscribers() {
        let bus = MessageBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.post(WorkerMessage::Claimed), 2);
        assert_eq!(a.recv().await.expect("a"), WorkerMessage::Claimed);
        assert_eq!(b.recv().await.expect("b"), WorkerMessage::Claimed);
    }

    #[test]
    fn test_post_without_pages_is_harmless() {
        assert_eq!(MessageBus::new().post(WorkerMessage::SyncGameLogs), 0);
    }
}
