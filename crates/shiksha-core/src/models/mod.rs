//! Data models shared across the store, sync engine and API client.
//!
//! - `SyncableRecord`: game logs and achievements waiting for the server
//! - `GameLog`: the payload of a finished game
//! - `ProgressEntry`, `CachedContentEntry`: local-only collections
//! - `OfflineAuthAttempt`, `Language`: key/value settings

pub mod language;
pub mod record;

pub use language::Language;
pub use record::{
    CachedContentEntry, GameLog, OfflineAuthAttempt, ProgressEntry, SyncableRecord,
    CONTENT_TTL_HOURS,
};

/// Current time as milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
