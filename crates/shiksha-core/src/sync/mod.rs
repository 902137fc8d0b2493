//! Sync engine: moves locally saved records to the server.
//!
//! - `SyncEngine`: one pass per collection at a time, at-least-once delivery
//! - `SyncScheduler`: reacts to reconnects, visibility, worker messages,
//!   local saves and a periodic timer
//! - `SyncRemote`: the server side of a pass, implemented by `ApiClient`

pub mod backoff;
pub mod engine;
pub mod remote;
pub mod trigger;

pub use backoff::Backoff;
pub use engine::{Lane, SkipReason, SyncEngine, SyncEvent, SyncOutcome, SyncStatus, Trigger};
pub use remote::SyncRemote;
pub use trigger::{PageEvent, PageEvents, SyncScheduler, CHANNEL_BUFFER_SIZE, DEFAULT_SYNC_INTERVAL};
