//! Shiksha Leap core: the offline-capable pieces of the learning client.
//!
//! - `store`: local SQLite record store (game logs, achievements, progress,
//!   cached content, settings)
//! - `sync`: pushes pending records to the server when online
//! - `worker`: network cache layer sitting in front of every request
//! - `auth`: one-time-code login and the local session
//! - `catalog`: games available per grade and subject
//!
//! Front ends construct these explicitly and share them by `Arc`.

pub mod api;
pub mod auth;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod models;
pub mod store;
pub mod sync;
pub mod utils;
pub mod worker;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthFlow, Session, SessionData};
pub use catalog::{GameCatalog, GameLoader};
pub use config::Config;
pub use store::{Collection, Store, StoreError};
pub use sync::{SyncEngine, SyncScheduler};
pub use worker::{CacheLayer, Fetcher, HttpFetcher, MessageBus, WorkerMessage};
