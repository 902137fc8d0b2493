//! Network cache layer.
//!
//! Intercepts every outgoing request (`CacheLayer` is itself a `Fetcher`),
//! serves cached responses when the network is unavailable, and relays
//! background sync signals to open pages over the `MessageBus`.

pub mod fetch;
pub mod layer;
pub mod manifest;
pub mod messages;

pub use crate::cache::CacheStorage;
pub use fetch::{FetchError, Fetcher, HttpFetcher, Method, Request, Response, ResponseKind};
pub use layer::{CacheLayer, InstallError, WorkerState};
pub use messages::{MessageBus, WorkerMessage};
