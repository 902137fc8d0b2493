//! Response cache buckets used by the network cache layer.
//!
//! - `CacheStorage`: named in-memory buckets of responses keyed by URL
//! - `CacheManager`: writes each bucket to `<cache_dir>/<bucket>.json`
//!
//! Bodies are stored base64-encoded so binary assets survive the round trip.

pub mod manager;
pub mod storage;

pub use manager::{BucketEntries, BucketFile, CacheManager};
pub use storage::CacheStorage;
