//! Named response buckets.
//!
//! Buckets live in memory and, when a `CacheManager` is attached, are written
//! through to disk after every change. Disk writes run on the blocking pool
//! after the bucket lock is released, so readers never wait on the disk.
//! Writers queue on `persisting` to keep files in change order. A failed
//! write is logged and the in-memory bucket stays authoritative.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::manager::{BucketEntries, CacheManager};
use crate::worker::fetch::Response;

#[derive(Debug, Clone, Default)]
struct Bucket {
    name: String,
    entries: BucketEntries,
}

/// Disk change produced by one in-memory change.
enum WriteThrough {
    Save(BucketEntries),
    Remove,
}

/// Shared handle to every bucket. Clone is cheap.
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    buckets: Arc<RwLock<Vec<Bucket>>>,
    manager: Option<CacheManager>,
    persisting: Arc<Mutex<()>>,
}

impl CacheStorage {
    /// Memory-only storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage persisted through `manager`, preloaded with what it holds.
    pub fn persistent(manager: CacheManager) -> Self {
        let mut buckets = Vec::new();
        match manager.bucket_names() {
            Ok(names) => {
                for name in names {
                    match manager.load_bucket(&name) {
                        Ok(Some(file)) => buckets.push(Bucket {
                            name,
                            entries: file.entries,
                        }),
                        Ok(None) => {}
                        Err(e) => {
                            warn!(bucket = %name, error = %e, "Skipping unreadable bucket")
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to list persisted buckets"),
        }
        debug!(buckets = buckets.len(), "Cache storage loaded");
        Self {
            buckets: Arc::new(RwLock::new(buckets)),
            manager: Some(manager),
            persisting: Arc::default(),
        }
    }

    pub fn manager(&self) -> Option<&CacheManager> {
        self.manager.as_ref()
    }

    /// Apply `change` to disk. Callers hold `persisting` but not the bucket
    /// lock.
    async fn write_through(&self, name: &str, change: WriteThrough) {
        let Some(manager) = self.manager.clone() else {
            return;
        };
        let bucket = name.to_string();
        let result = tokio::task::spawn_blocking(move || match change {
            WriteThrough::Save(entries) => manager.save_bucket(&bucket, &entries),
            WriteThrough::Remove => manager.remove_bucket(&bucket),
        })
        .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(bucket = name, error = %e, "Failed to persist bucket"),
            Err(e) => warn!(bucket = name, error = %e, "Bucket write task failed"),
        }
    }

    /// Create the bucket if it does not exist yet.
    pub async fn open(&self, name: &str) {
        let _persisting = self.persisting.lock().await;
        let created = {
            let mut buckets = self.buckets.write().await;
            let missing = !buckets.iter().any(|b| b.name == name);
            if missing {
                buckets.push(Bucket {
                    name: name.to_string(),
                    entries: BucketEntries::new(),
                });
            }
            missing
        };
        if created {
            self.write_through(name, WriteThrough::Save(BucketEntries::new())).await;
        }
    }

    pub async fn has(&self, name: &str) -> bool {
        self.buckets.read().await.iter().any(|b| b.name == name)
    }

    /// Bucket names in creation order.
    pub async fn keys(&self) -> Vec<String> {
        self.buckets.read().await.iter().map(|b| b.name.clone()).collect()
    }

    /// Drop a bucket and its entries. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> bool {
        let _persisting = self.persisting.lock().await;
        let existed = {
            let mut buckets = self.buckets.write().await;
            let before = buckets.len();
            buckets.retain(|b| b.name != name);
            buckets.len() != before
        };
        if existed {
            self.write_through(name, WriteThrough::Remove).await;
        }
        existed
    }

    pub async fn match_in(&self, name: &str, key: &str) -> Option<Response> {
        let buckets = self.buckets.read().await;
        buckets
            .iter()
            .find(|b| b.name == name)
            .and_then(|b| b.entries.get(key).cloned())
    }

    /// First match across all buckets, in creation order.
    pub async fn match_any(&self, key: &str) -> Option<Response> {
        let buckets = self.buckets.read().await;
        buckets.iter().find_map(|b| b.entries.get(key).cloned())
    }

    /// Store one response, creating the bucket if needed.
    pub async fn put(&self, name: &str, key: &str, response: Response) {
        self.put_all(name, vec![(key.to_string(), response)]).await;
    }

    /// Store every entry in one step; readers never see a partial batch.
    pub async fn put_all(&self, name: &str, entries: Vec<(String, Response)>) {
        let _persisting = self.persisting.lock().await;
        let snapshot = {
            let mut buckets = self.buckets.write().await;
            let index = match buckets.iter().position(|b| b.name == name) {
                Some(index) => index,
                None => {
                    buckets.push(Bucket {
                        name: name.to_string(),
                        entries: BucketEntries::new(),
                    });
                    buckets.len() - 1
                }
            };
            let bucket = &mut buckets[index];
            let count = entries.len();
            bucket.entries.extend(entries);
            debug!(bucket = name, count, "Responses cached");
            self.manager.as_ref().map(|_| bucket.entries.clone())
        };
        if let Some(entries) = snapshot {
            self.write_through(name, WriteThrough::Save(entries)).await;
        }
    }

    /// Number of entries in a bucket, zero if absent.
    pub async fn len(&self, name: &str) -> usize {
        self.buckets
            .read()
            .await
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.entries.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_match() {
        let storage = CacheStorage::new();
        storage.put("static", "https://a/x", Response::new(200, "x")).await;

        assert_eq!(
            storage.match_in("static", "https://a/x").await.map(|r| r.text()),
            Some("x".to_string())
        );
        assert!(storage.match_in("dynamic", "https://a/x").await.is_none());
        assert!(storage.match_any("https://a/x").await.is_some());
        assert!(storage.match_any("https://a/y").await.is_none());
    }

    #[tokio::test]
    async fn test_keys_preserve_creation_order_and_delete() {
        let storage = CacheStorage::new();
        storage.open("b-old").await;
        storage.open("a-new").await;
        storage.open("b-old").await;
        assert_eq!(storage.keys().await, vec!["b-old", "a-new"]);

        assert!(storage.delete("b-old").await);
        assert!(!storage.delete("b-old").await);
        assert_eq!(storage.keys().await, vec!["a-new"]);
    }

    #[tokio::test]
    async fn test_persistent_storage_survives_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = CacheManager::new(dir.path().to_path_buf()).expect("manager");

        let storage = CacheStorage::persistent(manager.clone());
        storage
            .put_all(
                "static",
                vec![
                    ("https://a/1".to_string(), Response::new(200, "one")),
                    ("https://a/2".to_string(), Response::new(200, "two")),
                ],
            )
            .await;
        storage.open("stale").await;
        storage.delete("stale").await;

        let reloaded = CacheStorage::persistent(manager);
        assert_eq!(reloaded.keys().await, vec!["static"]);
        assert_eq!(reloaded.len("static").await, 2);
        assert_eq!(
            reloaded.match_in("static", "https://a/2").await.map(|r| r.text()),
            Some("two".to_string())
        );
    }

    #[tokio::test]
    async fn test_readers_proceed_while_a_write_is_queued() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = CacheManager::new(dir.path().to_path_buf()).expect("manager");
        let storage = CacheStorage::persistent(manager);
        storage.put("static", "https://a/1", Response::new(200, "one")).await;

        // Stands in for a slow disk write holding the writer queue.
        let held = storage.persisting.clone().lock_owned().await;
        let writer = {
            let storage = storage.clone();
            tokio::spawn(async move {
                storage.put("static", "https://a/2", Response::new(200, "two")).await;
            })
        };
        tokio::task::yield_now().await;

        let read = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            storage.match_in("static", "https://a/1"),
        )
        .await
        .expect("read not blocked by pending write");
        assert_eq!(read.map(|r| r.text()), Some("one".to_string()));
        assert_eq!(storage.keys().await, vec!["static"]);

        drop(held);
        writer.await.expect("writer");
        assert_eq!(storage.len("static").await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_puts_all_reach_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = CacheManager::new(dir.path().to_path_buf()).expect("manager");
        let storage = CacheStorage::persistent(manager.clone());

        let puts = (0..8).map(|i| {
            let storage = storage.clone();
            tokio::spawn(async move {
                let url = format!("https://a/{}", i);
                storage.put("dynamic", &url, Response::new(200, "x")).await;
            })
        });
        for put in futures::future::join_all(puts).await {
            put.expect("put task");
        }

        let file = manager.load_bucket("dynamic").expect("load").expect("bucket file");
        assert_eq!(file.entries.len(), 8);
    }
}
