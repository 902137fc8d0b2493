use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::now_millis;
use crate::worker::fetch::Response;

/// Entries of one bucket keyed by request URL.
pub type BucketEntries = BTreeMap<String, Response>;

/// Contents of one bucket file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketFile {
    /// Milliseconds since the epoch at the last write.
    pub saved_at: i64,
    pub entries: BucketEntries,
}

/// On-disk home of the cache buckets, one JSON file per bucket.
#[derive(Debug, Clone)]
pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    fn bucket_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name))
    }

    pub fn load_bucket(&self, name: &str) -> Result<Option<BucketFile>> {
        let path = self.bucket_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read bucket file: {}", name))?;
        let file = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse bucket file: {}", name))?;
        Ok(Some(file))
    }

    /// Replace the bucket file. Written to a sibling temp file first so a
    /// crash mid-write leaves the previous contents readable.
    pub fn save_bucket(&self, name: &str, entries: &BucketEntries) -> Result<()> {
        let file = BucketFile {
            saved_at: now_millis(),
            entries: entries.clone(),
        };
        let contents = serde_json::to_string(&file)?;
        let path = self.bucket_path(name);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write bucket file: {}", name))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace bucket file: {}", name))?;
        debug!(bucket = name, entries = entries.len(), "Bucket persisted");
        Ok(())
    }

    pub fn remove_bucket(&self, name: &str) -> Result<()> {
        let path = self.bucket_path(name);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove bucket file: {}", name))?;
        }
        Ok(())
    }

    /// Names of every persisted bucket, sorted.
    pub fn bucket_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// When the bucket was last written; `None` if it never was.
    pub fn bucket_saved_at(&self, name: &str) -> Option<i64> {
        match self.load_bucket(name) {
            Ok(file) => file.map(|f| f.saved_at),
            Err(e) => {
                debug!(bucket = name, error = %e, "Failed to read bucket timestamp");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_round_trip_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = CacheManager::new(dir.path().join("buckets")).expect("manager");

        let mut entries = BucketEntries::new();
        entries.insert("https://shiksha.test/".to_string(), Response::new(200, "<html>"));
        let before = now_millis();
        manager.save_bucket("shiksha-static-v1", &entries).expect("save");

        let loaded = manager
            .load_bucket("shiksha-static-v1")
            .expect("load")
            .expect("bucket present");
        assert_eq!(loaded.entries, entries);
        assert!(loaded.saved_at >= before);
        assert_eq!(manager.bucket_names().expect("names"), vec!["shiksha-static-v1"]);
        assert_eq!(manager.bucket_saved_at("shiksha-static-v1"), Some(loaded.saved_at));

        manager.remove_bucket("shiksha-static-v1").expect("remove");
        assert!(manager.load_bucket("shiksha-static-v1").expect("load").is_none());
        assert_eq!(manager.bucket_saved_at("shiksha-static-v1"), None);
    }

    #[test]
    fn test_unreadable_bucket_has_no_timestamp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = CacheManager::new(dir.path().to_path_buf()).expect("manager");
        std::fs::write(dir.path().join("broken.json"), "{not json").expect("write");

        assert!(manager.load_bucket("broken").is_err());
        assert_eq!(manager.bucket_saved_at("broken"), None);
        assert_eq!(manager.bucket_names().expect("names"), vec!["broken"]);
    }
}
