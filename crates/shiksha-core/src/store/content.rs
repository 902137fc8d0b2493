//! Learning content cached for offline play.
//!
//! Entries expire after `CONTENT_TTL_HOURS`; stale entries stay on disk but
//! read as absent.

use serde_json::Value;
use tracing::debug;

use super::{Collection, Result, Store};
use crate::models::{now_millis, CachedContentEntry};

impl Store {
    pub async fn cache_content(
        &self,
        id: &str,
        content: Value,
        content_type: &str,
        grade: Option<u8>,
    ) -> Result<()> {
        let entry = CachedContentEntry {
            id: id.to_string(),
            content,
            content_type: content_type.to_string(),
            grade,
            cached_at: now_millis(),
        };
        self.put(Collection::CachedContent, &entry).await?;
        debug!(id, "Content cached");
        Ok(())
    }

    /// Cached content if present and still fresh.
    pub async fn get_cached_content(&self, id: &str) -> Result<Option<Value>> {
        self.get_cached_content_at(id, now_millis()).await
    }

    pub(crate) async fn get_cached_content_at(
        &self,
        id: &str,
        now_ms: i64,
    ) -> Result<Option<Value>> {
        let entry: Option<CachedContentEntry> = self.get(Collection::CachedContent, id).await?;
        Ok(match entry {
            Some(entry) if !entry.is_stale(now_ms) => Some(entry.content),
            Some(_) => {
                debug!(id, "Cached content is stale");
                None
            }
            None => None,
        })
    }

    /// Fresh cached entries of one content type.
    pub async fn cached_content_by_type(
        &self,
        content_type: &str,
    ) -> Result<Vec<CachedContentEntry>> {
        let now = now_millis();
        let entries: Vec<CachedContentEntry> = self
            .get_by_index(Collection::CachedContent, "type", content_type)
            .await?;
        Ok(entries.into_iter().filter(|e| !e.is_stale(now)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CONTENT_TTL_HOURS;
    use serde_json::json;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn store() -> Store {
        Store::open_in_memory().expect("open in-memory store")
    }

    #[tokio::test]
    async fn test_fresh_content_is_returned() {
        let store = store();
        store
            .cache_content("quiz-6-maths", json!({"questions": 3}), "quiz", Some(6))
            .await
            .expect("cache");
        let content = store.get_cached_content("quiz-6-maths").await.expect("get");
        assert_eq!(content, Some(json!({"questions": 3})));
    }

    #[tokio::test]
    async fn test_stale_content_reads_as_absent() {
        let store = store();
        store
            .put(
                Collection::CachedContent,
                &CachedContentEntry {
                    id: "old".to_string(),
                    content: json!("x"),
                    content_type: "game".to_string(),
                    grade: None,
                    cached_at: 0,
                },
            )
            .await
            .expect("put");

        let just_fresh = store
            .get_cached_content_at("old", CONTENT_TTL_HOURS * HOUR_MS)
            .await
            .expect("get");
        assert_eq!(just_fresh, Some(json!("x")));

        let stale = store
            .get_cached_content_at("old", CONTENT_TTL_HOURS * HOUR_MS + 1)
            .await
            .expect("get");
        assert_eq!(stale, None);
    }

    #[tokio::test]
    async fn test_missing_content_is_none() {
        let store = store();
        assert_eq!(store.get_cached_content("nope").await.expect("get"), None);
    }

    #[tokio::test]
    async fn test_cached_content_by_type() {
        let store = store();
        store.cache_content("a", json!(1), "quiz", Some(6)).await.expect("a");
        store.cache_content("b", json!(2), "game", Some(6)).await.expect("b");
        let quizzes = store.cached_content_by_type("quiz").await.expect("quizzes");
        assert_eq!(quizzes.len(), 1);
        assert_eq!(quizzes[0].id, "a");
    }
}
