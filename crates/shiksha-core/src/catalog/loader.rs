use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Url;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::store::Store;
use crate::worker::{FetchError, Fetcher, Request};

/// Content type under which loaded games are kept in the store.
pub const GAME_CONTENT_TYPE: &str = "game";

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("invalid game path: {0}")]
    Path(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("server returned {status} {status_text}")]
    Status { status: u16, status_text: String },

    #[error("game file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Loads game definitions through the cache layer and keeps them in memory.
///
/// With a store attached, every game fetched is also saved as cached
/// content and read back from there when the network fails.
pub struct GameLoader {
    fetcher: Arc<dyn Fetcher>,
    origin: Url,
    store: Option<Store>,
    games: RwLock<HashMap<String, Value>>,
}

impl GameLoader {
    pub fn new(fetcher: Arc<dyn Fetcher>, origin: Url) -> Self {
        Self {
            fetcher,
            origin,
            store: None,
            games: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_store(mut self, store: Option<Store>) -> Self {
        self.store = store;
        self
    }

    /// Memo and cached-content key; file names repeat across grades.
    pub fn key(grade: u8, file_name: &str) -> String {
        format!("{}_{}", grade, file_name)
    }

    /// The real game: from memory, the network, or the store's offline copy.
    pub async fn load(&self, grade: u8, file_name: &str) -> Result<Value, LoadError> {
        let key = Self::key(grade, file_name);
        if let Some(game) = self.games.read().await.get(&key) {
            return Ok(game.clone());
        }

        let game = match self.fetch(grade, file_name).await {
            Ok(game) => {
                debug!(grade, file_name, "Game loaded");
                self.save_offline(&key, grade, &game).await;
                game
            }
            Err(e) => match self.offline_copy(&key).await {
                Some(game) => {
                    debug!(grade, file_name, error = %e, "Game loaded from offline copy");
                    game
                }
                None => return Err(e),
            },
        };
        self.games.write().await.insert(key, game.clone());
        Ok(game)
    }

    /// Like `load`, but a game that cannot be found anywhere becomes a
    /// placeholder. Placeholders are neither memoized nor stored.
    pub async fn load_or_placeholder(&self, grade: u8, file_name: &str) -> Value {
        match self.load(grade, file_name).await {
            Ok(game) => game,
            Err(e) => {
                warn!(grade, file_name, error = %e, "Failed to load game, using placeholder");
                Self::placeholder(grade, file_name)
            }
        }
    }

    async fn fetch(&self, grade: u8, file_name: &str) -> Result<Value, LoadError> {
        let url = self
            .origin
            .join(&format!("/games/grade_{}/{}", grade, file_name))
            .map_err(|e| LoadError::Path(e.to_string()))?;
        let response = self.fetcher.fetch(Request::get(url)).await?;
        if !response.ok() {
            return Err(LoadError::Status {
                status: response.status,
                status_text: response.status_text.clone(),
            });
        }
        Ok(response.json()?)
    }

    async fn save_offline(&self, key: &str, grade: u8, game: &Value) {
        if let Some(store) = &self.store {
            let saved = store
                .cache_content(key, game.clone(), GAME_CONTENT_TYPE, Some(grade))
                .await;
            if let Err(e) = saved {
                warn!(key, error = %e, "Failed to save game for offline use");
            }
        }
    }

    async fn offline_copy(&self, key: &str) -> Option<Value> {
        let store = self.store.as_ref()?;
        match store.get_cached_content(key).await {
            Ok(game) => game,
            Err(e) => {
                warn!(key, error = %e, "Failed to read offline game");
                None
            }
        }
    }

    /// A one-question quiz standing in for a game that could not be loaded.
    pub fn placeholder(grade: u8, file_name: &str) -> Value {
        json!({
            "game_id": format!("mock_{}_{}", grade, file_name),
            "title": format!("Grade {} Game", grade),
            "description": "Interactive learning game",
            "grade": grade,
            "subject": "General",
            "difficulty": "medium",
            "time_limit": 600,
            "game_type": "quiz",
            "odia_syllabus": true,
            "instructions": "Complete the challenges to earn points",
            "levels": [{
                "level": 1,
                "title": "Basic Level",
                "questions": [{
                    "question": format!("Sample question for Grade {}", grade),
                    "options": ["Option A", "Option B", "Option C", "Option D"],
                    "correct": 0
                }],
                "points": 20
            }],
            "scoring": {"total_points": 100, "passing_score": 60}
        })
    }

    pub async fn cache_size(&self) -> usize {
        self.games.read().await.len()
    }

    pub async fn clear_cache(&self) {
        self.games.write().await.clear();
        debug!("Game cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::Response;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct OneGame {
        calls: AtomicUsize,
        offline: AtomicBool,
    }

    #[async_trait]
    impl Fetcher for OneGame {
        async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(FetchError::Network("offline".to_string()));
            }
            match request.path() {
                "/games/grade_6/maths_game1.json" => Ok(Response::json_body(
                    200,
                    &json!({"game_id": "maths_6_1", "title": "Fractions"}),
                )),
                "/games/grade_6/odia_game1.json" => Ok(Response::new(404, "missing")),
                _ => Err(FetchError::Network("unreachable".to_string())),
            }
        }
    }

    fn loader(store: Option<Store>) -> (GameLoader, Arc<OneGame>) {
        let fetcher = Arc::new(OneGame {
            calls: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
        });
        let origin = Url::parse("https://shiksha.test/").expect("url");
        (GameLoader::new(fetcher.clone(), origin).with_store(store), fetcher)
    }

    #[tokio::test]
    async fn test_load_memoizes() {
        let (loader, fetcher) = loader(None);
        let game = loader.load(6, "maths_game1.json").await.expect("game");
        assert_eq!(game["title"], "Fractions");
        let again = loader.load(6, "maths_game1.json").await.expect("game");
        assert_eq!(game, again);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(loader.cache_size().await, 1);

        loader.clear_cache().await;
        assert_eq!(loader.cache_size().await, 0);
    }

    #[tokio::test]
    async fn test_failures_report_errors() {
        let (loader, _) = loader(None);
        assert!(matches!(
            loader.load(6, "odia_game1.json").await,
            Err(LoadError::Status { status: 404, .. })
        ));
        assert!(matches!(
            loader.load(9, "science_game2.json").await,
            Err(LoadError::Fetch(FetchError::Network(_)))
        ));
    }

    #[tokio::test]
    async fn test_failures_fall_back_to_placeholder() {
        let (loader, _) = loader(None);
        let missing = loader.load_or_placeholder(6, "odia_game1.json").await;
        assert_eq!(missing["game_id"], "mock_6_odia_game1.json");

        let offline = loader.load_or_placeholder(9, "science_game2.json").await;
        assert_eq!(offline["title"], "Grade 9 Game");
        assert_eq!(
            offline["levels"][0]["questions"][0]["question"],
            "Sample question for Grade 9"
        );
        assert_eq!(loader.cache_size().await, 0);
    }

    #[tokio::test]
    async fn test_placeholder_is_never_stored() {
        let store = Store::open_in_memory().expect("store");
        let (loader, _) = loader(Some(store.clone()));
        loader.load_or_placeholder(6, "odia_game1.json").await;

        let key = GameLoader::key(6, "odia_game1.json");
        assert_eq!(store.get_cached_content(&key).await.expect("read"), None);
        assert!(store
            .cached_content_by_type(GAME_CONTENT_TYPE)
            .await
            .expect("by type")
            .is_empty());
    }

    #[tokio::test]
    async fn test_offline_reload_uses_stored_game() {
        let store = Store::open_in_memory().expect("store");
        let (online, _) = loader(Some(store.clone()));
        online.load(6, "maths_game1.json").await.expect("game");

        let key = GameLoader::key(6, "maths_game1.json");
        let stored = store.get_cached_content(&key).await.expect("read");
        assert_eq!(stored.as_ref().map(|g| &g["title"]), Some(&json!("Fractions")));

        // A fresh loader has an empty memo, as after a restart.
        let (offline, fetcher) = loader(Some(store));
        fetcher.offline.store(true, Ordering::SeqCst);
        let game = offline.load_or_placeholder(6, "maths_game1.json").await;
        assert_eq!(game["title"], "Fractions");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        let never_seen = offline.load_or_placeholder(7, "maths_game1.json").await;
        assert_eq!(never_seen["title"], "Grade 7 Game");
    }
}
