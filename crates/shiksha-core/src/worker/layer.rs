//! The network cache layer.
//!
//! `CacheLayer` sits between every caller and the network. API calls are
//! network-first with a cached or structured offline fallback; everything
//! else is cache-first. The layer only controls requests once activated;
//! before that it passes requests straight through.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Url;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::fetch::{FetchError, Fetcher, Method, Request, Response, ResponseKind};
use super::manifest::{self, ALLOWED_CACHES, CORE_ASSETS, DYNAMIC_CACHE, STATIC_CACHE};
use super::messages::{MessageBus, WorkerMessage};
use crate::cache::CacheStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; a fresh layer retries on the next start.
    Redundant,
}

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("failed to fetch core asset {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("core asset {url} returned status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("invalid asset path {0}")]
    InvalidPath(String),

    #[error("cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: WorkerState,
    },
}

pub struct CacheLayer<F> {
    network: F,
    storage: CacheStorage,
    bus: MessageBus,
    origin: Url,
    timeout: Duration,
    state: watch::Sender<WorkerState>,
}

impl<F: Fetcher> CacheLayer<F> {
    pub fn new(
        network: F,
        storage: CacheStorage,
        bus: MessageBus,
        origin: Url,
        timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Parsed);
        Self {
            network,
            storage,
            bus,
            origin,
            timeout,
            state,
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn set_state(&self, state: WorkerState) {
        let previous = self.state.send_replace(state);
        debug!(?previous, ?state, "Worker state changed");
    }

    fn asset_url(&self, path: &str) -> Result<Url, InstallError> {
        self.origin
            .join(path)
            .map_err(|_| InstallError::InvalidPath(path.to_string()))
    }

    // ===== Lifecycle =====

    /// Fetch every core asset and store them together. Nothing is stored
    /// unless every asset succeeds.
    pub async fn install(&self) -> Result<(), InstallError> {
        let state = self.state();
        if !matches!(state, WorkerState::Parsed | WorkerState::Redundant) {
            return Err(InstallError::InvalidState { action: "install", state });
        }
        self.set_state(WorkerState::Installing);
        info!(assets = CORE_ASSETS.len(), "Caching core assets");

        match self.fetch_core_assets().await {
            Ok(entries) => {
                self.storage.put_all(STATIC_CACHE, entries).await;
                self.set_state(WorkerState::Installed);
                info!("Core assets cached");
                Ok(())
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant);
                warn!(error = %e, "Failed to cache core assets");
                Err(e)
            }
        }
    }

    async fn fetch_core_assets(&self) -> Result<Vec<(String, Response)>, InstallError> {
        let requests = CORE_ASSETS
            .iter()
            .map(|path| self.asset_url(path).map(Request::get))
            .collect::<Result<Vec<_>, _>>()?;

        let results = join_all(requests.into_iter().map(|request| async move {
            let key = request.cache_key();
            (key, self.fetch_network(request).await)
        }))
        .await;

        results
            .into_iter()
            .map(|(url, result)| match result {
                Ok(response) if response.ok() => Ok((url, response)),
                Ok(response) => Err(InstallError::BadStatus {
                    url,
                    status: response.status,
                }),
                Err(source) => Err(InstallError::Fetch { url, source }),
            })
            .collect()
    }

    /// Drop buckets left by older versions and take control of open pages.
    /// Returns the deleted bucket names.
    pub async fn activate(&self) -> Result<Vec<String>, InstallError> {
        let state = self.state();
        if state != WorkerState::Installed {
            return Err(InstallError::InvalidState { action: "activate", state });
        }
        self.set_state(WorkerState::Activating);

        let mut deleted = Vec::new();
        for name in self.storage.keys().await {
            if !ALLOWED_CACHES.contains(&name.as_str()) {
                info!(bucket = %name, "Deleting old cache");
                self.storage.delete(&name).await;
                deleted.push(name);
            }
        }

        self.set_state(WorkerState::Activated);
        self.bus.post(WorkerMessage::Claimed);
        Ok(deleted)
    }

    /// Install (unless every core asset is already cached) and activate.
    pub async fn start(&self) -> Result<(), InstallError> {
        if self.has_core_assets().await {
            debug!("Core assets already cached, skipping install");
            self.set_state(WorkerState::Installed);
        } else {
            self.install().await?;
        }
        self.activate().await?;
        Ok(())
    }

    async fn has_core_assets(&self) -> bool {
        for path in CORE_ASSETS {
            let Ok(url) = self.asset_url(path) else {
                return false;
            };
            if self.storage.match_in(STATIC_CACHE, url.as_str()).await.is_none() {
                return false;
            }
        }
        true
    }

    // ===== Background sync =====

    /// Forward a platform sync signal to the pages, which do the work.
    pub fn on_sync(&self, tag: &str) -> Option<WorkerMessage> {
        match WorkerMessage::from_sync_tag(tag) {
            Some(message) => {
                info!(tag, "Background sync requested");
                self.bus.post(message);
                Some(message)
            }
            None => {
                warn!(tag, "Ignoring unknown sync tag");
                None
            }
        }
    }

    // ===== Fetch =====

    /// Route a request. Once activated this never fails: offline requests
    /// resolve to a cached copy or a generated fallback.
    pub async fn handle_fetch(&self, request: Request) -> Result<Response, FetchError> {
        if self.state() != WorkerState::Activated {
            return self.fetch_network(request).await;
        }
        if manifest::is_api(request.path()) {
            Ok(self.network_first(request).await)
        } else {
            Ok(self.cache_first(request).await)
        }
    }

    async fn fetch_network(&self, request: Request) -> Result<Response, FetchError> {
        tokio::time::timeout(self.timeout, self.network.fetch(request))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))?
    }

    async fn network_first(&self, request: Request) -> Response {
        let is_get = request.method == Method::Get;
        let key = request.cache_key();

        match self.fetch_network(request).await {
            Ok(response) => {
                if is_get && response.ok() {
                    self.storage.put(DYNAMIC_CACHE, &key, response.clone()).await;
                }
                response
            }
            Err(e) => {
                debug!(url = %key, error = %e, "API request failed, checking cache");
                if is_get {
                    if let Some(cached) = self.storage.match_any(&key).await {
                        return cached;
                    }
                }
                Response::offline_api()
            }
        }
    }

    async fn cache_first(&self, request: Request) -> Response {
        let key = request.cache_key();
        let cacheable_method = matches!(request.method, Method::Get | Method::Head);

        if cacheable_method {
            if let Some(cached) = self.storage.match_any(&key).await {
                debug!(url = %key, "Serving from cache");
                return cached;
            }
        }

        let is_navigation = request.is_navigation();
        let bucket = manifest::bucket_for(request.path());
        let is_get = request.method == Method::Get;

        match self.fetch_network(request).await {
            Ok(response) => {
                if is_get && response.status == 200 && response.kind != ResponseKind::Opaque {
                    self.storage.put(bucket, &key, response.clone()).await;
                }
                response
            }
            Err(e) => {
                debug!(url = %key, error = %e, "Network failed, serving offline fallback");
                self.offline_fallback(is_navigation).await
            }
        }
    }

    async fn offline_fallback(&self, is_navigation: bool) -> Response {
        if !is_navigation {
            return Response::offline_plain();
        }
        let home = match self.asset_url("/") {
            Ok(url) => self.storage.match_in(STATIC_CACHE, url.as_str()).await,
            Err(_) => None,
        };
        home.unwrap_or_else(Response::offline_page)
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for CacheLayer<F> {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        self.handle_fetch(request).await
    }
}
