//! Application state: every service the commands need, wired together once.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::cookie::Jar;
use reqwest::Url;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use shiksha_core::auth::{AuthError, AuthFlow, InlineMessage, MessageKind};
use shiksha_core::cache::{CacheManager, CacheStorage};
use shiksha_core::catalog::{GameCatalog, GameLoader, GAME_CONTENT_TYPE};
use shiksha_core::config::Config;
use shiksha_core::models::{GameLog, Language};
use shiksha_core::store::Store;
use shiksha_core::sync::{
    Lane, PageEvent, SyncEngine, SyncOutcome, SyncScheduler, Trigger, CHANNEL_BUFFER_SIZE,
};
use shiksha_core::utils::{format_timestamp_ms, truncate_string};
use shiksha_core::worker::{CacheLayer, Fetcher, HttpFetcher, MessageBus};
use shiksha_core::{ApiClient, Session, SessionData};

/// Wrong codes accepted before giving up.
const MAX_CODE_ATTEMPTS: usize = 3;

pub struct App {
    pub config: Config,
    pub session: Session,
    pub store: Option<Store>,
    jar: Arc<Jar>,
    base: Url,
    layer: Arc<CacheLayer<HttpFetcher>>,
    api: ApiClient,
    engine: Arc<SyncEngine<ApiClient>>,
    catalog: GameCatalog,
    loader: GameLoader,
}

impl App {
    /// Build every service. Local storage and the cache layer degrade
    /// instead of failing: the app still runs online-only without them.
    pub async fn bootstrap(config: Config) -> Result<Self> {
        let data_dir = config.data_dir_or_fallback();
        let base = config.api_base()?;
        let timeout = config.request_timeout();
        debug!(?data_dir, %base, "Bootstrapping");

        let store = match Store::open(&config.db_path()) {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(error = %e, "Local storage unavailable, records will not be kept");
                None
            }
        };

        let storage = match CacheManager::new(config.cache_dir()) {
            Ok(manager) => CacheStorage::persistent(manager),
            Err(e) => {
                warn!(error = %e, "Cache directory unavailable, caching in memory only");
                CacheStorage::new()
            }
        };

        let mut session = Session::new(data_dir);
        if let Err(e) = session.load() {
            warn!(error = %e, "Failed to load session");
        }
        let jar = Arc::new(Jar::default());
        session.restore_cookie(&jar, &base);

        let network = HttpFetcher::with_jar(timeout, Arc::clone(&jar))
            .context("Failed to create HTTP client")?;
        let layer = Arc::new(CacheLayer::new(
            network,
            storage,
            MessageBus::new(),
            base.clone(),
            timeout,
        ));
        if let Err(e) = layer.start().await {
            warn!(error = %e, "Cache layer not installed, requests go straight to the network");
        }

        let fetcher: Arc<dyn Fetcher> = layer.clone();
        let api = ApiClient::new(Arc::clone(&fetcher), base.clone());
        let engine = Arc::new(SyncEngine::new(store.clone(), api.clone(), true));
        let loader = GameLoader::new(fetcher, base.clone()).with_store(store.clone());

        Ok(Self {
            config,
            session,
            store,
            jar,
            base,
            layer,
            api,
            engine,
            catalog: GameCatalog::new(),
            loader,
        })
    }

    fn store(&self) -> Result<&Store> {
        self.store
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Local storage is unavailable"))
    }

    fn student_id(&self) -> Result<String> {
        self.config
            .student_id()
            .or_else(|| self.session.contact())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Not logged in. Run `shiksha login` first."))
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub async fn login(&mut self, contact: Option<String>) -> Result<()> {
        println!("\n=== Shiksha Leap Login ===\n");
        let mut flow = AuthFlow::new(self.api.clone(), self.store.clone());

        let contact = match contact {
            Some(contact) => contact,
            None => Self::prompt_contact(self.config.last_contact.as_deref())?,
        };
        let sent = flow.submit_contact(&contact).await;
        Self::print_message(flow.message());
        sent?;

        let mut attempts = 0;
        let verified = loop {
            let raw = rpassword::prompt_password("Code: ")?;
            let result = match flow.input_code(&raw) {
                Some(auto) => match flow.auto_submit(auto).await {
                    Some(result) => result,
                    None => continue,
                },
                None => flow.verify().await,
            };
            Self::print_message(flow.message());
            match result {
                Ok(verified) => break verified,
                Err(AuthError::InvalidCode) => continue,
                Err(AuthError::Rejected(_)) if attempts + 1 < MAX_CODE_ATTEMPTS => attempts += 1,
                Err(e) => return Err(e.into()),
            }
        };

        let contact = flow.contact().to_string();
        self.session.update(SessionData::new(&contact, &verified.redirect, verified.new_user));
        self.session.capture_cookie(&self.jar, &self.base);
        self.session.save()?;

        self.config.last_contact = Some(contact);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        if verified.new_user {
            println!("Welcome! Finish registration at {}", verified.redirect);
        }
        info!("Login complete");
        Ok(())
    }

    fn prompt_contact(last: Option<&str>) -> Result<String> {
        match last {
            Some(last) => print!("Mobile or email [{}]: ", last),
            None => print!("Mobile or email: "),
        }
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();
        Ok(match (input.is_empty(), last) {
            (true, Some(last)) => last.to_string(),
            _ => input.to_string(),
        })
    }

    fn print_message(message: Option<&InlineMessage>) {
        if let Some(message) = message {
            match message.kind {
                MessageKind::Error => eprintln!("✗ {}", message.text),
                MessageKind::Success => println!("✓ {}", message.text),
            }
        }
    }

    /// Clear the session, every local record and the settings.
    pub async fn logout(&mut self) -> Result<()> {
        self.session.clear()?;
        if let Some(store) = &self.store {
            store.clear_all().await?;
            store.clear_settings().await?;
        }
        println!("Logged out. Local data cleared.");
        Ok(())
    }

    // =========================================================================
    // Records
    // =========================================================================

    pub async fn log_game(&self, log: GameLog) -> Result<()> {
        let record = self.store()?.save_game_log(&self.student_id()?, &log).await?;
        println!(
            "Saved {} ({}/{}, {}%)",
            log.game_id,
            log.score,
            log.max_score,
            log.percentage()
        );
        debug!(id = ?record.id, "Game log saved");
        self.report(Lane::GameLogs, self.engine.sync_game_logs(Trigger::LocalSave).await);
        Ok(())
    }

    pub async fn add_achievement(&self, badge: &str, description: Option<&str>) -> Result<()> {
        let achievement = json!({
            "badge": badge,
            "description": description.unwrap_or_default(),
        });
        self.store()?.save_achievement(&self.student_id()?, achievement).await?;
        println!("Saved achievement {}", badge);
        self.report(Lane::Achievements, self.engine.sync_achievements(Trigger::LocalSave).await);
        Ok(())
    }

    pub async fn save_progress(&self, subject: &str, payload: Value) -> Result<()> {
        self.store()?.save_progress(&self.student_id()?, subject, payload).await?;
        println!("Progress saved for {}", subject);
        Ok(())
    }

    pub async fn show_progress(&self, subject: Option<&str>) -> Result<()> {
        let entries = self.store()?.get_progress(&self.student_id()?, subject).await?;
        if entries.is_empty() {
            println!("No progress recorded.");
        }
        for entry in entries {
            println!(
                "{:<24} {}  {}",
                entry.subject,
                format_timestamp_ms(entry.timestamp),
                truncate_string(&entry.payload.to_string(), 60)
            );
        }
        Ok(())
    }

    pub async fn export(&self) -> Result<()> {
        let dump = self.store()?.export().await?;
        println!("{}", serde_json::to_string_pretty(&dump)?);
        Ok(())
    }

    // =========================================================================
    // Sync
    // =========================================================================

    pub async fn sync(&self) -> Result<()> {
        let (logs, achievements) = self.engine.sync_all(Trigger::Manual).await;
        self.report(Lane::GameLogs, logs);
        self.report(Lane::Achievements, achievements);
        let reported = self.engine.sync_offline_auth().await;
        if reported > 0 {
            println!("Reported {} offline login attempt(s)", reported);
        }
        Ok(())
    }

    fn report(&self, lane: Lane, outcome: SyncOutcome) {
        let name = lane.collection().name();
        match outcome {
            SyncOutcome::Idle => println!("{}: nothing to sync", name),
            SyncOutcome::Skipped { reason } => println!("{}: skipped ({:?})", name, reason),
            SyncOutcome::Synced { count } => println!("{}: synced {}", name, count),
            SyncOutcome::Failed { synced, reason } => {
                eprintln!(
                    "{}: sync failed after {} ({}); records kept for retry",
                    name, synced, reason
                )
            }
        }
    }

    /// Keep syncing in the background. Reads `online`, `offline` and
    /// `visible` from stdin until EOF.
    pub async fn watch(&self) -> Result<()> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let scheduler = SyncScheduler::new(Arc::clone(&self.engine), self.config.sync_interval());
        let handle = scheduler.spawn(rx, self.layer.bus().subscribe());

        println!("Watching. Type online, offline, visible or sync; Ctrl-D to stop.");
        let bus = self.layer.bus().clone();
        let reader = std::thread::spawn(move || {
            for line in io::stdin().lines().map_while(|l| l.ok()) {
                let event = match line.trim() {
                    "online" => PageEvent::Online,
                    "offline" => PageEvent::Offline,
                    "visible" => PageEvent::Visible,
                    "sync" => {
                        bus.post(shiksha_core::WorkerMessage::SyncGameLogs);
                        bus.post(shiksha_core::WorkerMessage::SyncAchievements);
                        continue;
                    }
                    "" => continue,
                    other => {
                        eprintln!("Unknown event: {}", other);
                        continue;
                    }
                };
                if tx.blocking_send(event).is_err() {
                    break;
                }
            }
        });

        let mut events = self.engine.subscribe();
        let printer = tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                println!("{:?}: {:?}", event.lane, event.outcome);
            }
        });

        handle.await.context("Sync scheduler panicked")?;
        printer.abort();
        if reader.join().is_err() {
            warn!("Input reader panicked");
        }
        Ok(())
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub async fn status(&self) -> Result<()> {
        match &self.session.data {
            Some(data) if !data.is_expired() => println!(
                "Logged in as {} ({} days left)",
                shiksha_core::auth::mask_contact(&data.contact),
                data.days_until_expiry()
            ),
            _ => println!("Not logged in"),
        }

        let status = self.engine.status().await;
        println!(
            "Pending: {} game log(s), {} achievement(s)",
            status.pending_game_logs, status.pending_achievements
        );
        match &self.store {
            Some(store) => {
                let games = store
                    .cached_content_by_type(GAME_CONTENT_TYPE)
                    .await
                    .map(|g| g.len())
                    .unwrap_or(0);
                println!("Games saved offline: {}", games);
                let language = store.language().await.unwrap_or_default();
                println!("Language: {}", language.display_name());
            }
            None => println!("Local storage: unavailable"),
        }

        println!("Cache layer: {:?}", self.layer.state());
        let storage = self.layer.storage();
        for name in storage.keys().await {
            let saved = storage
                .manager()
                .and_then(|m| m.bucket_saved_at(&name))
                .map(|ms| format!("saved {}", format_timestamp_ms(ms)))
                .unwrap_or_else(|| "not persisted".to_string());
            println!("  {:<22} {:>4} entries  ({})", name, storage.len(&name).await, saved);
        }
        Ok(())
    }

    pub async fn language(&self, code: Option<&str>) -> Result<()> {
        let store = self.store()?;
        match code {
            Some(code) => {
                let language: Language = code.parse().map_err(anyhow::Error::msg)?;
                store.set_language(language).await?;
                println!("Language set to {}", language.display_name());
            }
            None => {
                let current = store.language().await?;
                for language in Language::ALL {
                    let marker = if language == current { "*" } else { " " };
                    println!("{} {}  {}", marker, language.code(), language.display_name());
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    pub fn games(&self, grade: u8, filter: GameFilter<'_>) {
        match filter {
            GameFilter::All => {
                let stats = self.catalog.stats(grade, None);
                println!(
                    "Grade {}: {} games in {} subjects",
                    grade,
                    stats.total_games,
                    stats.subjects.len()
                );
                for subject in self.catalog.subjects_for(grade) {
                    println!("  {:<22} {} games", subject.name, subject.game_count);
                }
            }
            GameFilter::Subject(subject) => {
                for game in self.catalog.games_for(grade, subject) {
                    println!("  {:<28} {}", game.id, game.path);
                }
            }
            GameFilter::Search(keyword) => {
                for game in self.catalog.search(grade, keyword) {
                    println!("  {:<22} {:<28} {}", game.subject, game.id, game.path);
                }
            }
            GameFilter::Recommended(seed) => {
                let picks = match seed {
                    Some(seed) => self.catalog.recommend_seeded(grade, seed),
                    None => self.catalog.recommend(grade),
                };
                for pick in picks {
                    println!("  {:<28} {}", pick.entry.path, pick.reason);
                }
            }
        }
    }

    pub async fn fetch_game(&self, grade: u8, file_name: &str) -> Result<()> {
        let game = self.loader.load_or_placeholder(grade, file_name).await;
        println!("{}", serde_json::to_string_pretty(&game)?);
        Ok(())
    }
}

pub enum GameFilter<'a> {
    All,
    Subject(&'a str),
    Search(&'a str),
    Recommended(Option<u64>),
}
