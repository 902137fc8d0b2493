//! Pushes pending records to the server.
//!
//! Each collection is a lane with its own in-flight flag and backoff
//! window. A trigger that arrives while a lane is busy is dropped, not
//! queued. Records are only marked synced after the server accepts them, so
//! delivery is at-least-once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::remote::SyncRemote;
use crate::models::SyncableRecord;
use crate::store::{Collection, Store};

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub enum Lane {
    GameLogs,
    Achievements,
}

impl Lane {
    pub const ALL: [Lane; 2] = [Lane::GameLogs, Lane::Achievements];

    pub fn collection(&self) -> Collection {
        match self {
            Lane::GameLogs => Collection::GameLogs,
            Lane::Achievements => Collection::Achievements,
        }
    }

    fn index(&self) -> usize {
        match self {
            Lane::GameLogs => 0,
            Lane::Achievements => 1,
        }
    }
}

/// What started a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    Reconnect,
    Visible,
    Worker,
    LocalSave,
    Manual,
}

impl Trigger {
    /// Only the periodic timer respects the backoff window.
    pub fn bypasses_backoff(&self) -> bool {
        !matches!(self, Trigger::Timer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub enum SkipReason {
    Offline,
    NoStore,
    InFlight,
    BackingOff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub enum SyncOutcome {
    /// Nothing was pending; no network call was made.
    Idle,
    Skipped { reason: SkipReason },
    Synced { count: usize },
    /// Some or all records are still pending. `synced` were accepted.
    Failed { synced: usize, reason: String },
}

impl SyncOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SyncOutcome::Failed { .. })
    }
}

/// Broadcast after every pass that reached the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct SyncEvent {
    pub lane: Lane,
    pub outcome: SyncOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct SyncStatus {
    pub is_online: bool,
    pub pending_game_logs: usize,
    pub pending_achievements: usize,
    pub total_pending: usize,
}

#[derive(Default)]
struct LaneState {
    in_flight: AtomicBool,
    backoff: Mutex<Backoff>,
}

impl LaneState {
    fn backoff(&self) -> MutexGuard<'_, Backoff> {
        self.backoff.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the lane's in-flight flag when dropped, including on early return
/// or when the pass future is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncEngine<R> {
    store: Option<Store>,
    remote: R,
    online: AtomicBool,
    lanes: [LaneState; 2],
    events: broadcast::Sender<SyncEvent>,
}

impl<R: SyncRemote> SyncEngine<R> {
    /// `store` is `None` when local storage could not be opened; every pass
    /// is then skipped.
    pub fn new(store: Option<Store>, remote: R, online: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            remote,
            online: AtomicBool::new(online),
            lanes: Default::default(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Record connectivity. Returns true when this flips offline to online.
    pub fn set_online(&self, online: bool) -> bool {
        let was = self.online.swap(online, Ordering::AcqRel);
        if was != online {
            info!(online, "Connectivity changed");
        }
        online && !was
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn store(&self) -> Option<&Store> {
        self.store.as_ref()
    }

    pub fn backoff_remaining(&self, lane: Lane) -> Option<std::time::Duration> {
        self.lanes[lane.index()].backoff().remaining(Instant::now())
    }

    // ===== Passes =====

    pub async fn sync_game_logs(&self, trigger: Trigger) -> SyncOutcome {
        self.sync_lane(Lane::GameLogs, trigger).await
    }

    pub async fn sync_achievements(&self, trigger: Trigger) -> SyncOutcome {
        self.sync_lane(Lane::Achievements, trigger).await
    }

    /// Both lanes concurrently.
    pub async fn sync_all(&self, trigger: Trigger) -> (SyncOutcome, SyncOutcome) {
        tokio::join!(
            self.sync_lane(Lane::GameLogs, trigger),
            self.sync_lane(Lane::Achievements, trigger)
        )
    }

    pub async fn sync_lane(&self, lane: Lane, trigger: Trigger) -> SyncOutcome {
        let state = &self.lanes[lane.index()];

        if !self.is_online() {
            return SyncOutcome::Skipped { reason: SkipReason::Offline };
        }
        let Some(store) = &self.store else {
            return SyncOutcome::Skipped { reason: SkipReason::NoStore };
        };
        if !trigger.bypasses_backoff() && state.backoff().is_waiting(Instant::now()) {
            debug!(?lane, "Backing off, skipping timer sync");
            return SyncOutcome::Skipped { reason: SkipReason::BackingOff };
        }
        let Some(_guard) = InFlight::acquire(&state.in_flight) else {
            debug!(?lane, "Sync already in flight");
            return SyncOutcome::Skipped { reason: SkipReason::InFlight };
        };

        let collection = lane.collection();
        let pending = match store.pending(collection).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(?lane, error = %e, "Cannot read pending records");
                return SyncOutcome::Failed {
                    synced: 0,
                    reason: e.to_string(),
                };
            }
        };
        if pending.is_empty() {
            debug!(?lane, "Nothing to sync");
            return SyncOutcome::Idle;
        }

        info!(?lane, ?trigger, count = pending.len(), "Syncing pending records");
        let (accepted, failure) = self.push(lane, &pending).await;

        let mut synced = 0;
        let mut failure = failure;
        if !accepted.is_empty() {
            match store.mark_synced(collection, &accepted).await {
                Ok(()) => synced = accepted.len(),
                Err(e) => {
                    // Left pending; the server sees them again next pass.
                    warn!(?lane, error = %e, "Failed to mark records synced");
                    failure.get_or_insert_with(|| e.to_string());
                }
            }
        }

        let outcome = match failure {
            None => {
                state.backoff().reset();
                info!(?lane, count = synced, "Sync complete");
                SyncOutcome::Synced { count: synced }
            }
            Some(reason) => {
                let delay = state.backoff().record_failure(Instant::now());
                warn!(?lane, synced, error = %reason, retry_in = ?delay, "Sync failed, will retry");
                SyncOutcome::Failed { synced, reason }
            }
        };

        let _ = self.events.send(SyncEvent {
            lane,
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Submit records. Returns those the server accepted and the first error.
    async fn push(
        &self,
        lane: Lane,
        pending: &[SyncableRecord],
    ) -> (Vec<SyncableRecord>, Option<String>) {
        match lane {
            Lane::GameLogs => match self.remote.push_game_logs(pending).await {
                Ok(()) => (pending.to_vec(), None),
                Err(e) => (Vec::new(), Some(e.to_string())),
            },
            Lane::Achievements => {
                let mut accepted = Vec::new();
                let mut failure = None;
                for record in pending {
                    match self.remote.push_achievement(record).await {
                        Ok(()) => accepted.push(record.clone()),
                        Err(e) => {
                            debug!(id = ?record.id, error = %e, "Achievement not accepted");
                            failure.get_or_insert_with(|| e.to_string());
                        }
                    }
                }
                (accepted, failure)
            }
        }
    }

    // ===== Status =====

    /// Pending counts. A failing store reports zero.
    pub async fn status(&self) -> SyncStatus {
        let (pending_game_logs, pending_achievements) = match &self.store {
            Some(store) => {
                let logs = store.pending_count(Collection::GameLogs).await;
                let achievements = store.pending_count(Collection::Achievements).await;
                match (logs, achievements) {
                    (Ok(logs), Ok(achievements)) => (logs, achievements),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!(error = %e, "Failed to count pending records");
                        (0, 0)
                    }
                }
            }
            None => (0, 0),
        };
        SyncStatus {
            is_online: self.is_online(),
            pending_game_logs,
            pending_achievements,
            total_pending: pending_game_logs + pending_achievements,
        }
    }

    /// Report and clear login attempts made while offline. Returns how many
    /// were cleared.
    pub async fn sync_offline_auth(&self) -> usize {
        if !self.is_online() {
            return 0;
        }
        let Some(store) = &self.store else {
            return 0;
        };
        let attempts = match store.offline_auth_attempts().await {
            Ok(attempts) => attempts,
            Err(e) => {
                warn!(error = %e, "Failed to read offline auth attempts");
                return 0;
            }
        };
        if attempts.is_empty() {
            return 0;
        }
        for attempt in &attempts {
            info!(
                contact = %crate::auth::mask_contact(&attempt.contact),
                timestamp = attempt.timestamp,
                "Offline login attempt"
            );
        }
        if let Err(e) = store.clear_offline_auth_attempts().await {
            warn!(error = %e, "Failed to clear offline auth attempts");
            return 0;
        }
        attempts.len()
    }
}
