//! Turns page events, worker messages and a periodic timer into sync passes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::engine::{Lane, SyncEngine, Trigger};
use super::remote::SyncRemote;
use crate::worker::WorkerMessage;

/// Default interval of the periodic sync timer.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Buffer size for the page event channel.
pub const CHANNEL_BUFFER_SIZE: usize = 32;

/// Events raised by the page side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    Online,
    Offline,
    Visible,
    /// A record was saved locally.
    Saved(Lane),
}

/// Sender half handed to whatever observes the page.
pub type PageEvents = mpsc::Sender<PageEvent>;

pub struct SyncScheduler<R> {
    engine: Arc<SyncEngine<R>>,
    interval: Duration,
}

impl<R: SyncRemote + 'static> SyncScheduler<R> {
    pub fn new(engine: Arc<SyncEngine<R>>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Run until the page event channel closes. Each pass runs on its own
    /// task so a slow network never delays the next event.
    pub fn spawn(
        self,
        events: mpsc::Receiver<PageEvent>,
        worker: broadcast::Receiver<WorkerMessage>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(events, worker))
    }

    pub async fn run(
        self,
        mut events: mpsc::Receiver<PageEvent>,
        mut worker: broadcast::Receiver<WorkerMessage>,
    ) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut worker_open = true;

        info!(interval_secs = self.interval.as_secs(), "Sync scheduler started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.dispatch_all(Trigger::Timer);
                }
                event = events.recv() => match event {
                    Some(event) => self.on_page_event(event),
                    None => break,
                },
                message = worker.recv(), if worker_open => match message {
                    Ok(message) => self.on_worker_message(message),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed worker messages");
                        self.dispatch_all(Trigger::Worker);
                    }
                    Err(broadcast::error::RecvError::Closed) => worker_open = false,
                },
            }
        }
        info!("Sync scheduler stopped");
    }

    fn on_page_event(&self, event: PageEvent) {
        debug!(?event, "Page event");
        match event {
            PageEvent::Online => {
                if self.engine.set_online(true) {
                    self.dispatch_all(Trigger::Reconnect);
                    let engine = Arc::clone(&self.engine);
                    tokio::spawn(async move {
                        engine.sync_offline_auth().await;
                    });
                }
            }
            PageEvent::Offline => {
                self.engine.set_online(false);
            }
            PageEvent::Visible => self.dispatch_all(Trigger::Visible),
            PageEvent::Saved(lane) => self.dispatch(lane, Trigger::LocalSave),
        }
    }

    fn on_worker_message(&self, message: WorkerMessage) {
        match message {
            WorkerMessage::SyncGameLogs => self.dispatch(Lane::GameLogs, Trigger::Worker),
            WorkerMessage::SyncAchievements => self.dispatch(Lane::Achievements, Trigger::Worker),
            WorkerMessage::Claimed => debug!("Cache layer claimed the page"),
        }
    }

    fn dispatch_all(&self, trigger: Trigger) {
        for lane in Lane::ALL {
            self.dispatch(lane, trigger);
        }
    }

    fn dispatch(&self, lane: Lane, trigger: Trigger) {
        if !self.engine.is_online() {
            debug!(?lane, ?trigger, "Offline, ignoring trigger");
            return;
        }
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            engine.sync_lane(lane, trigger).await;
        });
    }
}
