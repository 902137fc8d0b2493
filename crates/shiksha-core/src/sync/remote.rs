use async_trait::async_trait;

use crate::api::{ApiClient, ApiError};
use crate::models::SyncableRecord;

/// Where pending records are pushed.
#[async_trait]
pub trait SyncRemote: Send + Sync {
    /// Submit a batch of game logs. Success means every log was accepted.
    async fn push_game_logs(&self, records: &[SyncableRecord]) -> Result<(), ApiError>;

    async fn push_achievement(&self, record: &SyncableRecord) -> Result<(), ApiError>;
}

#[async_trait]
impl SyncRemote for ApiClient {
    async fn push_game_logs(&self, records: &[SyncableRecord]) -> Result<(), ApiError> {
        self.sync_offline_data(records).await.map(|_| ())
    }

    async fn push_achievement(&self, record: &SyncableRecord) -> Result<(), ApiError> {
        self.post_achievement(record).await.map(|_| ())
    }
}
