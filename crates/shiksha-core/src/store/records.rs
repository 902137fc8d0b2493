//! Typed helpers over the record collections.

use serde_json::{json, Value};
use tracing::{debug, info};

use super::{Collection, Result, Store};
use crate::models::{now_millis, GameLog, ProgressEntry, SyncableRecord};

impl Store {
    /// Save a finished game locally. The record starts out pending.
    pub async fn save_game_log(&self, student_id: &str, log: &GameLog) -> Result<SyncableRecord> {
        let record = SyncableRecord::new(student_id, serde_json::to_value(log)?, now_millis());
        self.insert_pending(Collection::GameLogs, record).await
    }

    /// Save an achievement locally. The record starts out pending.
    pub async fn save_achievement(
        &self,
        student_id: &str,
        achievement: Value,
    ) -> Result<SyncableRecord> {
        let record = SyncableRecord::new(student_id, achievement, now_millis());
        self.insert_pending(Collection::Achievements, record).await
    }

    async fn insert_pending(
        &self,
        collection: Collection,
        mut record: SyncableRecord,
    ) -> Result<SyncableRecord> {
        let key = self.add(collection, &record).await?;
        record.id = key.as_int();
        info!(collection = collection.name(), id = ?record.id, "Record saved locally");
        Ok(record)
    }

    /// Records of a collection not yet accepted by the server.
    pub async fn pending(&self, collection: Collection) -> Result<Vec<SyncableRecord>> {
        self.get_by_index(collection, "synced", false).await
    }

    pub async fn pending_count(&self, collection: Collection) -> Result<usize> {
        self.count(collection, "synced", false).await
    }

    /// Flip `synced` on each record.
    pub async fn mark_synced(
        &self,
        collection: Collection,
        records: &[SyncableRecord],
    ) -> Result<()> {
        let records: Vec<SyncableRecord> = records
            .iter()
            .cloned()
            .map(|mut r| {
                r.synced = true;
                r
            })
            .collect();
        let count = records.len();
        for record in &records {
            self.put(collection, record).await?;
        }
        debug!(collection = collection.name(), count, "Records marked synced");
        Ok(())
    }

    pub async fn save_progress(
        &self,
        student_id: &str,
        subject: &str,
        payload: Value,
    ) -> Result<ProgressEntry> {
        let mut entry = ProgressEntry {
            id: None,
            student_id: student_id.to_string(),
            subject: subject.to_string(),
            payload,
            timestamp: now_millis(),
        };
        entry.id = self.add(Collection::UserProgress, &entry).await?.as_int();
        Ok(entry)
    }

    /// Progress entries of a student, optionally for one subject only.
    pub async fn get_progress(
        &self,
        student_id: &str,
        subject: Option<&str>,
    ) -> Result<Vec<ProgressEntry>> {
        let entries: Vec<ProgressEntry> = self
            .get_by_index(Collection::UserProgress, "studentId", student_id)
            .await?;
        Ok(match subject {
            Some(subject) => entries.into_iter().filter(|e| e.subject == subject).collect(),
            None => entries,
        })
    }

    /// Every synced and unsynced record as one backup document.
    pub async fn export(&self) -> Result<Value> {
        let game_logs: Vec<Value> = self.get_all(Collection::GameLogs).await?;
        let achievements: Vec<Value> = self.get_all(Collection::Achievements).await?;
        let progress: Vec<Value> = self.get_all(Collection::UserProgress).await?;
        Ok(json!({
            "gameLogs": game_logs,
            "achievements": achievements,
            "userProgress": progress,
        }))
    }
}
