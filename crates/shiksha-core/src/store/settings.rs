//! Key/value preferences kept next to the record collections.

use rusqlite::OptionalExtension;
use tracing::warn;

use super::{Result, Store};
use crate::models::{Language, OfflineAuthAttempt};

/// Preferred interface language
pub const LANGUAGE_KEY: &str = "shikshaLanguage";

/// Login attempts made while offline
pub const OFFLINE_AUTH_KEY: &str = "offlineAuthAttempts";

impl Store {
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.call(move |conn| {
            Ok(conn
                .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| row.get(0))
                .optional()?)
        })
        .await
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                [key, value],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn remove_setting(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.call(move |conn| {
            conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
            Ok(())
        })
        .await
    }

    pub async fn clear_settings(&self) -> Result<()> {
        self.call(|conn| {
            conn.execute("DELETE FROM settings", [])?;
            Ok(())
        })
        .await
    }

    /// Saved language, falling back to English when unset or unrecognised.
    pub async fn language(&self) -> Result<Language> {
        let saved = self.get_setting(LANGUAGE_KEY).await?;
        Ok(match saved {
            Some(code) => code.parse().unwrap_or_else(|e| {
                warn!(error = %e, "Ignoring saved language");
                Language::default()
            }),
            None => Language::default(),
        })
    }

    pub async fn set_language(&self, language: Language) -> Result<()> {
        self.set_setting(LANGUAGE_KEY, language.code()).await
    }

    pub async fn offline_auth_attempts(&self) -> Result<Vec<OfflineAuthAttempt>> {
        match self.get_setting(OFFLINE_AUTH_KEY).await? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn record_offline_auth_attempt(&self, attempt: OfflineAuthAttempt) -> Result<()> {
        let mut attempts = self.offline_auth_attempts().await?;
        attempts.push(attempt);
        self.set_setting(OFFLINE_AUTH_KEY, &serde_json::to_string(&attempts)?)
            .await
    }

    pub async fn clear_offline_auth_attempts(&self) -> Result<()> {
        self.remove_setting(OFFLINE_AUTH_KEY).await
    }
}
