use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Cached content is treated as absent once it is older than this.
pub const CONTENT_TTL_HOURS: i64 = 24;

const MS_PER_HOUR: i64 = 60 * 60 * 1000;

/// A locally created record that must eventually reach the server.
///
/// `id` is assigned by the store on insert. `synced` only ever flips to
/// `true`, and only the sync engine flips it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct SyncableRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub student_id: String,
    pub payload: Value,
    pub timestamp: i64,
    #[serde(default)]
    pub synced: bool,
}

impl SyncableRecord {
    pub fn new(student_id: impl Into<String>, payload: Value, timestamp: i64) -> Self {
        Self {
            id: None,
            student_id: student_id.into(),
            payload,
            timestamp,
            synced: false,
        }
    }

    /// Flatten into the shape the server expects: payload fields at the top
    /// level alongside the record bookkeeping fields.
    pub fn to_wire(&self) -> Value {
        let mut obj = match &self.payload {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Map::new();
                map.insert("payload".to_string(), other.clone());
                map
            }
        };
        if let Some(id) = self.id {
            obj.insert("id".to_string(), Value::from(id));
        }
        obj.insert("studentId".to_string(), Value::from(self.student_id.clone()));
        obj.insert("timestamp".to_string(), Value::from(self.timestamp));
        obj.insert("synced".to_string(), Value::from(self.synced));
        if !obj.contains_key("played_at") {
            let played_at = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(self.timestamp);
            if let Some(dt) = played_at {
                obj.insert("played_at".to_string(), Value::from(dt.to_rfc3339()));
            }
        }
        Value::Object(obj)
    }
}

fn default_game_type() -> String {
    "game".to_string()
}

fn default_level() -> String {
    "medium".to_string()
}

/// Result of one finished game or quiz, in the server's field naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameLog {
    pub subject: String,
    pub grade: u8,
    pub game_id: String,
    #[serde(default = "default_game_type")]
    pub game_type: String,
    #[serde(default = "default_level")]
    pub level: String,
    pub score: u32,
    pub max_score: u32,
    #[serde(default)]
    pub time_spent: u64,
}

impl GameLog {
    pub fn new(
        subject: impl Into<String>,
        grade: u8,
        game_id: impl Into<String>,
        score: u32,
        max_score: u32,
    ) -> Self {
        Self {
            subject: subject.into(),
            grade,
            game_id: game_id.into(),
            game_type: default_game_type(),
            level: default_level(),
            score,
            max_score,
            time_spent: 0,
        }
    }

    pub fn percentage(&self) -> u32 {
        if self.max_score == 0 {
            0
        } else {
            let percent = u64::from(self.score) * 100 / u64::from(self.max_score);
            u32::try_from(percent).unwrap_or(u32::MAX)
        }
    }
}

/// Per-subject learning progress. Not pushed to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub student_id: String,
    pub subject: String,
    pub payload: Value,
    pub timestamp: i64,
}

/// Downloaded learning content kept for offline use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedContentEntry {
    pub id: String,
    pub content: Value,
    #[serde(rename = "type")]
    pub content_type: String,
    pub grade: Option<u8>,
    pub cached_at: i64,
}

impl CachedContentEntry {
    pub fn age_hours(&self, now_ms: i64) -> i64 {
        (now_ms - self.cached_at) / MS_PER_HOUR
    }

    pub fn is_stale(&self, now_ms: i64) -> bool {
        now_ms - self.cached_at > CONTENT_TTL_HOURS * MS_PER_HOUR
    }
}

/// A login attempt made while offline, kept for later reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineAuthAttempt {
    pub contact: String,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl OfflineAuthAttempt {
    pub fn login(contact: impl Into<String>, timestamp: i64) -> Self {
        Self {
            contact: contact.into(),
            timestamp,
            kind: "login_attempt".to_string(),
        }
    }
}
