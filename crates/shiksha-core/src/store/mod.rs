//! Local persistent store for offline use.
//!
//! A single SQLite database holds four record collections (game logs,
//! achievements, progress, cached content) plus a small key/value settings
//! table. Records are JSON documents; every operation is async and runs on
//! the blocking pool so callers never stall the runtime.
//!
//! A missing or broken database is not fatal: callers hold an
//! `Option<Store>` and fall back to offline-only behaviour when it is `None`
//! or when an operation returns `StoreError`.

pub mod content;
pub mod migrations;
pub mod records;
pub mod schema;
pub mod settings;

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

pub use schema::{Collection, IndexSpec};

/// Store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),

    #[error("storage unavailable: {0}")]
    Background(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("invalid record for {collection}: {reason}")]
    InvalidRecord {
        collection: &'static str,
        reason: String,
    },

    #[error("unknown index '{index}' on {collection}")]
    UnknownIndex {
        collection: &'static str,
        index: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Primary key of a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    Int(i64),
    Text(String),
}

impl From<i64> for RecordKey {
    fn from(id: i64) -> Self {
        RecordKey::Int(id)
    }
}

impl From<&str> for RecordKey {
    fn from(id: &str) -> Self {
        RecordKey::Text(id.to_string())
    }
}

impl From<String> for RecordKey {
    fn from(id: String) -> Self {
        RecordKey::Text(id)
    }
}

impl RecordKey {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            RecordKey::Int(id) => Some(*id),
            RecordKey::Text(_) => None,
        }
    }

    fn to_sql(&self) -> SqlValue {
        match self {
            RecordKey::Int(id) => SqlValue::Integer(*id),
            RecordKey::Text(id) => SqlValue::Text(id.clone()),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            RecordKey::Int(id) => Value::from(*id),
            RecordKey::Text(id) => Value::from(id.clone()),
        }
    }
}

/// Handle to the local record database. Clone is cheap.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Background(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    pub(crate) async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Background("connection lock poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Background(e.to_string()))?
    }

    /// Insert a new record and return its key.
    ///
    /// Auto-increment collections assign the id unless the record already
    /// carries an integer `id`; `cachedContent` requires a string `id`.
    pub async fn add<T: Serialize>(&self, collection: Collection, record: &T) -> Result<RecordKey> {
        let doc = to_document(collection, record)?;
        self.call(move |conn| write_document(conn, collection, doc, false)).await
    }

    /// Insert or replace a record.
    pub async fn put<T: Serialize>(&self, collection: Collection, record: &T) -> Result<RecordKey> {
        let doc = to_document(collection, record)?;
        self.call(move |conn| write_document(conn, collection, doc, true)).await
    }

    /// Fetch one record by key.
    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: Collection,
        key: impl Into<RecordKey>,
    ) -> Result<Option<T>> {
        let key = key.into();
        let doc = self
            .call(move |conn| {
                let sql = format!("SELECT id, body FROM {} WHERE id = ?1", collection.table());
                conn.query_row(&sql, [key.to_sql()], read_row)
                    .optional()?
                    .transpose()
            })
            .await?;
        doc.map(|d| serde_json::from_value(d).map_err(StoreError::from))
            .transpose()
    }

    /// Fetch every record of a collection in insertion order.
    pub async fn get_all<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>> {
        let docs = self
            .call(move |conn| {
                let sql = format!("SELECT id, body FROM {} ORDER BY rowid", collection.table());
                query_documents(conn, &sql, Vec::new())
            })
            .await?;
        from_documents(docs)
    }

    /// Fetch every record whose indexed field equals `value`.
    pub async fn get_by_index<T: DeserializeOwned>(
        &self,
        collection: Collection,
        index: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<T>> {
        let spec = lookup_index(collection, index)?;
        let param = json_to_sql(&value.into());
        let docs = self
            .call(move |conn| {
                let sql = format!(
                    "SELECT id, body FROM {} WHERE {} IS ?1 ORDER BY rowid",
                    collection.table(),
                    spec.column
                );
                query_documents(conn, &sql, vec![param])
            })
            .await?;
        from_documents(docs)
    }

    /// Count the records whose indexed field equals `value`.
    pub async fn count(
        &self,
        collection: Collection,
        index: &str,
        value: impl Into<Value>,
    ) -> Result<usize> {
        let spec = lookup_index(collection, index)?;
        let param = json_to_sql(&value.into());
        self.call(move |conn| {
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {} IS ?1",
                collection.table(),
                spec.column
            );
            let count: i64 = conn.query_row(&sql, [param], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    /// Remove every record of a collection.
    pub async fn clear(&self, collection: Collection) -> Result<()> {
        self.call(move |conn| {
            conn.execute(&format!("DELETE FROM {}", collection.table()), [])?;
            Ok(())
        })
        .await?;
        debug!(collection = collection.name(), "Collection cleared");
        Ok(())
    }

    /// Remove every record of every collection.
    pub async fn clear_all(&self) -> Result<()> {
        for collection in Collection::ALL {
            self.clear(collection).await?;
        }
        Ok(())
    }
}

fn lookup_index(collection: Collection, index: &str) -> Result<IndexSpec> {
    collection.index(index).ok_or_else(|| StoreError::UnknownIndex {
        collection: collection.name(),
        index: index.to_string(),
    })
}

/// A record split into its key (if any) and the remaining JSON fields.
struct Document {
    key: Option<RecordKey>,
    fields: Map<String, Value>,
}

fn to_document<T: Serialize>(collection: Collection, record: &T) -> Result<Document> {
    let invalid = |reason: &str| StoreError::InvalidRecord {
        collection: collection.name(),
        reason: reason.to_string(),
    };

    let mut fields = match serde_json::to_value(record)? {
        Value::Object(map) => map,
        _ => return Err(invalid("record must be a JSON object")),
    };

    let key = match fields.remove("id") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) if collection.auto_increment() => match n.as_i64() {
            Some(id) => Some(RecordKey::Int(id)),
            None => return Err(invalid("id must be an integer")),
        },
        Some(Value::String(s)) if !collection.auto_increment() => Some(RecordKey::Text(s)),
        Some(_) => return Err(invalid("id has the wrong type")),
    };

    if key.is_none() && !collection.auto_increment() {
        return Err(invalid("id is required"));
    }

    // The body and the `synced` index column must agree, or the record
    // would read back as pending but never match a pending lookup.
    if collection.is_syncable() {
        let synced = fields.get("synced").and_then(Value::as_bool).unwrap_or(false);
        fields.insert("synced".to_string(), Value::Bool(synced));
    }

    Ok(Document { key, fields })
}

fn write_document(
    conn: &Connection,
    collection: Collection,
    doc: Document,
    replace: bool,
) -> Result<RecordKey> {
    let indexes = collection.indexes();
    let columns: Vec<&str> = indexes.iter().map(|i| i.column).collect();

    let mut params: Vec<SqlValue> = Vec::with_capacity(indexes.len() + 2);
    params.push(doc.key.as_ref().map(RecordKey::to_sql).unwrap_or(SqlValue::Null));
    for spec in indexes {
        params.push(doc.fields.get(spec.field).map(json_to_sql).unwrap_or(SqlValue::Null));
    }
    params.push(SqlValue::Text(serde_json::to_string(&doc.fields)?));

    let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT {verb}INTO {table} (id, {columns}, body) VALUES ({placeholders})",
        verb = if replace { "OR REPLACE " } else { "" },
        table = collection.table(),
        columns = columns.join(", "),
        placeholders = placeholders.join(", "),
    );
    conn.execute(&sql, params_from_iter(params))?;

    Ok(match doc.key {
        Some(key) => key,
        None => RecordKey::Int(conn.last_insert_rowid()),
    })
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Value>> {
    let id: SqlValue = row.get(0)?;
    let body: String = row.get(1)?;
    Ok(assemble(id, &body))
}

fn assemble(id: SqlValue, body: &str) -> Result<Value> {
    let mut fields: Map<String, Value> = serde_json::from_str(body)?;
    let key = match id {
        SqlValue::Integer(i) => RecordKey::Int(i),
        SqlValue::Text(s) => RecordKey::Text(s),
        _ => return Err(StoreError::Background("row without a usable id".to_string())),
    };
    fields.insert("id".to_string(), key.to_json());
    Ok(Value::Object(fields))
}

fn query_documents(conn: &Connection, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Value>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(params), read_row)?;
    let mut docs = Vec::new();
    for row in rows {
        docs.push(row??);
    }
    Ok(docs)
}

fn from_documents<T: DeserializeOwned>(docs: Vec<Value>) -> Result<Vec<T>> {
    docs.into_iter()
        .map(|d| serde_json::from_value(d).map_err(StoreError::from))
        .collect()
}

/// Map a JSON scalar onto the SQLite value used in index columns.
fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncableRecord;
    use serde_json::json;

    fn store() -> Store {
        Store::open_in_memory().expect("open in-memory store")
    }

    async fn add_record(store: &Store, collection: Collection, timestamp: i64) -> RecordKey {
        store
            .add(collection, &SyncableRecord::new("s", json!({}), timestamp))
            .await
            .expect("add")
    }

    #[tokio::test]
    async fn test_add_then_get_round_trips() {
        let store = store();
        let payload = json!({"score": 7, "tags": ["a", "b"]});
        let record = SyncableRecord::new("s1", payload, 1_700_000_000_000);

        let key = store.add(Collection::GameLogs, &record).await.expect("add");
        let id = key.as_int().expect("integer id");

        let fetched: SyncableRecord = store
            .get(Collection::GameLogs, id)
            .await
            .expect("get")
            .expect("record present");

        assert_eq!(fetched.id, Some(id));
        assert!(!fetched.synced);
        assert_eq!(SyncableRecord { id: None, ..fetched }, record);
    }

    #[tokio::test]
    async fn test_missing_synced_defaults_false() {
        let store = store();
        let key = store
            .add(
                Collection::Achievements,
                &json!({"studentId": "s1", "payload": {}, "timestamp": 1}),
            )
            .await
            .expect("add");
        store
            .add(
                Collection::GameLogs,
                &json!({
                    "studentId": "s1",
                    "payload": {"score": 3},
                    "timestamp": 1,
                    "synced": null
                }),
            )
            .await
            .expect("add log");

        let fetched: SyncableRecord = store
            .get(Collection::Achievements, key)
            .await
            .expect("get")
            .expect("present");
        assert!(!fetched.synced);

        assert_eq!(store.pending_count(Collection::Achievements).await.expect("count"), 1);
        assert_eq!(store.pending_count(Collection::GameLogs).await.expect("count"), 1);
        assert_eq!(store.count(Collection::GameLogs, "synced", false).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn test_local_only_collections_keep_fields_as_given() {
        let store = store();
        let key = store
            .add(
                Collection::UserProgress,
                &json!({"studentId": "s1", "subject": "Odia", "payload": {}, "timestamp": 1}),
            )
            .await
            .expect("add");
        let fetched: Value = store
            .get(Collection::UserProgress, key)
            .await
            .expect("get")
            .expect("present");
        assert!(fetched.get("synced").is_none());
    }

    #[tokio::test]
    async fn test_ids_increase() {
        let store = store();
        let a = add_record(&store, Collection::GameLogs, 1).await;
        let b = add_record(&store, Collection::GameLogs, 2).await;
        assert!(b.as_int() > a.as_int());
    }

    #[tokio::test]
    async fn test_get_by_index_matches_booleans_and_strings() {
        let store = store();
        let mut synced = SyncableRecord::new("s1", json!({}), 1);
        synced.synced = true;
        store.add(Collection::GameLogs, &synced).await.expect("add synced");
        for (student, timestamp) in [("s1", 2), ("s2", 3)] {
            let record = SyncableRecord::new(student, json!({}), timestamp);
            store.add(Collection::GameLogs, &record).await.expect("add");
        }

        let pending: Vec<SyncableRecord> = store
            .get_by_index(Collection::GameLogs, "synced", false)
            .await
            .expect("pending");
        assert_eq!(pending.len(), 2);

        let s1: Vec<SyncableRecord> = store
            .get_by_index(Collection::GameLogs, "studentId", "s1")
            .await
            .expect("by student");
        assert_eq!(s1.len(), 2);

        assert_eq!(store.count(Collection::GameLogs, "synced", true).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn test_unknown_index_is_an_error() {
        let store = store();
        let result: Result<Vec<Value>> =
            store.get_by_index(Collection::UserProgress, "synced", false).await;
        assert!(matches!(result, Err(StoreError::UnknownIndex { .. })));
    }

    #[tokio::test]
    async fn test_put_upserts() {
        let store = store();
        let key = add_record(&store, Collection::GameLogs, 1).await;

        let mut record: SyncableRecord = store
            .get(Collection::GameLogs, key.clone())
            .await
            .expect("get")
            .expect("present");
        record.synced = true;
        store.put(Collection::GameLogs, &record).await.expect("put");

        let all: Vec<SyncableRecord> = store.get_all(Collection::GameLogs).await.expect("all");
        assert_eq!(all.len(), 1);
        assert!(all[0].synced);
    }

    #[tokio::test]
    async fn test_add_with_existing_id_fails() {
        let store = store();
        let key = add_record(&store, Collection::GameLogs, 1).await;
        let record: SyncableRecord = store
            .get(Collection::GameLogs, key)
            .await
            .expect("get")
            .expect("present");
        assert!(matches!(
            store.add(Collection::GameLogs, &record).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_text_keys_require_id() {
        let store = store();
        let result = store
            .add(Collection::CachedContent, &json!({"content": 1, "type": "quiz"}))
            .await;
        assert!(matches!(result, Err(StoreError::InvalidRecord { .. })));

        let key = store
            .put(Collection::CachedContent, &json!({"id": "c1", "content": 1, "type": "quiz"}))
            .await
            .expect("put");
        assert_eq!(key, RecordKey::Text("c1".to_string()));
    }

    #[tokio::test]
    async fn test_non_object_record_rejected() {
        let store = store();
        let result = store.add(Collection::GameLogs, &json!([1, 2])).await;
        assert!(matches!(result, Err(StoreError::InvalidRecord { .. })));
    }

    #[tokio::test]
    async fn test_clear_all_empties_collections() {
        let store = store();
        add_record(&store, Collection::GameLogs, 1).await;
        add_record(&store, Collection::Achievements, 1).await;
        store.clear_all().await.expect("clear");

        let logs: Vec<Value> = store.get_all(Collection::GameLogs).await.expect("logs");
        let achievements: Vec<Value> =
            store.get_all(Collection::Achievements).await.expect("achievements");
        assert!(logs.is_empty() && achievements.is_empty());
    }

    #[tokio::test]
    async fn test_reopen_on_disk_keeps_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("shiksha.db");
        {
            let store = Store::open(&path).expect("open");
            add_record(&store, Collection::GameLogs, 1).await;
        }
        let store = Store::open(&path).expect("reopen");
        let all: Vec<SyncableRecord> = store.get_all(Collection::GameLogs).await.expect("all");
        assert_eq!(all.len(), 1);
    }
}
