//! Collection layout and SQL schema.
//!
//! Each collection is one table. The full record is kept as JSON in `body`;
//! fields used for lookups are copied into untyped index columns so SQLite
//! compares them without affinity conversion.

use std::fmt;

/// A secondary lookup key: the JSON field name and the column it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub field: &'static str,
    pub column: &'static str,
}

const fn index(field: &'static str, column: &'static str) -> IndexSpec {
    IndexSpec { field, column }
}

const GAME_LOG_INDEXES: &[IndexSpec] = &[
    index("studentId", "student_id"),
    index("synced", "synced"),
    index("timestamp", "timestamp"),
];

const ACHIEVEMENT_INDEXES: &[IndexSpec] = &[
    index("studentId", "student_id"),
    index("synced", "synced"),
];

const PROGRESS_INDEXES: &[IndexSpec] = &[
    index("studentId", "student_id"),
    index("subject", "subject"),
];

const CONTENT_INDEXES: &[IndexSpec] = &[
    index("type", "content_type"),
    index("grade", "grade"),
];

/// Named record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    GameLogs,
    Achievements,
    UserProgress,
    CachedContent,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::GameLogs,
        Collection::Achievements,
        Collection::UserProgress,
        Collection::CachedContent,
    ];

    /// Name used in logs and exports
    pub fn name(&self) -> &'static str {
        match self {
            Collection::GameLogs => "gameLogs",
            Collection::Achievements => "achievements",
            Collection::UserProgress => "userProgress",
            Collection::CachedContent => "cachedContent",
        }
    }

    pub(crate) fn table(&self) -> &'static str {
        match self {
            Collection::GameLogs => "game_logs",
            Collection::Achievements => "achievements",
            Collection::UserProgress => "user_progress",
            Collection::CachedContent => "cached_content",
        }
    }

    pub fn indexes(&self) -> &'static [IndexSpec] {
        match self {
            Collection::GameLogs => GAME_LOG_INDEXES,
            Collection::Achievements => ACHIEVEMENT_INDEXES,
            Collection::UserProgress => PROGRESS_INDEXES,
            Collection::CachedContent => CONTENT_INDEXES,
        }
    }

    pub fn index(&self, field: &str) -> Option<IndexSpec> {
        self.indexes().iter().copied().find(|i| i.field == field)
    }

    /// Whether the store assigns integer ids. Otherwise the caller supplies
    /// a string `id`.
    pub fn auto_increment(&self) -> bool {
        !matches!(self, Collection::CachedContent)
    }

    /// Collections the sync engine pushes to the server
    pub fn is_syncable(&self) -> bool {
        matches!(self, Collection::GameLogs | Collection::Achievements)
    }

    fn create_sql(&self) -> String {
        let key = if self.auto_increment() {
            "id INTEGER PRIMARY KEY AUTOINCREMENT"
        } else {
            "id TEXT PRIMARY KEY NOT NULL"
        };
        let columns: Vec<&str> = self.indexes().iter().map(|i| i.column).collect();
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} ({key}, {columns}, body TEXT NOT NULL);\n",
            table = self.table(),
            key = key,
            columns = columns.join(", "),
        );
        for column in columns {
            sql.push_str(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table}({column});\n",
                table = self.table(),
                column = column,
            ));
        }
        sql
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key/value table for small preferences.
pub const SETTINGS_SQL: &str =
    "CREATE TABLE IF NOT EXISTS settings (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL);\n";

/// Full schema for version 1. Every statement is idempotent.
pub fn schema_v1() -> String {
    let mut sql = String::new();
    for collection in Collection::ALL {
        sql.push_str(&collection.create_sql());
    }
    sql.push_str(SETTINGS_SQL);
    sql
}
