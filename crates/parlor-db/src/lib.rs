pub mod migrations;
pub mod models;
pub mod queries;
pub mod store;

pub use store::Store;

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database with the full schema. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` with exclusive access to the connection. Everything inside one
    /// call (e.g. an insert and its read-back) is atomic with respect to other
    /// callers.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }
}

/// Run a blocking database call off the async runtime.
pub async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?
}

/// SQLite stores `datetime('now')` as "YYYY-MM-DD HH:MM:SS" without a zone.
/// Values written by other tools may be RFC 3339; both are accepted.
pub(crate) fn try_parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .ok()
}

/// Lossy variant for display timestamps: corrupt values become "now".
pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    try_parse_timestamp(raw).unwrap_or_else(|| {
        warn!("Corrupt timestamp '{}'", raw);
        Utc::now()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sqlite_and_rfc3339_timestamps() {
        let naive = parse_timestamp("2024-03-02 11:22:33");
        assert_eq!(naive.to_rfc3339(), "2024-03-02T11:22:33+00:00");

        let rfc = parse_timestamp("2024-03-02T11:22:33Z");
        assert_eq!(rfc, naive);

        assert!(try_parse_timestamp("garbage").is_none());
        assert!(try_parse_timestamp("").is_none());
    }

    #[tokio::test]
    async fn blocking_returns_value_or_error() {
        let db = std::sync::Arc::new(Database::open_in_memory().unwrap());

        let inner = db.clone();
        blocking(move || inner.create_user("alice", "Alice")).await.unwrap();

        let inner = db.clone();
        assert!(blocking(move || inner.create_user("alice", "Again")).await.is_err());
    }

    #[test]
    fn in_memory_database_has_schema() {
        let db = Database::open_in_memory().unwrap();
        let tables: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                     ('users', 'sessions', 'followers', 'groups', 'group_members',
                      'messages', 'group_chat', 'notifications')",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(tables, 8);
    }
}
