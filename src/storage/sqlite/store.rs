//! `SQLite`-backed cache store.

use super::connection::{acquire_lock, configure_connection, open_file};
use super::metrics::observe;
use crate::models::{CacheEntry, EntryId, NewCacheEntry};
use crate::storage::CacheStore;
use crate::{Error, Result, current_timestamp_ms};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

const BACKEND: &str = "sqlite";

const SELECT_COLUMNS: &str = "SELECT id, image_hash, fingerprint_version, fingerprint_json, \
     parsed_json, created_at, last_hit_at, hit_count FROM cache_entries";

/// `SQLite` cache store.
///
/// # Concurrency Model
///
/// A single `Mutex<Connection>` serializes access. WAL mode and a 5 second
/// `busy_timeout` let several processes share one database file. Upserts and
/// bulk deletes run inside `BEGIN IMMEDIATE` transactions.
///
/// # Schema
///
/// ```sql
/// cache_entries(
///     id INTEGER PRIMARY KEY,
///     image_hash TEXT UNIQUE NOT NULL,
///     fingerprint_version TEXT NOT NULL,
///     fingerprint_json TEXT NOT NULL,   -- JSON array of f32
///     parsed_json TEXT NOT NULL,        -- cached analysis payload
///     created_at INTEGER NOT NULL,      -- unix millis
///     last_hit_at INTEGER,
///     hit_count INTEGER NOT NULL DEFAULT 0
/// )
/// ```
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

/// Undecoded row as read from the table.
struct RawRow {
    id: i64,
    image_hash: String,
    fingerprint_version: String,
    fingerprint_json: String,
    parsed_json: String,
    created_at: i64,
    last_hit_at: Option<i64>,
    hit_count: i64,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            image_hash: row.get(1)?,
            fingerprint_version: row.get(2)?,
            fingerprint_json: row.get(3)?,
            parsed_json: row.get(4)?,
            created_at: row.get(5)?,
            last_hit_at: row.get(6)?,
            hit_count: row.get(7)?,
        })
    }

    /// Decodes the JSON columns; `None` marks a malformed row.
    ///
    /// With `vector_required` unset, an undecodable vector is replaced by an
    /// empty one so the payload stays reachable by hash.
    fn decode(self, vector_required: bool) -> Option<CacheEntry> {
        let vector = match serde_json::from_str::<Vec<f32>>(&self.fingerprint_json) {
            Ok(v) => v,
            Err(e) if vector_required => return malformed(self.id, "fingerprint_json", &e),
            Err(e) => {
                tracing::warn!(entry_id = self.id, error = %e, "Ignoring malformed cache vector");
                metrics::counter!("cache_malformed_rows_total", "column" => "fingerprint_json")
                    .increment(1);
                Vec::new()
            },
        };
        let payload = match serde_json::from_str(&self.parsed_json) {
            Ok(v) => v,
            Err(e) => return malformed(self.id, "parsed_json", &e),
        };
        Some(CacheEntry {
            id: EntryId::new(self.id),
            image_hash: self.image_hash,
            fingerprint_version: self.fingerprint_version,
            vector,
            payload,
            created_at: from_sql_int(self.created_at),
            last_hit_at: self.last_hit_at.map(from_sql_int),
            hit_count: from_sql_int(self.hit_count),
        })
    }
}

fn malformed(id: i64, column: &'static str, err: &serde_json::Error) -> Option<CacheEntry> {
    tracing::warn!(entry_id = id, column, error = %err, "Skipping malformed cache row");
    metrics::counter!("cache_malformed_rows_total", "column" => column).increment(1);
    None
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

impl SqliteCacheStore {
    /// Opens (or creates) a file-backed store.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the database cannot be opened
    /// or the schema cannot be created.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = open_file(&db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::store("open_in_memory", e))?;
        configure_connection(&conn);
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                id INTEGER PRIMARY KEY,
                image_hash TEXT UNIQUE NOT NULL,
                fingerprint_version TEXT NOT NULL,
                fingerprint_json TEXT NOT NULL,
                parsed_json TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                last_hit_at INTEGER,
                hit_count INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_cache_entries_created_at
                ON cache_entries(created_at);
            CREATE INDEX IF NOT EXISTS idx_cache_entries_version
                ON cache_entries(fingerprint_version);",
        )
        .map_err(|e| Error::store("create_schema", e))
    }

    /// Runs `f` inside an immediate transaction, rolling back on error.
    fn in_transaction<T>(
        conn: &Connection,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        conn.execute("BEGIN IMMEDIATE", [])
            .map_err(|e| Error::store("begin_transaction", e))?;
        match f(conn) {
            Ok(value) => {
                conn.execute("COMMIT", [])
                    .map_err(|e| Error::store("commit_transaction", e))?;
                Ok(value)
            },
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            },
        }
    }
}

impl CacheStore for SqliteCacheStore {
    #[instrument(skip(self), fields(operation = "get_by_hash", backend = BACKEND))]
    fn get_by_hash(
        &self,
        image_hash: &str,
        fingerprint_version: &str,
    ) -> Result<Option<CacheEntry>> {
        let start = Instant::now();
        let result = (|| -> Result<_> {
            let conn = acquire_lock(&self.conn);
            let raw = conn
                .query_row(
                    &format!("{SELECT_COLUMNS} WHERE image_hash = ?1 AND fingerprint_version = ?2"),
                    params![image_hash, fingerprint_version],
                    RawRow::from_row,
                )
                .optional()
                .map_err(|e| Error::store("get_by_hash", e))?;
            Ok(raw.and_then(|raw| raw.decode(false)))
        })();
        observe(BACKEND, "get_by_hash", start, result)
    }

    #[instrument(skip(self), fields(operation = "list_by_version", backend = BACKEND))]
    fn list_by_version(&self, fingerprint_version: &str) -> Result<Vec<CacheEntry>> {
        let start = Instant::now();
        let result = (|| -> Result<_> {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare(&format!(
                    "{SELECT_COLUMNS} WHERE fingerprint_version = ?1 ORDER BY id ASC"
                ))
                .map_err(|e| Error::store("list_by_version", e))?;
            let rows = stmt
                .query_map(params![fingerprint_version], RawRow::from_row)
                .map_err(|e| Error::store("list_by_version", e))?;

            let mut entries = Vec::new();
            for row in rows {
                let raw = row.map_err(|e| Error::store("list_by_version", e))?;
                entries.extend(raw.decode(true));
            }
            Ok(entries)
        })();
        observe(BACKEND, "list_by_version", start, result)
    }

    #[instrument(skip(self), fields(operation = "touch", backend = BACKEND, entry.id = %id))]
    fn touch(&self, id: EntryId) -> Result<()> {
        let start = Instant::now();
        let result = (|| -> Result<_> {
            let conn = acquire_lock(&self.conn);
            conn.execute(
                "UPDATE cache_entries SET last_hit_at = ?1, hit_count = hit_count + 1 WHERE id = ?2",
                params![to_sql_int(current_timestamp_ms()), id.get()],
            )
            .map_err(|e| Error::store("touch", e))?;
            Ok(())
        })();
        observe(BACKEND, "touch", start, result)
    }

    #[instrument(
        skip(self, entry),
        fields(operation = "upsert", backend = BACKEND, image_hash = %entry.image_hash)
    )]
    fn upsert(&self, entry: &NewCacheEntry) -> Result<EntryId> {
        let start = Instant::now();
        let result = (|| -> Result<_> {
            let vector_json =
                serde_json::to_string(&entry.vector).map_err(|e| Error::store("upsert", e))?;
            let payload_json =
                serde_json::to_string(&entry.payload).map_err(|e| Error::store("upsert", e))?;

            let conn = acquire_lock(&self.conn);
            Self::in_transaction(&conn, |conn| {
                conn.query_row(
                    "INSERT INTO cache_entries
                        (image_hash, fingerprint_version, fingerprint_json, parsed_json, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(image_hash) DO UPDATE SET
                        fingerprint_version = excluded.fingerprint_version,
                        fingerprint_json = excluded.fingerprint_json,
                        parsed_json = excluded.parsed_json,
                        created_at = excluded.created_at
                     RETURNING id",
                    params![
                        entry.image_hash,
                        entry.fingerprint_version,
                        vector_json,
                        payload_json,
                        to_sql_int(entry.created_at),
                    ],
                    |row| row.get::<_, i64>(0),
                )
                .map(EntryId::new)
                .map_err(|e| Error::store("upsert", e))
            })
        })();
        observe(BACKEND, "upsert", start, result)
    }

    #[instrument(skip(self), fields(operation = "count", backend = BACKEND))]
    fn count(&self) -> Result<usize> {
        let start = Instant::now();
        let result = (|| -> Result<_> {
            let conn = acquire_lock(&self.conn);
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))
                .map_err(|e| Error::store("count", e))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })();
        observe(BACKEND, "count", start, result)
    }

    #[instrument(skip(self), fields(operation = "delete_oldest", backend = BACKEND))]
    fn delete_oldest(&self, n: usize) -> Result<usize> {
        if n == 0 {
            return Ok(0);
        }
        let start = Instant::now();
        let result = (|| -> Result<_> {
            let conn = acquire_lock(&self.conn);
            Self::in_transaction(&conn, |conn| {
                conn.execute(
                    "DELETE FROM cache_entries WHERE id IN (
                        SELECT id FROM cache_entries ORDER BY created_at ASC, id ASC LIMIT ?1
                    )",
                    params![i64::try_from(n).unwrap_or(i64::MAX)],
                )
                .map_err(|e| Error::store("delete_oldest", e))
            })
        })();
        observe(BACKEND, "delete_oldest", start, result)
    }

    #[instrument(skip(self), fields(operation = "clear", backend = BACKEND))]
    fn clear(&self) -> Result<()> {
        let start = Instant::now();
        let result = (|| -> Result<_> {
            let conn = acquire_lock(&self.conn);
            conn.execute("DELETE FROM cache_entries", [])
                .map_err(|e| Error::store("clear", e))?;
            Ok(())
        })();
        observe(BACKEND, "clear", start, result)
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(hash: &str, version: &str, created_at: u64) -> NewCacheEntry {
        NewCacheEntry::new(hash, version, vec![0.6, 0.8], json!({ "hash": hash }))
            .with_created_at(created_at)
    }

    #[test]
    fn test_upsert_and_get() {
        let store = SqliteCacheStore::in_memory().unwrap();
        let id = store.upsert(&entry("aa", "v1", 10)).unwrap();

        let found = store.get_by_hash("aa", "v1").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.vector, vec![0.6, 0.8]);
        assert_eq!(found.payload, json!({ "hash": "aa" }));
        assert_eq!(found.created_at, 10);
        assert_eq!(found.hit_count, 0);
        assert!(found.last_hit_at.is_none());
    }

    #[test]
    fn test_get_requires_matching_version() {
        let store = SqliteCacheStore::in_memory().unwrap();
        store.upsert(&entry("aa", "v1", 10)).unwrap();
        assert!(store.get_by_hash("aa", "v2").unwrap().is_none());
        assert!(store.get_by_hash("bb", "v1").unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_and_keeps_id_and_hits() {
        let store = SqliteCacheStore::in_memory().unwrap();
        let id = store.upsert(&entry("aa", "v1", 10)).unwrap();
        store.touch(id).unwrap();

        let replacement = NewCacheEntry::new("aa", "v2", vec![1.0], json!("new")).with_created_at(20);
        let second = store.upsert(&replacement).unwrap();
        assert_eq!(second, id);
        assert_eq!(store.count().unwrap(), 1);

        let found = store.get_by_hash("aa", "v2").unwrap().unwrap();
        assert_eq!(found.payload, json!("new"));
        assert_eq!(found.created_at, 20);
        assert_eq!(found.hit_count, 1);
    }

    #[test]
    fn test_touch_updates_hit_stats() {
        let store = SqliteCacheStore::in_memory().unwrap();
        let id = store.upsert(&entry("aa", "v1", 10)).unwrap();
        store.touch(id).unwrap();
        store.touch(id).unwrap();
        store.touch(EntryId::new(999)).unwrap();

        let found = store.get_by_hash("aa", "v1").unwrap().unwrap();
        assert_eq!(found.hit_count, 2);
        assert!(found.last_hit_at.is_some());
    }

    #[test]
    fn test_list_by_version_in_id_order() {
        let store = SqliteCacheStore::in_memory().unwrap();
        store.upsert(&entry("c", "v1", 30)).unwrap();
        store.upsert(&entry("a", "v1", 10)).unwrap();
        store.upsert(&entry("x", "v2", 5)).unwrap();
        store.upsert(&entry("b", "v1", 20)).unwrap();

        let hashes: Vec<_> = store
            .list_by_version("v1")
            .unwrap()
            .into_iter()
            .map(|e| e.image_hash)
            .collect();
        assert_eq!(hashes, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_delete_oldest_by_created_at_then_id() {
        let store = SqliteCacheStore::in_memory().unwrap();
        store.upsert(&entry("late", "v1", 30)).unwrap();
        store.upsert(&entry("tie-first", "v1", 10)).unwrap();
        store.upsert(&entry("tie-second", "v1", 10)).unwrap();
        store.upsert(&entry("mid", "v1", 20)).unwrap();

        assert_eq!(store.delete_oldest(2).unwrap(), 2);
        let remaining: Vec<_> = store
            .list_by_version("v1")
            .unwrap()
            .into_iter()
            .map(|e| e.image_hash)
            .collect();
        assert_eq!(remaining, vec!["late", "mid"]);

        assert_eq!(store.delete_oldest(0).unwrap(), 0);
        assert_eq!(store.delete_oldest(10).unwrap(), 2);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let store = SqliteCacheStore::in_memory().unwrap();
        store.upsert(&entry("good", "v1", 10)).unwrap();
        {
            let conn = acquire_lock(&store.conn);
            conn.execute(
                "INSERT INTO cache_entries
                    (image_hash, fingerprint_version, fingerprint_json, parsed_json, created_at)
                 VALUES ('bad-vector', 'v1', 'not json', '{}', 11),
                        ('bad-payload', 'v1', '[1.0]', '{oops', 12)",
                [],
            )
            .unwrap();
        }

        assert!(store.get_by_hash("bad-payload", "v1").unwrap().is_none());
        let listed = store.list_by_version("v1").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].image_hash, "good");
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_unreadable_vector_keeps_exact_hit() {
        let store = SqliteCacheStore::in_memory().unwrap();
        {
            let conn = acquire_lock(&store.conn);
            conn.execute(
                "INSERT INTO cache_entries
                    (image_hash, fingerprint_version, fingerprint_json, parsed_json, created_at)
                 VALUES ('nan', 'v1', '[null, 1.0]', '{\"brand\": \"acme\"}', 1)",
                [],
            )
            .unwrap();
        }

        let entry = store.get_by_hash("nan", "v1").unwrap().unwrap();
        assert!(entry.vector.is_empty());
        assert_eq!(entry.payload, json!({ "brand": "acme" }));
        assert!(store.list_by_version("v1").unwrap().is_empty());
    }

    #[test]
    fn test_clear() {
        let store = SqliteCacheStore::in_memory().unwrap();
        store.upsert(&entry("a", "v1", 1)).unwrap();
        store.upsert(&entry("b", "v1", 2)).unwrap();
        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("entries.sqlite");
        {
            let store = SqliteCacheStore::new(&path).unwrap();
            store.upsert(&entry("a", "v1", 1)).unwrap();
            assert_eq!(store.db_path(), Some(path.as_path()));
        }
        let reopened = SqliteCacheStore::new(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
        assert!(reopened.get_by_hash("a", "v1").unwrap().is_some());
    }
}
