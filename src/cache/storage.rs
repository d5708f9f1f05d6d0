//! Cache bucket storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::identity::{cache_url, url_hash, vary_matches, vary_snapshot, VarySnapshot};
use crate::error::{Result, WorkerError};
use crate::http::{Request, Response};

/// Summary of one cache bucket.
#[derive(Debug, Clone)]
pub struct BucketInfo {
  pub name: String,
  /// Number of stored entries
  pub entries: usize,
  /// When the bucket was first opened
  pub created_at: DateTime<Utc>,
  /// When a worker owning this bucket last finished activating
  pub activated_at: Option<DateTime<Utc>>,
}

/// Trait for cache storage backends.
///
/// Buckets are named stores of request/response pairs. They are created on first
/// open and only ever removed whole.
pub trait CacheStorage: Send + Sync {
  /// Open a bucket, creating it if absent.
  fn open(&self, name: &str) -> Result<()>;

  /// Whether a bucket with this name exists.
  fn has(&self, name: &str) -> Result<bool>;

  /// All bucket names in creation order.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete a bucket and all of its entries. Returns false if it did not exist.
  fn delete(&self, name: &str) -> Result<bool>;

  /// Store every pair in one transaction: either all are written or none are.
  ///
  /// Creates the bucket if absent. An entry with the same identity is replaced.
  fn put_all(&self, name: &str, entries: &[(Request, Response)]) -> Result<()>;

  /// Look up a request in one bucket.
  fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>>;

  /// Bucket summaries in creation order.
  fn buckets(&self) -> Result<Vec<BucketInfo>>;

  /// Record that the worker owning `name` has activated.
  ///
  /// The record lives as long as the bucket; deleting the bucket clears it.
  fn mark_activated(&self, name: &str) -> Result<()>;

  /// Whether an activation has been recorded for `name`.
  fn is_activated(&self, name: &str) -> Result<bool>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open or create the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        WorkerError::Storage(format!("Failed to create cache directory: {}", e))
      })?;
    }

    let conn = Connection::open(path)?;
    Self::with_connection(conn)
  }

  /// Open a throwaway in-memory database.
  #[allow(dead_code)]
  pub fn open_in_memory() -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| WorkerError::Storage("Could not determine data directory".to_string()))?;

    Ok(data_dir.join("pantry").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    self.lock()?.execute_batch(CACHE_SCHEMA)?;
    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| WorkerError::Storage(format!("Lock poisoned: {}", e)))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Named buckets; id preserves creation order
CREATE TABLE IF NOT EXISTS buckets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored responses keyed by bucket and request URL
CREATE TABLE IF NOT EXISTS entries (
    bucket_id INTEGER NOT NULL,
    url_hash TEXT NOT NULL,
    url TEXT NOT NULL,
    vary TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (bucket_id, url_hash),
    FOREIGN KEY (bucket_id) REFERENCES buckets(id) ON DELETE CASCADE
);

-- Buckets whose worker has finished activating
CREATE TABLE IF NOT EXISTS activations (
    bucket_id INTEGER PRIMARY KEY,
    activated_at TEXT NOT NULL DEFAULT (datetime('now')),
    FOREIGN KEY (bucket_id) REFERENCES buckets(id) ON DELETE CASCADE
);
"#;

impl CacheStorage for SqliteStorage {
  fn open(&self, name: &str) -> Result<()> {
    self.lock()?.execute(
      "INSERT OR IGNORE INTO buckets (name, created_at) VALUES (?, datetime('now'))",
      params![name],
    )?;
    Ok(())
  }

  fn has(&self, name: &str) -> Result<bool> {
    let found = self
      .lock()?
      .query_row(
        "SELECT 1 FROM buckets WHERE name = ?",
        params![name],
        |_| Ok(()),
      )
      .optional()?;
    Ok(found.is_some())
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT name FROM buckets ORDER BY id")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;

    tx.execute(
      "DELETE FROM entries WHERE bucket_id IN (SELECT id FROM buckets WHERE name = ?)",
      params![name],
    )?;
    tx.execute(
      "DELETE FROM activations WHERE bucket_id IN (SELECT id FROM buckets WHERE name = ?)",
      params![name],
    )?;
    let removed = tx.execute("DELETE FROM buckets WHERE name = ?", params![name])?;

    tx.commit()?;
    Ok(removed > 0)
  }

  fn put_all(&self, name: &str, entries: &[(Request, Response)]) -> Result<()> {
    if let Some((request, _)) = entries.iter().find(|(request, _)| !request.is_get()) {
      return Err(WorkerError::UnsupportedMethod(request.method.clone()));
    }

    let mut conn = self.lock()?;
    let tx = conn.transaction()?;

    tx.execute(
      "INSERT OR IGNORE INTO buckets (name, created_at) VALUES (?, datetime('now'))",
      params![name],
    )?;
    let bucket_id: i64 = tx.query_row(
      "SELECT id FROM buckets WHERE name = ?",
      params![name],
      |row| row.get(0),
    )?;

    for (request, response) in entries {
      let vary = serde_json::to_string(&vary_snapshot(request, response))?;
      let headers = serde_json::to_string(&response.headers)?;

      tx.execute(
        "INSERT OR REPLACE INTO entries
           (bucket_id, url_hash, url, vary, status, status_text, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          bucket_id,
          url_hash(&request.url),
          cache_url(&request.url),
          vary,
          response.status,
          response.status_text,
          headers,
          response.body,
        ],
      )?;
    }

    tx.commit()?;
    Ok(())
  }

  fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>> {
    if !request.is_get() {
      return Ok(None);
    }

    let conn = self.lock()?;
    let row: Option<(String, u16, String, String, Vec<u8>)> = conn
      .query_row(
        "SELECT e.vary, e.status, e.status_text, e.headers, e.body
         FROM entries e INNER JOIN buckets b ON b.id = e.bucket_id
         WHERE b.name = ? AND e.url_hash = ?",
        params![name, url_hash(&request.url)],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
          ))
        },
      )
      .optional()?;

    let Some((vary, status, status_text, headers, body)) = row else {
      return Ok(None);
    };

    let snapshot: VarySnapshot = serde_json::from_str(&vary)?;
    let response = Response {
      status,
      status_text,
      headers: serde_json::from_str(&headers)?,
      body,
    };

    if vary_matches(request, &response, &snapshot) {
      Ok(Some(response))
    } else {
      Ok(None)
    }
  }

  fn buckets(&self) -> Result<Vec<BucketInfo>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT b.name, b.created_at, a.activated_at, COUNT(e.url_hash)
       FROM buckets b
       LEFT JOIN entries e ON e.bucket_id = b.id
       LEFT JOIN activations a ON a.bucket_id = b.id
       GROUP BY b.id
       ORDER BY b.id",
    )?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, Option<String>>(2)?,
          row.get::<_, i64>(3)? as usize,
        ))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    rows
      .into_iter()
      .map(|(name, created_at, activated_at, entries)| {
        Ok(BucketInfo {
          name,
          entries,
          created_at: parse_datetime(&created_at)?,
          activated_at: activated_at.as_deref().map(parse_datetime).transpose()?,
        })
      })
      .collect()
  }

  fn mark_activated(&self, name: &str) -> Result<()> {
    let updated = self.lock()?.execute(
      "INSERT OR REPLACE INTO activations (bucket_id, activated_at)
       SELECT id, datetime('now') FROM buckets WHERE name = ?",
      params![name],
    )?;
    if updated == 0 {
      return Err(WorkerError::Storage(format!(
        "cannot mark missing bucket '{}' as activated",
        name
      )));
    }
    Ok(())
  }

  fn is_activated(&self, name: &str) -> Result<bool> {
    let found = self
      .lock()?
      .query_row(
        "SELECT 1 FROM activations a INNER JOIN buckets b ON b.id = a.bucket_id
         WHERE b.name = ?",
        params![name],
        |_| Ok(()),
      )
      .optional()?;
    Ok(found.is_some())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| WorkerError::Storage(format!("Failed to parse datetime '{}': {}", s, e)))
}
