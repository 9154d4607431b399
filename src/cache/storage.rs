//! Snapshot store trait and SQLite implementation.
//!
//! The store keeps the last good value of each persisted resource so that a
//! restarted process can serve stale data before its first fetch completes.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A persisted snapshot as read back from storage.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
  /// JSON-encoded value
  pub data: Vec<u8>,
  /// When the value was written
  pub stored_at: DateTime<Utc>,
}

/// Trait for snapshot storage backends.
pub trait SnapshotStore: Send + Sync {
  /// Get the stored snapshot for a resource key.
  fn load(&self, key: &str) -> Result<Option<StoredSnapshot>>;

  /// Store (or replace) the snapshot for a resource key.
  fn save(&self, key: &str, description: &str, data: &[u8]) -> Result<()>;

  /// Forget one resource key.
  fn remove(&self, key: &str) -> Result<()>;

  /// Forget everything. Returns the number of snapshots removed.
  fn clear(&self) -> Result<usize>;
}

/// Storage implementation that doesn't persist anything.
/// Used when persistence is disabled - all operations are no-ops.
pub struct NoopStore;

impl SnapshotStore for NoopStore {
  fn load(&self, _key: &str) -> Result<Option<StoredSnapshot>> {
    Ok(None) // Always miss
  }

  fn save(&self, _key: &str, _description: &str, _data: &[u8]) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn clear(&self) -> Result<usize> {
    Ok(0)
  }
}

/// SQLite-based snapshot storage.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at `path`, or at the default location if `None`.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a throwaway in-memory store.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("flu-radar").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(SNAPSHOT_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

const SNAPSHOT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS snapshot_cache (
    key_hash TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    data BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SnapshotStore for SqliteStore {
  fn load(&self, key: &str) -> Result<Option<StoredSnapshot>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, stored_at FROM snapshot_cache WHERE key_hash = ?",
        params![hash_key(key)],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read snapshot for {}: {}", key, e))?;

    match row {
      Some((data, stored_at)) => Ok(Some(StoredSnapshot {
        data,
        stored_at: parse_datetime(&stored_at)?,
      })),
      None => Ok(None),
    }
  }

  fn save(&self, key: &str, description: &str, data: &[u8]) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO snapshot_cache (key_hash, description, data, stored_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![hash_key(key), description, data],
      )
      .map_err(|e| eyre!("Failed to store snapshot for {}: {}", key, e))?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM snapshot_cache WHERE key_hash = ?",
        params![hash_key(key)],
      )
      .map_err(|e| eyre!("Failed to remove snapshot for {}: {}", key, e))?;

    Ok(())
  }

  fn clear(&self) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM snapshot_cache", [])
      .map_err(|e| eyre!("Failed to clear snapshot cache: {}", e))
  }
}

/// SHA256 hash for stable, fixed-length keys.
fn hash_key(key: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(key.as_bytes());
  hex::encode(hasher.finalize())
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

type LoadFn<T> = Arc<dyn Fn() -> Option<(T, DateTime<Utc>)> + Send + Sync>;
type SaveFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Typed load/save hooks binding one resource to a [`SnapshotStore`].
///
/// Store failures are logged and otherwise ignored; persistence never
/// affects the cache state.
pub struct Persistence<T> {
  load: LoadFn<T>,
  save: SaveFn<T>,
}

impl<T> Clone for Persistence<T> {
  fn clone(&self) -> Self {
    Self {
      load: Arc::clone(&self.load),
      save: Arc::clone(&self.save),
    }
  }
}

impl<T: Serialize + DeserializeOwned + 'static> Persistence<T> {
  pub fn new(store: Arc<dyn SnapshotStore>, key: &str, description: &str) -> Self {
    let load: LoadFn<T> = {
      let store = Arc::clone(&store);
      let key = key.to_string();
      Arc::new(move || match store.load(&key) {
        Ok(Some(snapshot)) => match serde_json::from_slice::<T>(&snapshot.data) {
          Ok(value) => Some((value, snapshot.stored_at)),
          Err(e) => {
            tracing::warn!(key = %key, error = %e, "Discarding undecodable snapshot");
            None
          }
        },
        Ok(None) => None,
        Err(e) => {
          tracing::warn!(key = %key, error = %e, "Failed to load snapshot");
          None
        }
      })
    };

    let save: SaveFn<T> = {
      let key = key.to_string();
      let description = description.to_string();
      Arc::new(move |value: &T| {
        let result = serde_json::to_vec(value)
          .map_err(|e| eyre!("Failed to serialize snapshot: {}", e))
          .and_then(|data| store.save(&key, &description, &data));
        if let Err(e) = result {
          tracing::warn!(key = %key, error = %e, "Failed to persist snapshot");
        }
      })
    };

    Self { load, save }
  }
}

impl<T> Persistence<T> {
  pub fn load(&self) -> Option<(T, DateTime<Utc>)> {
    (self.load)()
  }

  pub fn save(&self, value: &T) {
    (self.save)(value);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::Deserialize;

  #[derive(Debug, PartialEq, Serialize, Deserialize)]
  struct Stats {
    active: u32,
  }

  #[test]
  fn test_save_and_load() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert!(store.load("/api/stats").unwrap().is_none());

    store.save("/api/stats", "stats", b"{\"active\":3}").unwrap();
    let snapshot = store.load("/api/stats").unwrap().unwrap();
    assert_eq!(snapshot.data, b"{\"active\":3}");
    assert!(snapshot.stored_at <= Utc::now());
  }

  #[test]
  fn test_save_replaces_previous() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.save("k", "d", b"1").unwrap();
    store.save("k", "d", b"2").unwrap();
    assert_eq!(store.load("k").unwrap().unwrap().data, b"2");
  }

  #[test]
  fn test_remove_and_clear() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.save("a", "a", b"1").unwrap();
    store.save("b", "b", b"2").unwrap();

    store.remove("a").unwrap();
    assert!(store.load("a").unwrap().is_none());
    assert_eq!(store.clear().unwrap(), 1);
    assert!(store.load("b").unwrap().is_none());
  }

  #[test]
  fn test_keys_are_hashed() {
    assert_eq!(hash_key("/api/heatmap").len(), 64);
    assert_ne!(hash_key("/api/heatmap"), hash_key("/api/stats"));
  }

  #[test]
  fn test_persistence_round_trip() {
    let store: Arc<dyn SnapshotStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let persistence = Persistence::<Stats>::new(Arc::clone(&store), "/api/stats", "stats");
    assert!(persistence.load().is_none());

    persistence.save(&Stats { active: 7 });
    let (value, _) = persistence.load().unwrap();
    assert_eq!(value, Stats { active: 7 });
  }

  #[test]
  fn test_persistence_ignores_garbage() {
    let store: Arc<dyn SnapshotStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.save("/api/stats", "stats", b"not json").unwrap();
    let persistence = Persistence::<Stats>::new(store, "/api/stats", "stats");
    assert!(persistence.load().is_none());
  }

  #[test]
  fn test_noop_store_never_hits() {
    let persistence = Persistence::<Stats>::new(Arc::new(NoopStore), "k", "d");
    persistence.save(&Stats { active: 1 });
    assert!(persistence.load().is_none());
  }
}
