//! Movie store trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::watch;

use crate::error::StoreError;
use crate::omdb::Movie;

/// Persistence port for cached movies.
///
/// One snapshot of results lives per query at a time: `save` wholesale
/// replaces the previous snapshot for its query. Reads are position-keyed
/// (limit/offset) so they can back the same page contract as the network
/// pager.
pub trait MovieStore: Send + Sync {
  /// Replace the cached snapshot for `query` with `movies`.
  ///
  /// Saving an empty set is a no-op: an empty page means "no more results
  /// here", never "clear the cache". The delete-then-insert runs in one
  /// transaction, so concurrent readers see the old snapshot or the new
  /// one, never a partial state.
  fn save(&self, query: &str, movies: &[Movie]) -> Result<(), StoreError>;

  /// Movies whose title contains `query` as a raw substring.
  ///
  /// The match is byte-wise case-sensitive (SQLite `instr`, not `LIKE`,
  /// which would fold ASCII case). An empty query matches everything.
  /// Ordered by insertion, with the IMDb id as deterministic tiebreak.
  fn by_query(&self, query: &str, limit: usize, offset: usize) -> Result<Vec<Movie>, StoreError>;

  /// Every cached movie across all queries, same ordering as `by_query`.
  fn all(&self, limit: usize, offset: usize) -> Result<Vec<Movie>, StoreError>;

  /// Number of cached movies across all queries.
  fn count_all(&self) -> Result<usize, StoreError>;

  /// When the snapshot for `query` was last written.
  fn synced_at(&self, query: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

  /// Change stream: the watched value increments on every successful save.
  fn subscribe(&self) -> watch::Receiver<u64>;
}

/// Store that persists nothing. Used when caching is disabled.
pub struct NoopStore {
  // Kept so subscribers get a receiver that simply never fires.
  version: watch::Sender<u64>,
}

impl NoopStore {
  pub fn new() -> Self {
    let (version, _) = watch::channel(0);
    Self { version }
  }
}

impl Default for NoopStore {
  fn default() -> Self {
    Self::new()
  }
}

impl MovieStore for NoopStore {
  fn save(&self, _query: &str, _movies: &[Movie]) -> Result<(), StoreError> {
    Ok(()) // Discard
  }

  fn by_query(&self, _query: &str, _limit: usize, _offset: usize) -> Result<Vec<Movie>, StoreError> {
    Ok(Vec::new()) // Always miss
  }

  fn all(&self, _limit: usize, _offset: usize) -> Result<Vec<Movie>, StoreError> {
    Ok(Vec::new())
  }

  fn count_all(&self) -> Result<usize, StoreError> {
    Ok(0)
  }

  fn synced_at(&self, _query: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    Ok(None)
  }

  fn subscribe(&self) -> watch::Receiver<u64> {
    self.version.subscribe()
  }
}

/// SQLite-backed movie store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
  version: watch::Sender<u64>,
}

/// Schema for the cache database.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS movies (
    imdb_id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    kind TEXT NOT NULL,
    year TEXT NOT NULL,
    poster TEXT
);

CREATE INDEX IF NOT EXISTS idx_movies_title ON movies(title);

-- Per-query snapshot metadata
CREATE TABLE IF NOT EXISTS query_sync (
    query TEXT PRIMARY KEY,
    synced_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open_default() -> Result<Self, StoreError> {
    Self::open(&Self::default_path()?)
  }

  /// Open or create the store at `path`.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| StoreError::Open(format!("{}: {}", parent.display(), e)))?;
    }

    let conn = Connection::open(path)?;
    Self::with_connection(conn)
  }

  /// In-memory store, used by tests.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self, StoreError> {
    conn.execute_batch(SCHEMA)?;
    let (version, _) = watch::channel(0);
    Ok(Self {
      conn: Mutex::new(conn),
      version,
    })
  }

  fn default_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StoreError::Open("could not determine data directory".to_string()))?;

    Ok(data_dir.join("flick").join("cache.db"))
  }
}

impl MovieStore for SqliteStore {
  fn save(&self, query: &str, movies: &[Movie]) -> Result<(), StoreError> {
    if movies.is_empty() {
      return Ok(());
    }

    {
      let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
      let tx = conn.transaction()?;

      // Drop the previous snapshot for this query, then insert the new one.
      tx.execute(
        "DELETE FROM movies WHERE ?1 = '' OR instr(title, ?1) > 0",
        params![query],
      )?;

      for movie in movies {
        tx.execute(
          "INSERT OR REPLACE INTO movies (imdb_id, title, kind, year, poster)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          params![
            movie.imdb_id,
            movie.title,
            movie.kind,
            movie.year,
            movie.poster
          ],
        )?;
      }

      tx.execute(
        "INSERT OR REPLACE INTO query_sync (query, synced_at) VALUES (?1, datetime('now'))",
        params![query],
      )?;

      tx.commit()?;
    }

    self.version.send_modify(|v| *v += 1);
    Ok(())
  }

  fn by_query(&self, query: &str, limit: usize, offset: usize) -> Result<Vec<Movie>, StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;

    let mut stmt = conn.prepare(
      "SELECT imdb_id, title, kind, year, poster FROM movies
       WHERE ?1 = '' OR instr(title, ?1) > 0
       ORDER BY rowid, imdb_id
       LIMIT ?2 OFFSET ?3",
    )?;

    let movies = stmt
      .query_map(params![query, limit as i64, offset as i64], row_to_movie)?
      .collect::<Result<Vec<_>, _>>()?;

    Ok(movies)
  }

  fn all(&self, limit: usize, offset: usize) -> Result<Vec<Movie>, StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;

    let mut stmt = conn.prepare(
      "SELECT imdb_id, title, kind, year, poster FROM movies
       ORDER BY rowid, imdb_id
       LIMIT ?1 OFFSET ?2",
    )?;

    let movies = stmt
      .query_map(params![limit as i64, offset as i64], row_to_movie)?
      .collect::<Result<Vec<_>, _>>()?;

    Ok(movies)
  }

  fn count_all(&self) -> Result<usize, StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;

    let count: i64 = conn.query_row("SELECT COUNT(*) FROM movies", [], |row| row.get(0))?;
    Ok(count as usize)
  }

  fn synced_at(&self, query: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;

    let mut stmt = conn.prepare("SELECT synced_at FROM query_sync WHERE query = ?1")?;
    let synced: Option<String> = stmt.query_row(params![query], |row| row.get(0)).ok();

    synced.map(|s| parse_datetime(&s)).transpose()
  }

  fn subscribe(&self) -> watch::Receiver<u64> {
    self.version.subscribe()
  }
}

fn row_to_movie(row: &rusqlite::Row<'_>) -> rusqlite::Result<Movie> {
  Ok(Movie {
    imdb_id: row.get(0)?,
    title: row.get(1)?,
    kind: row.get(2)?,
    year: row.get(3)?,
    poster: row.get(4)?,
  })
}

/// Parse a datetime string from SQLite format ("YYYY-MM-DD HH:MM:SS").
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|_| StoreError::Timestamp(s.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn movie(id: &str, title: &str) -> Movie {
    Movie {
      imdb_id: id.to_string(),
      title: title.to_string(),
      kind: "movie".to_string(),
      year: "2008".to_string(),
      poster: None,
    }
  }

  #[test]
  fn save_replaces_previous_snapshot_for_query() {
    let store = SqliteStore::open_in_memory().unwrap();

    let first = vec![movie("tt1", "Batman Begins"), movie("tt2", "Batman Returns")];
    let second = vec![movie("tt3", "The Batman")];

    store.save("Batman", &first).unwrap();
    store.save("Batman", &second).unwrap();

    let cached = store.by_query("Batman", 50, 0).unwrap();
    assert_eq!(cached, second);
  }

  #[test]
  fn empty_save_retains_previous_snapshot() {
    let store = SqliteStore::open_in_memory().unwrap();

    let first = vec![movie("tt1", "Batman Begins")];
    store.save("Batman", &first).unwrap();
    store.save("Batman", &[]).unwrap();

    let cached = store.by_query("Batman", 50, 0).unwrap();
    assert_eq!(cached, first);
  }

  #[test]
  fn by_query_is_case_sensitive() {
    let store = SqliteStore::open_in_memory().unwrap();

    store.save("Batman", &[movie("tt1", "Batman Begins")]).unwrap();

    assert_eq!(store.by_query("Batman", 50, 0).unwrap().len(), 1);
    // Raw substring match, no case folding
    assert!(store.by_query("batman", 50, 0).unwrap().is_empty());
  }

  #[test]
  fn empty_query_matches_everything() {
    let store = SqliteStore::open_in_memory().unwrap();

    store.save("Batman", &[movie("tt1", "Batman Begins")]).unwrap();
    store.save("Superman", &[movie("tt2", "Superman Returns")]).unwrap();

    assert_eq!(store.by_query("", 50, 0).unwrap().len(), 2);
  }

  #[test]
  fn all_preserves_insertion_order() {
    let store = SqliteStore::open_in_memory().unwrap();

    store.save("Batman", &[movie("tt1", "Batman Begins")]).unwrap();
    store.save("Superman", &[movie("tt2", "Superman Returns")]).unwrap();

    let all = store.all(50, 0).unwrap();
    assert_eq!(all[0].imdb_id, "tt1");
    assert_eq!(all[1].imdb_id, "tt2");
    assert_eq!(store.count_all().unwrap(), 2);
  }

  #[test]
  fn reads_are_position_keyed() {
    let store = SqliteStore::open_in_memory().unwrap();

    let movies: Vec<Movie> = (0..5)
      .map(|i| movie(&format!("tt{}", i), &format!("Batman {}", i)))
      .collect();
    store.save("Batman", &movies).unwrap();

    let page = store.by_query("Batman", 2, 2).unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].imdb_id, "tt2");
    assert_eq!(page[1].imdb_id, "tt3");
  }

  #[test]
  fn save_records_sync_time_and_bumps_version() {
    let store = SqliteStore::open_in_memory().unwrap();
    let version = store.subscribe();

    assert!(store.synced_at("Batman").unwrap().is_none());
    store.save("Batman", &[movie("tt1", "Batman Begins")]).unwrap();

    assert!(store.synced_at("Batman").unwrap().is_some());
    assert_eq!(*version.borrow(), 1);
  }

  #[test]
  fn saving_same_id_under_new_query_moves_the_row() {
    let store = SqliteStore::open_in_memory().unwrap();

    store.save("Begins", &[movie("tt1", "Batman Begins")]).unwrap();
    // Same identity re-fetched under a different query: fields replaceable
    let renamed = Movie {
      year: "2005".to_string(),
      ..movie("tt1", "Batman Begins")
    };
    store.save("Batman", &[renamed.clone()]).unwrap();

    let all = store.all(50, 0).unwrap();
    assert_eq!(all, vec![renamed]);
  }
}
