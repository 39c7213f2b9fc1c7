//! SQLite persistence for geocoding results.
//!
//! One row per geocoded place. The schema is intentionally simple:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS geocoded_locations (
//!     id           INTEGER PRIMARY KEY AUTOINCREMENT,
//!     lat_e6       INTEGER,          -- latitude  × 10^6, rounded
//!     lon_e6       INTEGER,          -- longitude × 10^6, rounded
//!     place_name   TEXT,             -- as supplied
//!     place_key    TEXT,             -- normalized for lookup
//!     raw_response TEXT,             -- verbatim upstream JSON
//!     created_at   TEXT NOT NULL,
//!     updated_at   TEXT NOT NULL
//! );
//! ```
//!
//! - Coordinates are stored as integer micro-degrees so "equal to six
//!   decimal places" is plain integer equality and can use an index.
//! - Both lookup indexes are non-unique; [`CacheStore::store`] upserts
//!   inside a transaction so a single writer never duplicates a key.
//! - Two names geocoding to the same point keep separate rows. A stored
//!   key is never overwritten with a different value.
//! - WAL mode lets readers proceed while a write is in progress.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::error::{LensError, Result};
use crate::types::{CacheEntry, CacheRecord, Coordinates, normalize_place_name};

/// Persistent key → record mapping for geocoding results.
///
/// Implementations must be safe to share between tasks; the orchestrator
/// holds one behind an `Arc`.
pub trait CacheStore: Send + Sync {
    /// Most recent record whose coordinates match `point` to six decimals.
    ///
    /// # Errors
    /// Storage failures.
    fn lookup_by_coordinates(&self, point: Coordinates) -> Result<Option<CacheRecord>>;

    /// Most recent record whose normalized place name matches `name`.
    ///
    /// # Errors
    /// Storage failures.
    fn lookup_by_place_name(&self, name: &str) -> Result<Option<CacheRecord>>;

    /// Coordinates first, then place name.
    ///
    /// # Errors
    /// Storage failures.
    fn lookup(&self, point: Option<Coordinates>, name: Option<&str>) -> Result<Option<CacheRecord>> {
        if let Some(point) = point {
            if let Some(record) = self.lookup_by_coordinates(point)? {
                return Ok(Some(record));
            }
        }
        match name {
            Some(name) => self.lookup_by_place_name(name),
            None => Ok(None),
        }
    }

    /// Insert `entry`, or update the record that already matches one of its
    /// keys. A record holding a different value for either key is never
    /// merged into; the entry gets its own row instead. Fields left `None`
    /// keep their stored value.
    ///
    /// # Errors
    /// [`LensError::MissingKey`] when the entry has no usable key,
    /// [`LensError::PayloadTooLarge`] for oversized payloads, storage
    /// failures otherwise.
    fn store(&self, entry: CacheEntry) -> Result<CacheRecord>;

    /// Like [`CacheStore::store`], but only a record matching the
    /// `requested` key is updated. The other key is filled in when the
    /// record has none and otherwise left alone.
    ///
    /// # Errors
    /// [`LensError::MissingKey`] when `entry` lacks the requested key,
    /// otherwise as [`CacheStore::store`].
    fn store_keyed(&self, entry: CacheEntry, requested: RequestedKey) -> Result<CacheRecord>;

    /// Remove a record. Returns `true` if a row was deleted.
    ///
    /// # Errors
    /// Storage failures.
    fn delete(&self, id: i64) -> Result<bool>;

    /// Number of stored records.
    ///
    /// # Errors
    /// Storage failures.
    fn count(&self) -> Result<usize>;
}

/// The key a geocode was requested by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedKey {
    /// Reverse geocode.
    Coordinates,
    /// Forward geocode.
    PlaceName,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS geocoded_locations (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        lat_e6       INTEGER,
        lon_e6       INTEGER,
        place_name   TEXT,
        place_key    TEXT,
        raw_response TEXT,
        created_at   TEXT NOT NULL,
        updated_at   TEXT NOT NULL,
        CHECK ((lat_e6 IS NULL) = (lon_e6 IS NULL)),
        CHECK (lat_e6 IS NOT NULL OR place_key IS NOT NULL)
    );
    CREATE INDEX IF NOT EXISTS idx_geocoded_coordinates ON geocoded_locations (lat_e6, lon_e6);
    CREATE INDEX IF NOT EXISTS idx_geocoded_place_key ON geocoded_locations (place_key);";

const SELECT_COLUMNS: &str =
    "SELECT id, lat_e6, lon_e6, place_name, raw_response, created_at, updated_at FROM geocoded_locations";

// Upsert targets. `?1, ?2` are the entry's micro-degrees, `?3` its place key.
// A row holding a different value for a key the entry carries is never a
// target, except for the non-requested key of a keyed write.
const MATCH_ANY_COMPATIBLE: &str = "SELECT id FROM geocoded_locations
    WHERE ((lat_e6 = ?1 AND lon_e6 = ?2) OR place_key = ?3)
      AND (?1 IS NULL OR lat_e6 IS NULL OR (lat_e6 = ?1 AND lon_e6 = ?2))
      AND (?3 IS NULL OR place_key IS NULL OR place_key = ?3)
    ORDER BY COALESCE(lat_e6 = ?1 AND lon_e6 = ?2, 0) + COALESCE(place_key = ?3, 0) DESC,
             COALESCE(lat_e6 = ?1 AND lon_e6 = ?2, 0) DESC,
             updated_at DESC, id DESC
    LIMIT 1";

const MATCH_COORDINATES: &str = "SELECT id FROM geocoded_locations
    WHERE lat_e6 = ?1 AND lon_e6 = ?2
    ORDER BY (?3 IS NULL OR place_key IS NULL OR place_key = ?3) DESC, updated_at DESC, id DESC
    LIMIT 1";

const MATCH_PLACE_KEY: &str = "SELECT id FROM geocoded_locations
    WHERE place_key = ?3
    ORDER BY (?1 IS NULL OR lat_e6 IS NULL OR (lat_e6 = ?1 AND lon_e6 = ?2)) DESC, updated_at DESC, id DESC
    LIMIT 1";

/// Handle to an open SQLite geocoding cache.
///
/// # Usage
///
/// ```no_run
/// # use lens_core::cache::{CacheStore, SqliteCacheStore};
/// # use lens_core::config::CacheConfig;
/// # use lens_core::types::{CacheEntry, Coordinates};
/// let store = SqliteCacheStore::open("geocache.db", &CacheConfig::default())?;
/// let record = store.store(CacheEntry {
///     coordinates: Some(Coordinates::new(42.5747, -70.9698)),
///     place_name: Some("Danvers State Hospital".into()),
///     raw_response: Some("{\"results\":[]}".into()),
/// })?;
/// assert!(store.lookup_by_place_name("danvers  state hospital")?.is_some());
/// # Ok::<(), lens_core::error::LensError>(())
/// ```
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
    config: CacheConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCacheStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteCacheStore {
    /// Open (or create) a cache database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &CacheConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "Geocoding cache opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path,
        })
    }

    /// Open the database named by `config.db_path`.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Database`] on SQLite failures.
    pub fn open_configured(config: &CacheConfig) -> Result<Self> {
        Self::open(&config.db_path, config)
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &CacheConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path of the underlying database.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn query_one(&self, sql: &str, params: impl rusqlite::Params) -> Result<Option<CacheRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let raw = stmt.query_row(params, RawRecord::from_row).optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    fn write(&self, entry: CacheEntry, requested: Option<RequestedKey>) -> Result<CacheRecord> {
        let start = Instant::now();

        if !entry.has_key() {
            return Err(LensError::MissingKey);
        }
        if let Some(raw) = &entry.raw_response {
            let len = raw.chars().count();
            if len > self.config.max_raw_response_chars {
                return Err(LensError::PayloadTooLarge {
                    len,
                    limit: self.config.max_raw_response_chars,
                });
            }
        }

        let place_key = entry.place_key();
        let (lat, lon) = match entry.coordinates {
            Some(point) => {
                let (lat, lon) = point.to_micro_degrees();
                (Some(lat), Some(lon))
            }
            None => (None, None),
        };
        let candidates = match requested {
            None => MATCH_ANY_COMPATIBLE,
            Some(RequestedKey::Coordinates) if lat.is_some() => MATCH_COORDINATES,
            Some(RequestedKey::PlaceName) if place_key.is_some() => MATCH_PLACE_KEY,
            Some(_) => return Err(LensError::MissingKey),
        };
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(candidates, params![lat, lon, place_key], |row| row.get(0))
            .optional()?;

        let id = if let Some(id) = existing {
            tx.execute(
                "UPDATE geocoded_locations SET
                    lat_e6       = COALESCE(lat_e6, ?2),
                    lon_e6       = COALESCE(lon_e6, ?3),
                    place_name   = CASE WHEN ?5 IS NOT NULL AND (place_key IS NULL OR place_key = ?5)
                                        THEN ?4 ELSE place_name END,
                    place_key    = COALESCE(place_key, ?5),
                    raw_response = COALESCE(?6, raw_response),
                    updated_at   = ?7
                 WHERE id = ?1",
                params![id, lat, lon, entry.place_name, place_key, entry.raw_response, now],
            )?;
            id
        } else {
            tx.execute(
                "INSERT INTO geocoded_locations
                    (lat_e6, lon_e6, place_name, place_key, raw_response, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![lat, lon, entry.place_name, place_key, entry.raw_response, now],
            )?;
            tx.last_insert_rowid()
        };

        let raw = tx.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            params![id],
            RawRecord::from_row,
        )?;
        tx.commit()?;

        debug!(
            id,
            updated = existing.is_some(),
            requested = ?requested,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Stored geocoding record"
        );
        raw.into_record()
    }
}

impl CacheStore for SqliteCacheStore {
    fn lookup_by_coordinates(&self, point: Coordinates) -> Result<Option<CacheRecord>> {
        let (lat, lon) = point.to_micro_degrees();
        let record = self.query_one(
            &format!("{SELECT_COLUMNS} WHERE lat_e6 = ?1 AND lon_e6 = ?2 ORDER BY updated_at DESC, id DESC LIMIT 1"),
            params![lat, lon],
        )?;
        debug!(point = %point, hit = record.is_some(), "Coordinate lookup");
        Ok(record)
    }

    fn lookup_by_place_name(&self, name: &str) -> Result<Option<CacheRecord>> {
        let Some(key) = normalize_place_name(name) else {
            return Ok(None);
        };
        let record = self.query_one(
            &format!("{SELECT_COLUMNS} WHERE place_key = ?1 ORDER BY updated_at DESC, id DESC LIMIT 1"),
            params![key],
        )?;
        debug!(place = %key, hit = record.is_some(), "Place-name lookup");
        Ok(record)
    }

    fn store(&self, entry: CacheEntry) -> Result<CacheRecord> {
        self.write(entry, None)
    }

    fn store_keyed(&self, entry: CacheEntry, requested: RequestedKey) -> Result<CacheRecord> {
        self.write(entry, Some(requested))
    }

    fn delete(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM geocoded_locations WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM geocoded_locations", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

/// Row as read from SQLite, before timestamp parsing.
struct RawRecord {
    id: i64,
    lat_e6: Option<i64>,
    lon_e6: Option<i64>,
    place_name: Option<String>,
    raw_response: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            lat_e6: row.get(1)?,
            lon_e6: row.get(2)?,
            place_name: row.get(3)?,
            raw_response: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<CacheRecord> {
        let coordinates = match (self.lat_e6, self.lon_e6) {
            (Some(lat), Some(lon)) => Some(Coordinates::from_micro_degrees(lat, lon)),
            _ => None,
        };
        Ok(CacheRecord {
            id: self.id,
            coordinates,
            place_name: self.place_name,
            raw_response: self.raw_response,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| LensError::Serialization(format!("bad timestamp '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteCacheStore {
        SqliteCacheStore::open_in_memory(&CacheConfig::default()).expect("in-memory store")
    }

    fn named(name: &str, raw: &str) -> CacheEntry {
        CacheEntry {
            coordinates: None,
            place_name: Some(name.into()),
            raw_response: Some(raw.into()),
        }
    }

    #[test]
    fn coordinate_round_trip() {
        let store = store();
        let point = Coordinates::new(42.574_712_3, -70.969_845_9);
        let stored = store
            .store(CacheEntry {
                coordinates: Some(point),
                ..CacheEntry::default()
            })
            .expect("store");

        let found = store
            .lookup_by_coordinates(point.rounded())
            .expect("lookup")
            .expect("hit");
        assert_eq!(found.id, stored.id);
        assert_eq!(found.coordinates, Some(point.rounded()));
    }

    #[test]
    fn place_lookup_is_normalized() {
        let store = store();
        store.store(named("Danvers State Hospital", "{}")).expect("store");

        assert!(store.lookup_by_place_name("  danvers   STATE hospital").expect("lookup").is_some());
        assert!(store.lookup_by_place_name("Danvers").expect("lookup").is_none());
        assert!(store.lookup_by_place_name("   ").expect("lookup").is_none());
    }

    #[test]
    fn second_store_updates_instead_of_duplicating() {
        let store = store();
        let first = store.store(named("Salem", r#"{"v":1}"#)).expect("first");
        let second = store.store(named("SALEM", r#"{"v":2}"#)).expect("second");

        assert_eq!(first.id, second.id);
        assert_eq!(store.count().expect("count"), 1);
        let found = store.lookup_by_place_name("salem").expect("lookup").expect("hit");
        assert_eq!(found.raw_response.as_deref(), Some(r#"{"v":2}"#));
        assert!(found.updated_at >= found.created_at);
    }

    #[test]
    fn update_keeps_fields_not_supplied() {
        let store = store();
        store.store(named("Salem", r#"{"v":1}"#)).expect("first");
        let merged = store
            .store(CacheEntry {
                coordinates: Some(Coordinates::new(42.5195, -70.8967)),
                place_name: Some("salem".into()),
                raw_response: None,
            })
            .expect("merge");

        assert_eq!(merged.raw_response.as_deref(), Some(r#"{"v":1}"#));
        assert_eq!(merged.coordinates, Some(Coordinates::new(42.5195, -70.8967)));
        assert!(
            store
                .lookup_by_coordinates(Coordinates::new(42.5195, -70.8967))
                .expect("lookup")
                .is_some()
        );
    }

    #[test]
    fn names_sharing_a_point_keep_separate_rows() {
        let store = store();
        let centroid = Coordinates::new(42.5195, -70.8967);
        let entry = |name: &str, raw: &str| CacheEntry {
            coordinates: Some(centroid),
            place_name: Some(name.into()),
            raw_response: Some(raw.into()),
        };

        let city = store.store(entry("Salem", r#"{"v":"city"}"#)).expect("city");
        let museum = store.store(entry("Salem Witch Museum", r#"{"v":"museum"}"#)).expect("museum");

        assert_ne!(city.id, museum.id);
        assert_eq!(store.count().expect("count"), 2);
        let found = store.lookup_by_place_name("salem").expect("lookup").expect("city kept");
        assert_eq!(found.raw_response.as_deref(), Some(r#"{"v":"city"}"#));
        let found = store.lookup_by_coordinates(centroid).expect("lookup").expect("point");
        assert_eq!(found.id, museum.id, "most recent write wins the point");

        let again = store.store(entry("SALEM", r#"{"v":"city2"}"#)).expect("same key again");
        assert_eq!(again.id, city.id);
        assert_eq!(store.count().expect("count"), 2);
    }

    #[test]
    fn name_only_entry_does_not_join_a_differently_named_row() {
        let store = store();
        store
            .store(CacheEntry {
                coordinates: Some(Coordinates::new(1.0, 2.0)),
                place_name: Some("Old Mill".into()),
                raw_response: Some("{}".into()),
            })
            .expect("first");
        let moved = store
            .store(CacheEntry {
                coordinates: Some(Coordinates::new(3.0, 4.0)),
                place_name: Some("old mill".into()),
                raw_response: Some("{}".into()),
            })
            .expect("second");

        assert_eq!(store.count().expect("count"), 2);
        let found = store.lookup_by_place_name("Old Mill").expect("lookup").expect("hit");
        assert_eq!(found.id, moved.id);
    }

    #[test]
    fn keyed_write_updates_requested_key_only() {
        let store = store();
        let point = Coordinates::new(41.0, -72.0);
        let first = store
            .store_keyed(
                CacheEntry {
                    coordinates: Some(point),
                    place_name: Some("Old Name".into()),
                    raw_response: Some(r#"{"v":1}"#.into()),
                },
                RequestedKey::Coordinates,
            )
            .expect("first");
        let second = store
            .store_keyed(
                CacheEntry {
                    coordinates: Some(point),
                    place_name: Some("New Name".into()),
                    raw_response: Some(r#"{"v":2}"#.into()),
                },
                RequestedKey::Coordinates,
            )
            .expect("refresh");

        assert_eq!(first.id, second.id);
        assert_eq!(second.place_name.as_deref(), Some("Old Name"), "stored key kept");
        assert_eq!(second.raw_response.as_deref(), Some(r#"{"v":2}"#));

        let other = store
            .store_keyed(named("Somewhere Else", "{}"), RequestedKey::PlaceName)
            .expect("name-keyed insert");
        assert_ne!(other.id, first.id);

        let err = store
            .store_keyed(named("No Point", "{}"), RequestedKey::Coordinates)
            .expect_err("requested key missing");
        assert!(matches!(err, LensError::MissingKey));
    }

    #[test]
    fn keyless_entry_rejected() {
        let err = store()
            .store(CacheEntry {
                raw_response: Some("{}".into()),
                ..CacheEntry::default()
            })
            .expect_err("no key");
        assert!(matches!(err, LensError::MissingKey));
    }

    #[test]
    fn oversized_payload_rejected() {
        let config = CacheConfig {
            max_raw_response_chars: 10,
            ..CacheConfig::default()
        };
        let store = SqliteCacheStore::open_in_memory(&config).expect("store");
        let err = store.store(named("Salem", "01234567890")).expect_err("too large");
        assert!(matches!(err, LensError::PayloadTooLarge { len: 11, limit: 10 }));
        assert_eq!(store.count().expect("count"), 0);
    }

    #[test]
    fn delete_removes_record() {
        let store = store();
        let record = store.store(named("Salem", "{}")).expect("store");
        assert!(store.delete(record.id).expect("delete"));
        assert!(!store.delete(record.id).expect("second delete"));
        assert!(store.lookup_by_place_name("salem").expect("lookup").is_none());
    }

    #[test]
    fn lookup_prefers_coordinates() {
        let store = store();
        let point = Coordinates::new(1.0, 2.0);
        let by_point = store
            .store(CacheEntry {
                coordinates: Some(point),
                raw_response: Some("\"point\"".into()),
                ..CacheEntry::default()
            })
            .expect("store point");
        store.store(named("Elsewhere", "\"name\"")).expect("store name");

        let found = store.lookup(Some(point), Some("Elsewhere")).expect("lookup").expect("hit");
        assert_eq!(found.id, by_point.id);
        let found = store
            .lookup(Some(Coordinates::new(9.0, 9.0)), Some("elsewhere"))
            .expect("lookup")
            .expect("hit");
        assert_eq!(found.raw_response.as_deref(), Some("\"name\""));
    }
}
