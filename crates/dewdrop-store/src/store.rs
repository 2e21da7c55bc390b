//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row};
use time::OffsetDateTime;
use tracing::{debug, info};

use dewdrop_types::SensorFeed;

use crate::error::{Error, Result};
use crate::models::StoredFeed;
use crate::schema;

const FEED_COLUMNS: &str = "id, received_at, device_id, indoor_temperature, indoor_humidity, \
     indoor_dewpoint, outdoor_dewpoint, dewpoint_delta, open_windows, humidity_alert";

/// SQLite-based store for sensor feeds.
pub struct Store {
    conn: Connection,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Append a feed received now.
    pub fn insert_feed(&self, feed: &SensorFeed) -> Result<i64> {
        self.insert_feed_at(feed, OffsetDateTime::now_utc())
    }

    /// Append a feed with an explicit receive time.
    pub fn insert_feed_at(&self, feed: &SensorFeed, received_at: OffsetDateTime) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO feeds (received_at, device_id, indoor_temperature, indoor_humidity,
             indoor_dewpoint, outdoor_dewpoint, dewpoint_delta, open_windows, humidity_alert)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                received_at.unix_timestamp(),
                feed.device_id.to_string(),
                feed.indoor_temperature,
                feed.indoor_humidity,
                feed.indoor_dewpoint,
                feed.outdoor_dewpoint,
                feed.dewpoint_delta,
                feed.open_windows,
                feed.humidity_alert,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted feed row {} for device {}", id, feed.device_id);
        Ok(id)
    }

    /// Whether no feed has ever been stored.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.count_feeds()? == 0)
    }

    /// Number of stored feeds.
    pub fn count_feeds(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM feeds", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// `open_windows` of the most recent row, if any.
    pub fn last_open_windows(&self) -> Result<Option<bool>> {
        Ok(self
            .conn
            .query_row(
                "SELECT open_windows FROM feeds ORDER BY received_at DESC, id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Whether any row received at or after `since` raised a humidity alert.
    pub fn has_humidity_alert_since(&self, since: OffsetDateTime) -> Result<bool> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM feeds WHERE humidity_alert = 1 AND received_at >= ?1)",
            [since.unix_timestamp()],
            |row| row.get(0),
        )?)
    }

    /// The most recent row, if any.
    pub fn latest_feed(&self) -> Result<Option<StoredFeed>> {
        let sql = format!(
            "SELECT {} FROM feeds ORDER BY received_at DESC, id DESC LIMIT 1",
            FEED_COLUMNS
        );
        let raw = self.conn.query_row(&sql, [], RawFeed::from_row).optional()?;
        raw.map(RawFeed::decode).transpose()
    }

    /// The most recent rows, newest first.
    pub fn recent_feeds(&self, limit: u32) -> Result<Vec<StoredFeed>> {
        let sql = format!(
            "SELECT {} FROM feeds ORDER BY received_at DESC, id DESC LIMIT ?1",
            FEED_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([limit], RawFeed::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawFeed::decode).collect()
    }
}

/// Row values before fallible conversion.
struct RawFeed {
    id: i64,
    received_at: i64,
    device_id: String,
    values: [f64; 5],
    open_windows: bool,
    humidity_alert: bool,
}

impl RawFeed {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            received_at: row.get(1)?,
            device_id: row.get(2)?,
            values: [row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?],
            open_windows: row.get(8)?,
            humidity_alert: row.get(9)?,
        })
    }

    fn decode(self) -> Result<StoredFeed> {
        let received_at = OffsetDateTime::from_unix_timestamp(self.received_at)
            .map_err(|_| Error::InvalidTimestamp(self.received_at))?;
        let device_id = self.device_id.parse().map_err(|_| Error::CorruptRow {
            id: self.id,
            reason: format!("device id {:?}", self.device_id),
        })?;
        let [
            indoor_temperature,
            indoor_humidity,
            indoor_dewpoint,
            outdoor_dewpoint,
            dewpoint_delta,
        ] = self.values;

        Ok(StoredFeed {
            id: self.id,
            received_at,
            feed: SensorFeed {
                device_id,
                indoor_temperature,
                indoor_humidity,
                indoor_dewpoint,
                outdoor_dewpoint,
                dewpoint_delta,
                open_windows: self.open_windows,
                humidity_alert: self.humidity_alert,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn feed(device_id: u64, open_windows: bool, humidity_alert: bool) -> SensorFeed {
        SensorFeed {
            device_id,
            indoor_temperature: 21.5,
            indoor_humidity: 48.25,
            indoor_dewpoint: 10.06,
            outdoor_dewpoint: 7.5,
            dewpoint_delta: 2.56,
            open_windows,
            humidity_alert,
        }
    }

    #[test]
    fn test_open_in_memory_is_empty() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.is_empty().unwrap());
        assert_eq!(store.last_open_windows().unwrap(), None);
        assert!(store.latest_feed().unwrap().is_none());
    }

    #[test]
    fn test_insert_and_read_back() {
        let store = Store::open_in_memory().unwrap();
        let id = store.insert_feed(&feed(123, true, false)).unwrap();

        let latest = store.latest_feed().unwrap().unwrap();
        assert_eq!(latest.id, id);
        assert_eq!(latest.feed, feed(123, true, false));
        assert!(!store.is_empty().unwrap());
    }

    #[test]
    fn test_large_device_id_round_trips() {
        let store = Store::open_in_memory().unwrap();
        store.insert_feed(&feed(u64::MAX, false, false)).unwrap();
        assert_eq!(store.latest_feed().unwrap().unwrap().feed.device_id, u64::MAX);
    }

    #[test]
    fn test_last_open_windows_uses_latest_row() {
        let store = Store::open_in_memory().unwrap();
        let now = OffsetDateTime::now_utc();

        store.insert_feed_at(&feed(1, true, false), now - Duration::minutes(2)).unwrap();
        store.insert_feed_at(&feed(1, false, false), now - Duration::minutes(1)).unwrap();
        assert_eq!(store.last_open_windows().unwrap(), Some(false));

        store.insert_feed_at(&feed(1, true, false), now).unwrap();
        assert_eq!(store.last_open_windows().unwrap(), Some(true));
    }

    #[test]
    fn test_humidity_alert_window() {
        let store = Store::open_in_memory().unwrap();
        let now = OffsetDateTime::now_utc();

        store.insert_feed_at(&feed(1, true, true), now - Duration::minutes(90)).unwrap();
        store.insert_feed_at(&feed(1, true, false), now - Duration::minutes(10)).unwrap();

        assert!(!store.has_humidity_alert_since(now - Duration::hours(1)).unwrap());
        assert!(store.has_humidity_alert_since(now - Duration::hours(2)).unwrap());
    }

    #[test]
    fn test_recent_feeds_newest_first() {
        let store = Store::open_in_memory().unwrap();
        let now = OffsetDateTime::now_utc();
        for i in 0..5 {
            store
                .insert_feed_at(&feed(i, false, false), now - Duration::minutes(10 - i as i64))
                .unwrap();
        }

        let recent = store.recent_feeds(3).unwrap();
        let ids: Vec<u64> = recent.iter().map(|r| r.feed.device_id).collect();
        assert_eq!(ids, vec![4, 3, 2]);
        assert_eq!(store.count_feeds().unwrap(), 5);
    }

    #[test]
    fn test_open_file_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("feeds.db");

        {
            let store = Store::open(&path).unwrap();
            store.insert_feed(&feed(9, true, false)).unwrap();
        }

        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.count_feeds().unwrap(), 1);
    }
}
