//! SQLite-backed flow history.
//!
//! The store owns a single connection behind a mutex and is the only shared
//! mutable resource of the monitor. Duplicate detection is the `UNIQUE`
//! constraint plus `INSERT OR IGNORE`, so concurrent inserts of the same
//! flow leave exactly one row without any read-before-write.

use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};
use tunnelwatch_core::{
    format_timestamp, EnrichedRecord, FlowKey, GeoPoint, MonitorError, NetworkOwner, Result,
    TIMESTAMP_FORMAT,
};

use crate::query::FlowFilter;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS flows (
    timestamp TEXT NOT NULL,
    src       TEXT NOT NULL,
    dst       TEXT NOT NULL,
    pid       INTEGER NOT NULL DEFAULT 0,
    exe       TEXT,
    asn       INTEGER,
    org       TEXT,
    lat       REAL,
    lon       REAL,
    UNIQUE (timestamp, src, dst, pid),
    CHECK ((asn IS NULL) = (org IS NULL)),
    CHECK ((lat IS NULL) = (lon IS NULL))
);
CREATE INDEX IF NOT EXISTS flows_by_time ON flows (timestamp);
";

const COLUMNS: &str = "timestamp, src, dst, pid, exe, asn, org, lat, lon";

/// Whether an insert added a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was new
    Inserted,
    /// A record with the same key already existed; nothing changed
    Duplicate,
}

/// Persistent, deduplicated table of enriched flows
#[derive(Debug, Clone)]
pub struct FlowStore {
    conn: Arc<Mutex<Connection>>,
}

impl FlowStore {
    /// Open (creating if needed) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(store_error)?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(store_error)?;
        info!(path = %path.display(), "opened flow store");
        Self::init(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(store_error)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(store_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MonitorError::Store("connection lock poisoned".into()))
    }

    /// Insert a record unless its key is already stored
    pub fn insert(&self, record: &EnrichedRecord) -> Result<InsertOutcome> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO flows (timestamp, src, dst, pid, exe, asn, org, lat, lon)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    format_timestamp(&record.observed_at),
                    record.src.to_string(),
                    record.dst.to_string(),
                    record.pid.unwrap_or(0),
                    record.exe,
                    record.asn(),
                    record.org(),
                    record.lat(),
                    record.lon(),
                ],
            )
            .map_err(store_error)?;

        if changed == 0 {
            debug!(key = ?record.key(), "duplicate flow ignored");
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    /// Returns true if a record with this key is stored
    pub fn contains(&self, key: &FlowKey) -> Result<bool> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT 1 FROM flows WHERE timestamp = ?1 AND src = ?2 AND dst = ?3 AND pid = ?4",
            )
            .map_err(store_error)?;
        stmt.exists(params![
            format_timestamp(&key.observed_at),
            key.src.to_string(),
            key.dst.to_string(),
            key.pid,
        ])
        .map_err(store_error)
    }

    /// The `limit` most recent records matching `filter`, newest first.
    ///
    /// Records sharing a timestamp are ordered by insertion, newest first.
    pub fn query(&self, filter: &FlowFilter, limit: usize) -> Result<Vec<EnrichedRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut values: Vec<i64> = Vec::new();
        let mut sql = format!("SELECT {COLUMNS} FROM flows");

        if let Some(asns) = filter.selected() {
            if asns.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; asns.len()].join(", ");
            sql.push_str(&format!(" WHERE asn IN ({placeholders})"));
            values.extend(asns.iter().map(|&asn| i64::from(asn)));
        }
        sql.push_str(" ORDER BY timestamp DESC, rowid DESC LIMIT ?");
        values.push(limit);

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(store_error)?;
        let rows = stmt
            .query_map(params_from_iter(values), read_record)
            .map_err(store_error)?;
        let records = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_error)?;
        Ok(records)
    }

    /// Number of stored records
    pub fn len(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM flows", [], |row| row.get(0))
            .map_err(store_error)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Returns true if nothing is stored
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// [`Self::insert`] on the blocking pool
    pub async fn save(&self, record: EnrichedRecord) -> Result<InsertOutcome> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.insert(&record))
            .await
            .map_err(|e| MonitorError::Store(format!("insert task failed: {e}")))?
    }

    /// [`Self::contains`] on the blocking pool
    pub async fn has(&self, key: FlowKey) -> Result<bool> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.contains(&key))
            .await
            .map_err(|e| MonitorError::Store(format!("lookup task failed: {e}")))?
    }

    /// [`Self::query`] on the blocking pool
    pub async fn recent(&self, filter: FlowFilter, limit: usize) -> Result<Vec<EnrichedRecord>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.query(&filter, limit))
            .await
            .map_err(|e| MonitorError::Store(format!("query task failed: {e}")))?
    }
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<EnrichedRecord> {
    let timestamp: String = row.get(0)?;
    let observed_at = chrono::NaiveDateTime::parse_from_str(&timestamp, TIMESTAMP_FORMAT)
        .map_err(|e| conversion(0, e))?;
    let pid: u32 = row.get(3)?;

    Ok(EnrichedRecord {
        observed_at,
        src: parsed(row, 1)?,
        dst: parsed(row, 2)?,
        pid: (pid != 0).then_some(pid),
        exe: row.get(4)?,
        owner: NetworkOwner::from_pair(row.get(5)?, row.get(6)?),
        location: GeoPoint::from_pair(row.get(7)?, row.get(8)?),
    })
}

fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion(idx, e))
}

fn conversion(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn store_error(e: rusqlite::Error) -> MonitorError {
    MonitorError::Store(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use tunnelwatch_core::parse_timestamp;

    fn record(ts: &str, dst: &str, pid: Option<u32>) -> EnrichedRecord {
        EnrichedRecord {
            observed_at: parse_timestamp(ts).unwrap(),
            src: "192.168.1.5".parse().unwrap(),
            dst: dst.parse().unwrap(),
            pid,
            exe: None,
            owner: None,
            location: None,
        }
    }

    fn owned(mut record: EnrichedRecord, asn: u32) -> EnrichedRecord {
        record.owner = Some(NetworkOwner {
            asn,
            name: format!("AS-{asn}"),
        });
        record
    }

    #[test]
    fn test_insert_is_idempotent() {
        let store = FlowStore::open_in_memory().unwrap();
        let r = record("2024-01-01 10:00:00", "203.0.113.9", Some(4321));

        assert_eq!(store.insert(&r).unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert(&r).unwrap(), InsertOutcome::Duplicate);
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.contains(&r.key()).unwrap());
    }

    #[test]
    fn test_first_write_wins() {
        let store = FlowStore::open_in_memory().unwrap();
        let bare = record("2024-01-01 10:00:00", "203.0.113.9", None);
        let mut richer = bare.clone();
        richer.exe = Some("/usr/bin/late".into());

        store.insert(&bare).unwrap();
        assert_eq!(store.insert(&richer).unwrap(), InsertOutcome::Duplicate);
        let rows = store.query(&FlowFilter::any(), 10).unwrap();
        assert_eq!(rows, vec![bare]);
    }

    #[test]
    fn test_absent_pid_deduplicates() {
        let store = FlowStore::open_in_memory().unwrap();
        let r = record("2024-01-01 10:00:00", "203.0.113.9", None);
        store.insert(&r).unwrap();
        assert_eq!(store.insert(&r).unwrap(), InsertOutcome::Duplicate);

        let back = store.query(&FlowFilter::any(), 1).unwrap();
        assert_eq!(back[0].pid, None);
    }

    #[test]
    fn test_query_is_newest_first() {
        let store = FlowStore::open_in_memory().unwrap();
        store.insert(&record("2024-01-01 10:00:05", "198.51.100.1", None)).unwrap();
        store.insert(&record("2024-01-01 10:00:09", "198.51.100.2", None)).unwrap();
        store.insert(&record("2024-01-01 10:00:01", "198.51.100.3", None)).unwrap();
        // Same second as the first, inserted later.
        store.insert(&record("2024-01-01 10:00:05", "198.51.100.4", None)).unwrap();

        let dsts: Vec<String> = store
            .query(&FlowFilter::any(), 10)
            .unwrap()
            .iter()
            .map(|r| r.dst.to_string())
            .collect();
        assert_eq!(
            dsts,
            vec!["198.51.100.2", "198.51.100.4", "198.51.100.1", "198.51.100.3"]
        );

        assert_eq!(store.query(&FlowFilter::any(), 2).unwrap().len(), 2);
    }

    #[test]
    fn test_query_by_asn() {
        let store = FlowStore::open_in_memory().unwrap();
        store
            .insert(&owned(record("2024-01-01 10:00:00", "8.8.8.8", None), 15169))
            .unwrap();
        store
            .insert(&owned(record("2024-01-01 10:00:01", "1.1.1.1", None), 13335))
            .unwrap();
        store.insert(&record("2024-01-01 10:00:02", "9.9.9.9", None)).unwrap();

        let google = store.query(&FlowFilter::asns([15169]), 10).unwrap();
        assert_eq!(google.len(), 1);
        assert_eq!(google[0].org(), Some("AS-15169"));

        assert_eq!(store.query(&FlowFilter::asns([15169, 13335]), 10).unwrap().len(), 2);
        assert!(store.query(&FlowFilter::asns([]), 10).unwrap().is_empty());
        assert_eq!(store.query(&FlowFilter::any(), 10).unwrap().len(), 3);
    }

    #[test]
    fn test_pairs_survive_storage() {
        let store = FlowStore::open_in_memory().unwrap();
        let mut r = owned(record("2024-01-01 10:00:00", "8.8.8.8", Some(7)), 15169);
        r.location = Some(GeoPoint {
            latitude: 37.751,
            longitude: -97.822,
        });
        r.exe = Some("/usr/bin/teredo-client".into());
        store.insert(&r).unwrap();

        assert_eq!(store.query(&FlowFilter::any(), 1).unwrap(), vec![r]);
    }

    #[test]
    fn test_half_pairs_are_rejected_by_schema() {
        let store = FlowStore::open_in_memory().unwrap();
        let conn = store.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO flows (timestamp, src, dst, asn) VALUES ('2024-01-01 10:00:00', 'a', 'b', 1)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_concurrent_duplicate_inserts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlowStore::open(dir.path().join("flows.db")).unwrap();
        let r = record("2024-01-01 10:00:00", "203.0.113.9", Some(4321));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let r = r.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    store.insert(&r).unwrap()
                })
            })
            .collect();
        let outcomes: Vec<InsertOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let inserted = outcomes
            .iter()
            .filter(|&&o| o == InsertOutcome::Inserted)
            .count();
        assert_eq!(inserted, 1);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_reopen_keeps_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flows.db");
        {
            let store = FlowStore::open(&path).unwrap();
            store.insert(&record("2024-01-01 10:00:00", "8.8.8.8", None)).unwrap();
        }
        let store = FlowStore::open(&path).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_async_wrappers() {
        let store = FlowStore::open_in_memory().unwrap();
        let r = record("2024-01-01 10:00:00", "8.8.8.8", None);
        assert_eq!(store.save(r.clone()).await.unwrap(), InsertOutcome::Inserted);
        assert!(store.has(r.key()).await.unwrap());
        assert_eq!(store.recent(FlowFilter::any(), 5).await.unwrap().len(), 1);
    }
}
