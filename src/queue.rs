//! Durable FIFO of not-yet-synced local mutations.
//!
//! Backed by SQLite so pending changes survive process restarts. Entries are
//! appended in arrival order, returned without removal by [`ChangeQueue::drain`],
//! and deleted only after the remote confirms them.

use crate::error::{StoreError, StoreResult};
use crate::types::{Change, ChangeEntry, ChangeOp, now_ms};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS pending_changes (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    op          TEXT NOT NULL,
    task_id     TEXT NOT NULL,
    task_json   TEXT,
    enqueued_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS sync_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Persistent change queue plus the sync high-water mark.
#[derive(Clone)]
pub struct ChangeQueue {
    conn: Arc<Mutex<Connection>>,
}

impl ChangeQueue {
    /// Open or create the queue database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA busy_timeout=5000;",
        )?;
        Self::init(conn)
    }

    /// Open an in-memory queue (for testing and ephemeral clients).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }

    /// Append a change to the tail, persisting immediately.
    pub fn append(&self, change: Change) -> StoreResult<ChangeEntry> {
        let enqueued_at = now_ms();
        let task_json = change
            .task
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO pending_changes (op, task_id, task_json, enqueued_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    change.op.as_str(),
                    change.task_id.to_string(),
                    task_json,
                    enqueued_at
                ],
            )?;
            Ok(ChangeEntry {
                id: conn.last_insert_rowid(),
                change: change.clone(),
                enqueued_at,
            })
        })
    }

    /// Current entries in FIFO order, without removing them.
    pub fn drain(&self) -> StoreResult<Vec<ChangeEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, op, task_id, task_json, enqueued_at
                 FROM pending_changes ORDER BY id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?;

            let mut entries = Vec::new();
            for row in rows {
                let (id, op, task_id, task_json, enqueued_at) = row?;
                let op: ChangeOp = op.parse()?;
                let task_id = Uuid::parse_str(&task_id)
                    .map_err(|e| StoreError::Validation(format!("bad task id in queue: {e}")))?;
                let task = task_json.map(|s| serde_json::from_str(&s)).transpose()?;
                entries.push(ChangeEntry {
                    id,
                    change: Change { op, task_id, task },
                    enqueued_at,
                });
            }
            Ok(entries)
        })
    }

    /// Remove entries confirmed by the remote.
    pub fn acknowledge(&self, entry_ids: &[i64]) -> StoreResult<usize> {
        if entry_ids.is_empty() {
            return Ok(0);
        }
        self.with_conn(|conn| {
            let mut removed = 0;
            for id in entry_ids {
                removed += conn.execute("DELETE FROM pending_changes WHERE id = ?1", params![id])?;
            }
            Ok(removed)
        })
    }

    pub fn len(&self) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM pending_changes", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Completion time of the last successful sync pass, 0 when never synced.
    pub fn last_sync_time(&self) -> StoreResult<i64> {
        self.with_conn(|conn| {
            let value: Option<String> = conn
                .query_row(
                    "SELECT value FROM sync_meta WHERE key = 'last_sync_time'",
                    [],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    e => Err(e),
                })?;
            Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
        })
    }

    pub fn set_last_sync_time(&self, timestamp_ms: i64) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sync_meta (key, value) VALUES ('last_sync_time', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![timestamp_ms.to_string()],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Quadrant, Task};

    #[test]
    fn entries_come_back_in_fifo_order() {
        let queue = ChangeQueue::open_in_memory().unwrap();
        let t1 = Task::new("first", Quadrant::UrgentImportant).unwrap();
        let t2 = Task::new("second", Quadrant::UrgentImportant).unwrap();

        queue.append(Change::create(t1.clone())).unwrap();
        queue.append(Change::update(t2.clone())).unwrap();
        queue.append(Change::delete(t1.id)).unwrap();

        let entries = queue.drain().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].change.op, ChangeOp::Create);
        assert_eq!(entries[1].change.op, ChangeOp::Update);
        assert_eq!(entries[2].change.op, ChangeOp::Delete);
        assert!(entries[0].id < entries[1].id && entries[1].id < entries[2].id);
    }

    #[test]
    fn drain_does_not_remove() {
        let queue = ChangeQueue::open_in_memory().unwrap();
        let t = Task::new("t", Quadrant::UrgentImportant).unwrap();
        queue.append(Change::create(t)).unwrap();

        assert_eq!(queue.drain().unwrap().len(), 1);
        assert_eq!(queue.drain().unwrap().len(), 1);
    }

    #[test]
    fn acknowledge_removes_only_confirmed_entries() {
        let queue = ChangeQueue::open_in_memory().unwrap();
        let t1 = Task::new("one", Quadrant::UrgentImportant).unwrap();
        let t2 = Task::new("two", Quadrant::UrgentImportant).unwrap();
        let e1 = queue.append(Change::create(t1)).unwrap();
        let e2 = queue.append(Change::create(t2)).unwrap();

        queue.acknowledge(&[e1.id]).unwrap();

        let remaining = queue.drain().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, e2.id);
    }

    #[test]
    fn queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        let t = Task::new("durable", Quadrant::NotUrgentImportant).unwrap();
        {
            let queue = ChangeQueue::open(&path).unwrap();
            queue.append(Change::create(t.clone())).unwrap();
            queue.set_last_sync_time(42).unwrap();
        }

        let queue = ChangeQueue::open(&path).unwrap();
        let entries = queue.drain().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].change.task_id, t.id);
        assert_eq!(queue.last_sync_time().unwrap(), 42);
    }

    #[test]
    fn last_sync_time_defaults_to_zero() {
        let queue = ChangeQueue::open_in_memory().unwrap();
        assert_eq!(queue.last_sync_time().unwrap(), 0);
        queue.set_last_sync_time(1000).unwrap();
        queue.set_last_sync_time(2000).unwrap();
        assert_eq!(queue.last_sync_time().unwrap(), 2000);
    }
}
