//! SQLite-backed worker registry.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::registry::{WorkerError, WorkerRegistry};
use super::types::{WorkerRecord, WorkerStatus, KITCHEN_WORKER_TYPE};
use crate::db::{self, format_ts};

const WORKER_COLUMNS: &str =
    "id, name, worker_type, status, last_seen, orders_processed, created_at";

pub struct SqliteWorkerRegistry {
    conn: Mutex<Connection>,
}

impl SqliteWorkerRegistry {
    pub fn new(path: &Path) -> Result<Self, WorkerError> {
        Self::with_busy_timeout(path, db::DEFAULT_BUSY_TIMEOUT)
    }

    pub fn with_busy_timeout(path: &Path, busy_timeout: Duration) -> Result<Self, WorkerError> {
        let conn = db::open(path, busy_timeout)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, WorkerError> {
        let conn = db::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), WorkerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS workers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                worker_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'online',
                last_seen TEXT NOT NULL,
                orders_processed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_workers_last_seen ON workers(last_seen);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, WorkerError> {
        self.conn
            .lock()
            .map_err(|_| WorkerError::Database("connection mutex poisoned".to_string()))
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<WorkerRecord> {
        let status: String = row.get(3)?;
        let last_seen: String = row.get(4)?;
        let created_at: String = row.get(6)?;

        Ok(WorkerRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            worker_type: row.get(2)?,
            status: db::parse_column(3, &status)?,
            last_seen: db::parse_ts(4, &last_seen)?,
            orders_processed: row.get(5)?,
            created_at: db::parse_ts(6, &created_at)?,
        })
    }

    fn load(conn: &Connection, name: &str) -> Result<Option<WorkerRecord>, WorkerError> {
        let record = conn
            .query_row(
                &format!("SELECT {WORKER_COLUMNS} FROM workers WHERE name = ?"),
                params![name],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }
}

impl WorkerRegistry for SqliteWorkerRegistry {
    fn register(
        &self,
        name: &str,
        worker_type: &str,
        liveness_window: Duration,
    ) -> Result<WorkerRecord, WorkerError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now();

        if let Some(existing) = Self::load(&tx, name)? {
            if existing.status != WorkerStatus::Offline && existing.is_live(now, liveness_window) {
                return Err(WorkerError::AlreadyOnline(name.to_string()));
            }
        }

        tx.execute(
            "INSERT INTO workers (name, worker_type, status, last_seen, orders_processed, created_at) \
             VALUES (?1, ?2, 'online', ?3, 0, ?3) \
             ON CONFLICT(name) DO UPDATE SET worker_type = excluded.worker_type, status = 'online', last_seen = excluded.last_seen",
            params![name, worker_type, format_ts(&now)],
        )?;

        let record = Self::load(&tx, name)?.ok_or_else(|| WorkerError::NotFound(name.to_string()))?;
        tx.commit()?;
        Ok(record)
    }

    fn heartbeat_at(&self, name: &str, at: DateTime<Utc>) -> Result<(), WorkerError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO workers (name, worker_type, status, last_seen, orders_processed, created_at) \
             VALUES (?1, ?2, 'online', ?3, 0, ?3) \
             ON CONFLICT(name) DO UPDATE SET last_seen = excluded.last_seen, \
             status = CASE WHEN workers.status = 'offline' THEN 'online' ELSE workers.status END",
            params![name, KITCHEN_WORKER_TYPE, format_ts(&at)],
        )?;
        Ok(())
    }

    fn set_status(&self, name: &str, status: WorkerStatus) -> Result<(), WorkerError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE workers SET status = ? WHERE name = ?",
            params![status.as_str(), name],
        )?;
        if changed == 0 {
            return Err(WorkerError::NotFound(name.to_string()));
        }
        Ok(())
    }

    fn record_completion(&self, name: &str) -> Result<(), WorkerError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE workers SET orders_processed = orders_processed + 1, status = 'online' WHERE name = ?",
            params![name],
        )?;
        if changed == 0 {
            return Err(WorkerError::NotFound(name.to_string()));
        }
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<WorkerRecord>, WorkerError> {
        let conn = self.conn()?;
        Self::load(&conn, name)
    }

    fn list(&self) -> Result<Vec<WorkerRecord>, WorkerError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers ORDER BY name ASC"
        ))?;
        let records = stmt
            .query_map([], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<WorkerRecord>, WorkerError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers WHERE last_seen < ? ORDER BY last_seen ASC"
        ))?;
        let records = stmt
            .query_map(params![format_ts(&cutoff)], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}
