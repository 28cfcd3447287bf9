//! SQLite-backed message log, shared by every process on the same file.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::log::{BrokerError, LogRecord, MessageLog};
use crate::db::{self, format_ts};

pub struct SqliteMessageLog {
    conn: Mutex<Connection>,
}

impl SqliteMessageLog {
    pub fn new(path: &Path) -> Result<Self, BrokerError> {
        Self::with_busy_timeout(path, db::DEFAULT_BUSY_TIMEOUT)
    }

    pub fn with_busy_timeout(path: &Path, busy_timeout: Duration) -> Result<Self, BrokerError> {
        let conn = db::open(path, busy_timeout)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, BrokerError> {
        let conn = db::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), BrokerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS broker_messages (
                "offset" INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                payload BLOB NOT NULL,
                appended_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_broker_messages_topic
                ON broker_messages(topic, "offset");

            CREATE TABLE IF NOT EXISTS broker_offsets (
                group_name TEXT NOT NULL,
                topic TEXT NOT NULL,
                committed_offset INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (group_name, topic)
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, BrokerError> {
        self.conn
            .lock()
            .map_err(|_| BrokerError::Storage("connection mutex poisoned".to_string()))
    }
}

impl MessageLog for SqliteMessageLog {
    fn append(&self, topic: &str, payload: &[u8]) -> Result<i64, BrokerError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO broker_messages (topic, payload, appended_at) VALUES (?, ?, ?)",
            params![topic, payload, format_ts(&Utc::now())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn read_after(
        &self,
        topic: &str,
        after: i64,
        limit: usize,
    ) -> Result<Vec<LogRecord>, BrokerError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT "offset", topic, payload, appended_at FROM broker_messages
               WHERE topic = ? AND "offset" > ? ORDER BY "offset" ASC LIMIT ?"#,
        )?;
        let records = stmt
            .query_map(params![topic, after, limit as i64], |row| {
                let appended_at: String = row.get(3)?;
                Ok(LogRecord {
                    offset: row.get(0)?,
                    topic: row.get(1)?,
                    payload: row.get(2)?,
                    appended_at: db::parse_ts(3, &appended_at)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn latest_offset(&self, topic: &str) -> Result<i64, BrokerError> {
        let conn = self.conn()?;
        let latest: i64 = conn.query_row(
            r#"SELECT COALESCE(MAX("offset"), 0) FROM broker_messages WHERE topic = ?"#,
            params![topic],
            |row| row.get(0),
        )?;
        Ok(latest)
    }

    fn committed_offset(&self, group: &str, topic: &str) -> Result<i64, BrokerError> {
        let conn = self.conn()?;
        let committed: Option<i64> = conn
            .query_row(
                "SELECT committed_offset FROM broker_offsets WHERE group_name = ? AND topic = ?",
                params![group, topic],
                |row| row.get(0),
            )
            .optional()?;
        Ok(committed.unwrap_or(0))
    }

    fn commit_offset(&self, group: &str, topic: &str, offset: i64) -> Result<(), BrokerError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO broker_offsets (group_name, topic, committed_offset, updated_at) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(group_name, topic) DO UPDATE SET \
             committed_offset = MAX(committed_offset, excluded.committed_offset), \
             updated_at = excluded.updated_at",
            params![group, topic, offset, format_ts(&Utc::now())],
        )?;
        Ok(())
    }

    fn drop_group(&self, group: &str, topic: &str) -> Result<(), BrokerError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM broker_offsets WHERE group_name = ? AND topic = ?",
            params![group, topic],
        )?;
        Ok(())
    }

    fn prune_consumed(&self, cutoff: DateTime<Utc>) -> Result<usize, BrokerError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            r#"DELETE FROM broker_messages
               WHERE appended_at < ?1
                 AND "offset" <= (SELECT MIN(o.committed_offset) FROM broker_offsets o
                                  WHERE o.topic = broker_messages.topic)
                 AND "offset" < (SELECT MAX(m."offset") FROM broker_messages m
                                 WHERE m.topic = broker_messages.topic)"#,
            params![format_ts(&cutoff)],
        )?;
        Ok(deleted)
    }
}
