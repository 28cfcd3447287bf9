//! Idempotency receipts for notifications.
//!
//! A receipt is `pending` while its notification is being sent and
//! `delivered` once the notifier confirmed it. Only `delivered` receipts
//! make a redelivery a duplicate. A `pending` receipt older than the lease
//! belongs to a consumer that died mid-send and can be taken over.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::types::NotifyError;
use crate::db::{self, format_ts};
use crate::order::OrderStatus;

const PENDING: &str = "pending";
const DELIVERED: &str = "delivered";

/// Result of trying to reserve a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The caller owns the receipt and should send the notification.
    Acquired,
    /// Already sent.
    Delivered,
    /// Another consumer reserved it less than a lease ago.
    InFlight,
}

/// Tracks which `(order_id, status)` notifications were sent.
pub trait ReceiptStore: Send + Sync {
    /// Reserve the receipt as of `now`. A pending reservation older than
    /// `lease` is taken over.
    fn reserve_at(
        &self,
        order_id: i64,
        status: OrderStatus,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Reservation, NotifyError>;

    fn reserve(
        &self,
        order_id: i64,
        status: OrderStatus,
        lease: Duration,
    ) -> Result<Reservation, NotifyError> {
        self.reserve_at(order_id, status, lease, Utc::now())
    }

    /// Mark a reserved receipt as delivered.
    fn confirm(&self, order_id: i64, status: OrderStatus) -> Result<(), NotifyError>;

    /// Drop a pending receipt whose delivery failed. Delivered receipts stay.
    fn remove(&self, order_id: i64, status: OrderStatus) -> Result<(), NotifyError>;

    fn is_delivered(&self, order_id: i64, status: OrderStatus) -> Result<bool, NotifyError>;
}

pub struct SqliteReceiptStore {
    conn: Mutex<Connection>,
}

impl SqliteReceiptStore {
    pub fn new(path: &Path) -> Result<Self, NotifyError> {
        Self::with_busy_timeout(path, db::DEFAULT_BUSY_TIMEOUT)
    }

    pub fn with_busy_timeout(path: &Path, busy_timeout: Duration) -> Result<Self, NotifyError> {
        let conn = db::open(path, busy_timeout)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, NotifyError> {
        let conn = db::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), NotifyError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS notification_receipts (
                order_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                state TEXT NOT NULL CHECK (state IN ('pending', 'delivered')),
                reserved_at TEXT NOT NULL,
                delivered_at TEXT,
                PRIMARY KEY (order_id, status)
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, NotifyError> {
        self.conn
            .lock()
            .map_err(|_| NotifyError::Receipts("connection mutex poisoned".to_string()))
    }
}

impl ReceiptStore for SqliteReceiptStore {
    fn reserve_at(
        &self,
        order_id: i64,
        status: OrderStatus,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Reservation, NotifyError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<(String, String)> = tx
            .query_row(
                "SELECT state, reserved_at FROM notification_receipts WHERE order_id = ? AND status = ?",
                params![order_id, status.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let reservation = match existing {
            None => {
                tx.execute(
                    "INSERT INTO notification_receipts (order_id, status, state, reserved_at) VALUES (?, ?, ?, ?)",
                    params![order_id, status.as_str(), PENDING, format_ts(&now)],
                )?;
                Reservation::Acquired
            }
            Some((state, _)) if state == DELIVERED => Reservation::Delivered,
            Some((_, reserved_at)) => {
                let lease = chrono::Duration::from_std(lease)
                    .unwrap_or_else(|_| chrono::Duration::days(365));
                if reserved_at <= format_ts(&(now - lease)) {
                    tx.execute(
                        "UPDATE notification_receipts SET reserved_at = ? WHERE order_id = ? AND status = ?",
                        params![format_ts(&now), order_id, status.as_str()],
                    )?;
                    Reservation::Acquired
                } else {
                    Reservation::InFlight
                }
            }
        };

        tx.commit()?;
        Ok(reservation)
    }

    fn confirm(&self, order_id: i64, status: OrderStatus) -> Result<(), NotifyError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE notification_receipts SET state = ?, delivered_at = ? WHERE order_id = ? AND status = ?",
            params![DELIVERED, format_ts(&Utc::now()), order_id, status.as_str()],
        )?;
        Ok(())
    }

    fn remove(&self, order_id: i64, status: OrderStatus) -> Result<(), NotifyError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM notification_receipts WHERE order_id = ? AND status = ? AND state = ?",
            params![order_id, status.as_str(), PENDING],
        )?;
        Ok(())
    }

    fn is_delivered(&self, order_id: i64, status: OrderStatus) -> Result<bool, NotifyError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notification_receipts WHERE order_id = ? AND status = ? AND state = ?",
            params![order_id, status.as_str(), DELIVERED],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
