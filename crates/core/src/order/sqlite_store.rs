//! SQLite-backed order store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::state_machine::{validate_release, validate_transition, TransitionError};
use super::{
    CreateOrderRequest, Destination, Order, OrderDetails, OrderFilter, OrderItem, OrderStatus,
    OrderStore, OrderType, StatusChange, StatusLogEntry, StoreError, TransitionRequest,
};
use crate::db::{self, format_ts};

const ORDER_COLUMNS: &str = "id, number, customer_name, type, table_number, delivery_address, \
     total_amount, priority, status, processed_by, completed_at, created_at, updated_at";

/// SQLite-backed order store.
pub struct SqliteOrderStore {
    conn: Mutex<Connection>,
}

impl SqliteOrderStore {
    /// Open (or create) the database file and its order tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        Self::with_busy_timeout(path, db::DEFAULT_BUSY_TIMEOUT)
    }

    /// Open the database with a custom bound on lock waits.
    pub fn with_busy_timeout(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = db::open(path, busy_timeout)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = db::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                number INTEGER NOT NULL UNIQUE,
                customer_name TEXT NOT NULL,
                type TEXT NOT NULL CHECK (type IN ('dine_in', 'delivery')),
                table_number INTEGER,
                delivery_address TEXT,
                total_amount TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'received',
                processed_by TEXT,
                completed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                CHECK (
                    (type = 'dine_in' AND table_number IS NOT NULL AND delivery_address IS NULL)
                    OR (type = 'delivery' AND delivery_address IS NOT NULL AND table_number IS NULL)
                )
            );

            CREATE INDEX IF NOT EXISTS idx_orders_claim
                ON orders(status, priority DESC, created_at ASC);
            CREATE INDEX IF NOT EXISTS idx_orders_processed_by ON orders(processed_by);

            CREATE TABLE IF NOT EXISTS order_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                price TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_order_items_order_id ON order_items(order_id);

            CREATE TABLE IF NOT EXISTS order_status_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
                status TEXT NOT NULL,
                changed_by TEXT,
                notes TEXT,
                changed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_order_status_log_order_id
                ON order_status_log(order_id);
            "#,
        )?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    fn build_where_clause(filter: &OrderFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(order_type) = filter.order_type {
            conditions.push("type = ?");
            params.push(Box::new(order_type.as_str()));
        }

        if let Some(ref worker) = filter.processed_by {
            conditions.push("processed_by = ?");
            params.push(Box::new(worker.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_order(row: &rusqlite::Row) -> rusqlite::Result<Order> {
        let order_type: String = row.get(3)?;
        let order_type: OrderType = db::parse_column(3, &order_type)?;
        let table_number: Option<u32> = row.get(4)?;
        let address: Option<String> = row.get(5)?;

        let destination = match (order_type, table_number, address) {
            (OrderType::DineIn, Some(table_number), None) => Destination::DineIn { table_number },
            (OrderType::Delivery, None, Some(address)) => Destination::Delivery { address },
            _ => {
                return Err(rusqlite::Error::InvalidColumnType(
                    4,
                    "destination".to_string(),
                    Type::Null,
                ))
            }
        };

        let total_amount: String = row.get(6)?;
        let status: String = row.get(8)?;
        let completed_at: Option<String> = row.get(10)?;
        let created_at: String = row.get(11)?;
        let updated_at: String = row.get(12)?;

        Ok(Order {
            id: row.get(0)?,
            number: row.get(1)?,
            customer_name: row.get(2)?,
            destination,
            total_amount: db::parse_column(6, &total_amount)?,
            priority: row.get(7)?,
            status: db::parse_column(8, &status)?,
            processed_by: row.get(9)?,
            completed_at: db::parse_opt_ts(10, completed_at)?,
            created_at: db::parse_ts(11, &created_at)?,
            updated_at: db::parse_ts(12, &updated_at)?,
        })
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<OrderItem> {
        let price: String = row.get(4)?;
        let created_at: String = row.get(5)?;

        Ok(OrderItem {
            id: row.get(0)?,
            order_id: row.get(1)?,
            name: row.get(2)?,
            quantity: row.get(3)?,
            price: db::parse_column(4, &price)?,
            created_at: db::parse_ts(5, &created_at)?,
        })
    }

    fn row_to_log_entry(row: &rusqlite::Row) -> rusqlite::Result<StatusLogEntry> {
        let status: String = row.get(2)?;
        let changed_at: String = row.get(5)?;

        Ok(StatusLogEntry {
            id: row.get(0)?,
            order_id: row.get(1)?,
            status: db::parse_column(2, &status)?,
            changed_by: row.get(3)?,
            notes: row.get(4)?,
            changed_at: db::parse_ts(5, &changed_at)?,
        })
    }

    fn load_order(conn: &Connection, id: i64) -> Result<Option<Order>, StoreError> {
        let order = conn
            .query_row(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"),
                params![id],
                Self::row_to_order,
            )
            .optional()?;
        Ok(order)
    }

    fn require_order(conn: &Connection, id: i64) -> Result<Order, StoreError> {
        Self::load_order(conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn load_items(conn: &Connection, order_id: i64) -> Result<Vec<OrderItem>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, order_id, name, quantity, price, created_at FROM order_items WHERE order_id = ? ORDER BY id ASC",
        )?;
        let items = stmt
            .query_map(params![order_id], Self::row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn load_history(conn: &Connection, order_id: i64) -> Result<Vec<StatusLogEntry>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, order_id, status, changed_by, notes, changed_at FROM order_status_log WHERE order_id = ? ORDER BY id ASC",
        )?;
        let history = stmt
            .query_map(params![order_id], Self::row_to_log_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(history)
    }

    fn insert_log(
        conn: &Connection,
        order_id: i64,
        status: OrderStatus,
        changed_by: Option<&str>,
        notes: Option<&str>,
        changed_at: &DateTime<Utc>,
    ) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO order_status_log (order_id, status, changed_by, notes, changed_at) VALUES (?, ?, ?, ?, ?)",
            params![
                order_id,
                status.as_str(),
                changed_by,
                notes,
                format_ts(changed_at)
            ],
        )?;
        Ok(())
    }

    fn query_orders(
        conn: &Connection,
        sql: &str,
        params: Vec<Box<dyn rusqlite::ToSql>>,
    ) -> Result<Vec<Order>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let orders = stmt
            .query_map(param_refs.as_slice(), Self::row_to_order)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orders)
    }
}

impl OrderStore for SqliteOrderStore {
    fn create(&self, request: CreateOrderRequest) -> Result<OrderDetails, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let now = Utc::now();
        let number: i64 =
            tx.query_row("SELECT COALESCE(MAX(number), 0) + 1 FROM orders", [], |row| {
                row.get(0)
            })?;

        tx.execute(
            "INSERT INTO orders (number, customer_name, type, table_number, delivery_address, total_amount, priority, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'received', ?8, ?8)",
            params![
                number,
                request.customer_name,
                request.destination.order_type().as_str(),
                request.destination.table_number(),
                request.destination.address(),
                request.total_amount.to_string(),
                request.priority,
                format_ts(&now),
            ],
        )?;
        let order_id = tx.last_insert_rowid();

        for item in &request.items {
            tx.execute(
                "INSERT INTO order_items (order_id, name, quantity, price, created_at) VALUES (?, ?, ?, ?, ?)",
                params![
                    order_id,
                    item.name,
                    item.quantity,
                    item.price.to_string(),
                    format_ts(&now)
                ],
            )?;
        }

        Self::insert_log(
            &tx,
            order_id,
            OrderStatus::Received,
            Some(&request.created_by),
            None,
            &now,
        )?;

        let details = OrderDetails {
            order: Self::require_order(&tx, order_id)?,
            items: Self::load_items(&tx, order_id)?,
            history: Self::load_history(&tx, order_id)?,
        };

        tx.commit()?;
        Ok(details)
    }

    fn get(&self, id: i64) -> Result<Option<Order>, StoreError> {
        let conn = self.conn()?;
        Self::load_order(&conn, id)
    }

    fn get_by_number(&self, number: i64) -> Result<Option<Order>, StoreError> {
        let conn = self.conn()?;
        let order = conn
            .query_row(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE number = ?"),
                params![number],
                Self::row_to_order,
            )
            .optional()?;
        Ok(order)
    }

    fn items(&self, order_id: i64) -> Result<Vec<OrderItem>, StoreError> {
        let conn = self.conn()?;
        Self::load_items(&conn, order_id)
    }

    fn history(&self, order_id: i64) -> Result<Vec<StatusLogEntry>, StoreError> {
        let conn = self.conn()?;
        Self::load_history(&conn, order_id)
    }

    fn details(&self, id: i64) -> Result<Option<OrderDetails>, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;

        let Some(order) = Self::load_order(&tx, id)? else {
            return Ok(None);
        };
        let details = OrderDetails {
            items: Self::load_items(&tx, id)?,
            history: Self::load_history(&tx, id)?,
            order,
        };

        tx.commit()?;
        Ok(Some(details))
    }

    fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let conn = self.conn()?;
        let (where_clause, mut params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders {where_clause} ORDER BY priority DESC, created_at ASC, id ASC LIMIT ? OFFSET ?"
        );
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        Self::query_orders(&conn, &sql, params)
    }

    fn count(&self, filter: &OrderFilter) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!("SELECT COUNT(*) FROM orders {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    fn transition(&self, request: TransitionRequest) -> Result<StatusChange, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = Self::require_order(&tx, request.order_id)?;

        if let Some(ref owner) = request.expected_owner {
            if current.processed_by.as_deref() != Some(owner.as_str()) {
                return Err(StoreError::Conflict {
                    order_id: current.id,
                    reason: format!(
                        "held by {}, not {}",
                        current.processed_by.as_deref().unwrap_or("nobody"),
                        owner
                    ),
                });
            }
        }

        if current.status == OrderStatus::Received && request.to == OrderStatus::Preparing {
            return Err(TransitionError::RequiresClaim.into());
        }
        validate_transition(current.status, request.to, current.order_type())?;

        let now = Utc::now();
        let completed_at = (request.to == OrderStatus::Completed).then(|| format_ts(&now));

        let changed = tx.execute(
            "UPDATE orders SET status = ?1, updated_at = ?2, completed_at = COALESCE(?3, completed_at) WHERE id = ?4 AND status = ?5",
            params![
                request.to.as_str(),
                format_ts(&now),
                completed_at,
                current.id,
                current.status.as_str()
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::Conflict {
                order_id: current.id,
                reason: format!("status is no longer {}", current.status),
            });
        }

        Self::insert_log(
            &tx,
            current.id,
            request.to,
            request.changed_by.as_deref(),
            request.notes.as_deref(),
            &now,
        )?;

        let order = Self::require_order(&tx, current.id)?;
        tx.commit()?;
        Ok(StatusChange {
            order,
            from: current.status,
        })
    }

    fn claim_candidates(
        &self,
        order_types: &[OrderType],
        limit: usize,
    ) -> Result<Vec<Order>, StoreError> {
        if order_types.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let placeholders = vec!["?"; order_types.len()].join(", ");
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = 'received' AND processed_by IS NULL AND type IN ({placeholders}) ORDER BY priority DESC, created_at ASC, id ASC LIMIT ?"
        );

        let mut params: Vec<Box<dyn rusqlite::ToSql>> = order_types
            .iter()
            .map(|t| Box::new(t.as_str()) as Box<dyn rusqlite::ToSql>)
            .collect();
        params.push(Box::new(limit as i64));

        Self::query_orders(&conn, &sql, params)
    }

    fn try_claim(&self, order_id: i64, worker: &str) -> Result<Option<Order>, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now();

        let changed = tx.execute(
            "UPDATE orders SET status = 'preparing', processed_by = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'received' AND processed_by IS NULL",
            params![worker, format_ts(&now), order_id],
        )?;
        if changed == 0 {
            return Ok(None);
        }

        Self::insert_log(
            &tx,
            order_id,
            OrderStatus::Preparing,
            Some(worker),
            Some("claimed"),
            &now,
        )?;

        let order = Self::require_order(&tx, order_id)?;
        tx.commit()?;
        Ok(Some(order))
    }

    fn release(
        &self,
        order_id: i64,
        worker: &str,
        reason: &str,
    ) -> Result<Option<StatusChange>, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = Self::require_order(&tx, order_id)?;
        if current.processed_by.as_deref() != Some(worker) {
            return Ok(None);
        }
        if let Err(e) = validate_release(current.status) {
            tracing::debug!(order_id, worker, "Skipping release: {}", e);
            return Ok(None);
        }

        let now = Utc::now();
        let changed = tx.execute(
            "UPDATE orders SET status = 'received', processed_by = NULL, updated_at = ?1 WHERE id = ?2 AND processed_by = ?3 AND status IN ('preparing', 'ready', 'out_for_delivery')",
            params![format_ts(&now), order_id, worker],
        )?;
        if changed == 0 {
            return Ok(None);
        }

        Self::insert_log(
            &tx,
            order_id,
            OrderStatus::Received,
            Some(worker),
            Some(reason),
            &now,
        )?;

        let order = Self::require_order(&tx, order_id)?;
        tx.commit()?;
        Ok(Some(StatusChange {
            order,
            from: current.status,
        }))
    }

    fn claimed_by(&self, worker: &str) -> Result<Vec<Order>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE processed_by = ? AND status IN ('preparing', 'ready', 'out_for_delivery') ORDER BY id ASC"
        );
        Self::query_orders(&conn, &sql, vec![Box::new(worker.to_string())])
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::order::{state_machine::validate_history, NewOrderItem};

    fn create_test_store() -> SqliteOrderStore {
        SqliteOrderStore::in_memory().unwrap()
    }

    fn dine_in_request(priority: i32) -> CreateOrderRequest {
        CreateOrderRequest {
            customer_name: "Mario".to_string(),
            destination: Destination::DineIn { table_number: 4 },
            items: vec![NewOrderItem::new("Margherita", 1, Decimal::new(950, 2))],
            total_amount: Decimal::new(950, 2),
            priority,
            created_by: "order-service".to_string(),
        }
    }

    fn delivery_request() -> CreateOrderRequest {
        CreateOrderRequest {
            customer_name: "Luigi".to_string(),
            destination: Destination::Delivery {
                address: "1 Mushroom Way, Toad Town".to_string(),
            },
            items: vec![
                NewOrderItem::new("Diavola", 2, Decimal::new(1200, 2)),
                NewOrderItem::new("Cola", 2, Decimal::new(250, 2)),
            ],
            total_amount: Decimal::new(2900, 2),
            priority: 1,
            created_by: "order-service".to_string(),
        }
    }

    #[test]
    fn test_create_order_with_items_and_log() {
        let store = create_test_store();
        let details = store.create(dine_in_request(1)).unwrap();

        assert_eq!(details.order.status, OrderStatus::Received);
        assert_eq!(details.order.number, 1);
        assert_eq!(details.order.processed_by, None);
        assert_eq!(details.order.completed_at, None);
        assert_eq!(details.items.len(), 2);
        assert_eq!(details.items[0].name, "Margherita");
        assert_eq!(details.items[0].price, Decimal::new(950, 2));
        assert_eq!(details.history.len(), 1);
        assert_eq!(details.history[0].status, OrderStatus::Received);
        assert_eq!(
            details.history[0].changed_by.as_deref(),
            Some("order-service")
        );
    }

    #[test]
    fn test_numbers_are_sequential() {
        let store = create_test_store();
        let first = store.create(dine_in_request(1)).unwrap();
        let second = store.create(delivery_request()).unwrap();
        assert_eq!(first.order.number, 1);
        assert_eq!(second.order.number, 2);

        let by_number = store.get_by_number(2).unwrap().unwrap();
        assert_eq!(by_number.id, second.order.id);
        assert_eq!(
            by_number.destination,
            Destination::Delivery {
                address: "1 Mushroom Way, Toad Town".to_string()
            }
        );
    }

    #[test]
    fn test_failed_create_leaves_nothing_behind() {
        let store = create_test_store();
        let mut request = dine_in_request(1);
        request
            .items
            .push(NewOrderItem::new("Ghost pizza", 0, Decimal::ONE));

        let result = store.create(request);
        assert!(result.is_err());

        assert_eq!(store.count(&OrderFilter::new()).unwrap(), 0);
        assert!(store.get(1).unwrap().is_none());
        assert!(store.items(1).unwrap().is_empty());
        assert!(store.history(1).unwrap().is_empty());
    }

    #[test]
    fn test_get_nonexistent_order() {
        let store = create_test_store();
        assert!(store.get(42).unwrap().is_none());
        assert!(store.get_by_number(42).unwrap().is_none());
    }

    #[test]
    fn test_claim_candidates_order_by_priority_then_age() {
        let store = create_test_store();
        let low = store.create(dine_in_request(1)).unwrap().order;
        let high = store.create(dine_in_request(10)).unwrap().order;
        let low_later = store.create(dine_in_request(1)).unwrap().order;

        let candidates = store.claim_candidates(&OrderType::ALL, 10).unwrap();
        let ids: Vec<i64> = candidates.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![high.id, low.id, low_later.id]);
    }

    #[test]
    fn test_claim_candidates_respects_order_types() {
        let store = create_test_store();
        store.create(dine_in_request(1)).unwrap();
        let delivery = store.create(delivery_request()).unwrap().order;

        let candidates = store
            .claim_candidates(&[OrderType::Delivery], 10)
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, delivery.id);
        assert!(store.claim_candidates(&[], 10).unwrap().is_empty());
    }

    #[test]
    fn test_try_claim_only_once() {
        let store = create_test_store();
        let order = store.create(dine_in_request(1)).unwrap().order;

        let claimed = store.try_claim(order.id, "kitchen-a").unwrap().unwrap();
        assert_eq!(claimed.status, OrderStatus::Preparing);
        assert_eq!(claimed.processed_by.as_deref(), Some("kitchen-a"));

        assert!(store.try_claim(order.id, "kitchen-b").unwrap().is_none());
        let history = store.history(order.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].changed_by.as_deref(), Some("kitchen-a"));
    }

    #[test]
    fn test_release_returns_order_to_queue() {
        let store = create_test_store();
        let order = store.create(dine_in_request(1)).unwrap().order;
        store.try_claim(order.id, "kitchen-a").unwrap().unwrap();

        assert!(store
            .release(order.id, "kitchen-b", "not mine")
            .unwrap()
            .is_none());

        let released = store
            .release(order.id, "kitchen-a", "oven broke")
            .unwrap()
            .unwrap();
        assert_eq!(released.order.status, OrderStatus::Received);
        assert_eq!(released.order.processed_by, None);
        assert_eq!(released.from, OrderStatus::Preparing);

        let history = store.history(order.id).unwrap();
        assert_eq!(history.last().unwrap().notes.as_deref(), Some("oven broke"));

        let reclaimed = store.try_claim(order.id, "kitchen-b").unwrap().unwrap();
        assert_eq!(reclaimed.processed_by.as_deref(), Some("kitchen-b"));
    }

    #[test]
    fn test_transition_happy_path_sets_completed_at() {
        let store = create_test_store();
        let order = store.create(dine_in_request(1)).unwrap().order;
        store.try_claim(order.id, "kitchen-a").unwrap().unwrap();

        let ready = store
            .transition(TransitionRequest::new(order.id, OrderStatus::Ready).owned_by("kitchen-a"))
            .unwrap();
        assert_eq!(ready.order.status, OrderStatus::Ready);
        assert_eq!(ready.from, OrderStatus::Preparing);
        assert!(ready.order.completed_at.is_none());

        let done = store
            .transition(
                TransitionRequest::new(order.id, OrderStatus::Completed).owned_by("kitchen-a"),
            )
            .unwrap();
        assert_eq!(done.order.status, OrderStatus::Completed);
        assert_eq!(done.from, OrderStatus::Ready);
        assert!(done.order.completed_at.is_some());

        let statuses: Vec<OrderStatus> = store
            .history(order.id)
            .unwrap()
            .iter()
            .map(|e| e.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                OrderStatus::Received,
                OrderStatus::Preparing,
                OrderStatus::Ready,
                OrderStatus::Completed
            ]
        );
        assert!(validate_history(OrderType::DineIn, &statuses).is_ok());
    }

    #[test]
    fn test_invalid_transition_writes_nothing() {
        let store = create_test_store();
        let order = store.create(dine_in_request(1)).unwrap().order;

        let result = store.transition(TransitionRequest::new(order.id, OrderStatus::Completed));
        assert!(matches!(
            result,
            Err(StoreError::Transition(
                TransitionError::InvalidTransition { .. }
            ))
        ));

        let fetched = store.get(order.id).unwrap().unwrap();
        assert_eq!(fetched.status, OrderStatus::Received);
        assert_eq!(store.history(order.id).unwrap().len(), 1);
    }

    #[test]
    fn test_preparing_requires_claim() {
        let store = create_test_store();
        let order = store.create(dine_in_request(1)).unwrap().order;

        let result = store.transition(TransitionRequest::new(order.id, OrderStatus::Preparing));
        assert!(matches!(
            result,
            Err(StoreError::Transition(TransitionError::RequiresClaim))
        ));
    }

    #[test]
    fn test_transition_checks_owner() {
        let store = create_test_store();
        let order = store.create(dine_in_request(1)).unwrap().order;
        store.try_claim(order.id, "kitchen-a").unwrap().unwrap();

        let result = store
            .transition(TransitionRequest::new(order.id, OrderStatus::Ready).owned_by("kitchen-b"));
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        assert_eq!(
            store.get(order.id).unwrap().unwrap().status,
            OrderStatus::Preparing
        );
    }

    #[test]
    fn test_delivery_cannot_skip_out_for_delivery() {
        let store = create_test_store();
        let order = store.create(delivery_request()).unwrap().order;
        store.try_claim(order.id, "kitchen-a").unwrap().unwrap();
        store
            .transition(TransitionRequest::new(order.id, OrderStatus::Ready).owned_by("kitchen-a"))
            .unwrap();

        let result = store.transition(
            TransitionRequest::new(order.id, OrderStatus::Completed).owned_by("kitchen-a"),
        );
        assert!(result.is_err());

        store
            .transition(
                TransitionRequest::new(order.id, OrderStatus::OutForDelivery)
                    .owned_by("kitchen-a"),
            )
            .unwrap();
        let done = store
            .transition(
                TransitionRequest::new(order.id, OrderStatus::Completed).owned_by("kitchen-a"),
            )
            .unwrap();
        assert_eq!(done.order.status, OrderStatus::Completed);
        assert_eq!(done.from, OrderStatus::OutForDelivery);
    }

    #[test]
    fn test_cancel_received_order() {
        let store = create_test_store();
        let order = store.create(dine_in_request(1)).unwrap().order;

        let cancelled = store
            .transition(
                TransitionRequest::new(order.id, OrderStatus::Cancelled)
                    .by("customer")
                    .with_notes("changed my mind"),
            )
            .unwrap();
        assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.from, OrderStatus::Received);

        assert!(store.try_claim(order.id, "kitchen-a").unwrap().is_none());
        assert!(store
            .claim_candidates(&OrderType::ALL, 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_details_reads_consistent_snapshot() {
        let store = create_test_store();
        let order = store.create(delivery_request()).unwrap().order;
        store.try_claim(order.id, "kitchen-a").unwrap().unwrap();
        store
            .transition(TransitionRequest::new(order.id, OrderStatus::Ready).owned_by("kitchen-a"))
            .unwrap();

        let details = store.details(order.id).unwrap().unwrap();
        assert_eq!(details.order.status, OrderStatus::Ready);
        assert_eq!(details.items.len(), 2);
        assert_eq!(
            details.history.last().map(|e| e.status),
            Some(details.order.status)
        );

        assert!(store.details(9999).unwrap().is_none());
    }

    #[test]
    fn test_transition_missing_order() {
        let store = create_test_store();
        let result = store.transition(TransitionRequest::new(99, OrderStatus::Cancelled));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_claimed_by_lists_held_orders() {
        let store = create_test_store();
        let a = store.create(dine_in_request(1)).unwrap().order;
        let b = store.create(dine_in_request(1)).unwrap().order;
        store.try_claim(a.id, "kitchen-a").unwrap().unwrap();
        store.try_claim(b.id, "kitchen-b").unwrap().unwrap();

        let held = store.claimed_by("kitchen-a").unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].id, a.id);
    }

    #[test]
    fn test_list_and_count_with_filters() {
        let store = create_test_store();
        store.create(dine_in_request(1)).unwrap();
        store.create(delivery_request()).unwrap();
        let claimed = store.create(dine_in_request(5)).unwrap().order;
        store.try_claim(claimed.id, "kitchen-a").unwrap();

        let received = OrderFilter::new().with_status(OrderStatus::Received);
        assert_eq!(store.count(&received).unwrap(), 2);
        assert_eq!(store.list(&received).unwrap().len(), 2);

        let deliveries = OrderFilter::new().with_order_type(OrderType::Delivery);
        assert_eq!(store.count(&deliveries).unwrap(), 1);

        let by_worker = OrderFilter::new().with_processed_by("kitchen-a");
        assert_eq!(store.list(&by_worker).unwrap()[0].id, claimed.id);

        let page = store
            .list(&OrderFilter::new().with_limit(2).with_offset(2))
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn test_file_based_store_shares_state() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("orders.db");

        let writer = SqliteOrderStore::new(&db_path).unwrap();
        let order = writer.create(dine_in_request(1)).unwrap().order;

        assert!(db_path.exists());

        let reader = SqliteOrderStore::new(&db_path).unwrap();
        let fetched = reader.get(order.id).unwrap().unwrap();
        assert_eq!(fetched.customer_name, "Mario");
    }
}
