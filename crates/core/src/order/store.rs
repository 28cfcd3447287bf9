//! Order storage trait and types.

use rust_decimal::Decimal;
use thiserror::Error;

use super::state_machine::TransitionError;
use super::types::{
    Destination, NewOrderItem, Order, OrderDetails, OrderItem, OrderStatus, OrderType,
    StatusChange, StatusLogEntry,
};
use crate::error::ErrorKind;

/// Error type for order store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Order not found.
    #[error("order not found: {0}")]
    NotFound(String),

    /// The state machine rejected the change; nothing was written.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The order changed under us (status moved on, or another worker owns it).
    #[error("order {order_id} changed concurrently: {reason}")]
    Conflict { order_id: i64, reason: String },

    /// Transient failure (lock contention, I/O). Safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Transition(_) => ErrorKind::InvalidTransition,
            StoreError::Conflict { .. } => ErrorKind::InvalidTransition,
            StoreError::Unavailable(_) => ErrorKind::StoreUnavailable,
            StoreError::Database(_) => ErrorKind::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if crate::db::is_transient(&err) {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Database(err.to_string())
        }
    }
}

/// A validated order ready to be persisted.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub customer_name: String,
    pub destination: Destination,
    pub items: Vec<NewOrderItem>,
    pub total_amount: Decimal,
    pub priority: i32,
    /// Actor recorded on the initial `received` log row.
    pub created_by: String,
}

/// A requested status change.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub order_id: i64,
    pub to: OrderStatus,
    pub changed_by: Option<String>,
    pub notes: Option<String>,
    /// When set, the change only applies while this worker holds the order.
    pub expected_owner: Option<String>,
}

impl TransitionRequest {
    pub fn new(order_id: i64, to: OrderStatus) -> Self {
        Self {
            order_id,
            to,
            changed_by: None,
            notes: None,
            expected_owner: None,
        }
    }

    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.changed_by = Some(actor.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Require that `worker` is still the order's processor.
    pub fn owned_by(mut self, worker: impl Into<String>) -> Self {
        let worker = worker.into();
        self.changed_by = Some(worker.clone());
        self.expected_owner = Some(worker);
        self
    }
}

/// Filter for querying orders.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub order_type: Option<OrderType>,
    pub processed_by: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl OrderFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_order_type(mut self, order_type: OrderType) -> Self {
        self.order_type = Some(order_type);
        self
    }

    pub fn with_processed_by(mut self, worker: impl Into<String>) -> Self {
        self.processed_by = Some(worker.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for order storage backends.
///
/// Each mutating method is one atomic unit: the order row change and its
/// status log row commit together or not at all.
pub trait OrderStore: Send + Sync {
    /// Persist an order, its items and the initial `received` log row.
    fn create(&self, request: CreateOrderRequest) -> Result<OrderDetails, StoreError>;

    fn get(&self, id: i64) -> Result<Option<Order>, StoreError>;

    fn get_by_number(&self, number: i64) -> Result<Option<Order>, StoreError>;

    fn items(&self, order_id: i64) -> Result<Vec<OrderItem>, StoreError>;

    /// Status log rows in chronological order.
    fn history(&self, order_id: i64) -> Result<Vec<StatusLogEntry>, StoreError>;

    /// Order, items and history read as one consistent snapshot.
    fn details(&self, id: i64) -> Result<Option<OrderDetails>, StoreError>;

    /// List orders, highest priority and oldest first.
    fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;

    fn count(&self, filter: &OrderFilter) -> Result<i64, StoreError>;

    /// Apply a state-machine-validated status change.
    fn transition(&self, request: TransitionRequest) -> Result<StatusChange, StoreError>;

    /// Unclaimed `received` orders of the given types in claim order.
    fn claim_candidates(
        &self,
        order_types: &[OrderType],
        limit: usize,
    ) -> Result<Vec<Order>, StoreError>;

    /// Conditionally claim one order for `worker`.
    ///
    /// Returns `Ok(None)` when the order is no longer claimable (another
    /// worker won the race, or it was cancelled).
    fn try_claim(&self, order_id: i64, worker: &str) -> Result<Option<Order>, StoreError>;

    /// Send an order held by `worker` back to `received`.
    ///
    /// Returns `Ok(None)` when `worker` does not hold the order anymore.
    fn release(
        &self,
        order_id: i64,
        worker: &str,
        reason: &str,
    ) -> Result<Option<StatusChange>, StoreError>;

    /// Non-terminal orders currently held by `worker`.
    fn claimed_by(&self, worker: &str) -> Result<Vec<Order>, StoreError>;
}
