//! Read models for order tracking.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::order::{Order, OrderItem, StatusLogEntry, StoreError};
use crate::worker::{WorkerError, WorkerHealth};

/// How a caller names an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderRef {
    Id(i64),
    /// The human-facing sequential number.
    Number(i64),
}

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderRef::Id(id) => write!(f, "id {}", id),
            OrderRef::Number(number) => write!(f, "number {}", number),
        }
    }
}

/// Everything known about one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderView {
    pub order: Order,
    pub items: Vec<OrderItem>,
    /// Chronological status log.
    pub history: Vec<StatusLogEntry>,
    /// Health of the worker in `processed_by`, if any.
    pub worker: Option<WorkerHealth>,
}

/// A page of orders plus the total matching the filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("order not found: {0}")]
    NotFound(OrderRef),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] WorkerError),
}

impl TrackingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackingError::NotFound(_) => ErrorKind::NotFound,
            TrackingError::Store(e) => e.kind(),
            TrackingError::Registry(e) => e.kind(),
        }
    }
}
