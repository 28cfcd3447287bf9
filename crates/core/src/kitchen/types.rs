//! Types for the kitchen worker.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::claim::ClaimError;
use crate::error::ErrorKind;
use crate::order::StoreError;
use crate::worker::WorkerError;

/// Errors that can occur while running a kitchen worker.
#[derive(Debug, Error)]
pub enum KitchenError {
    #[error("worker registry error: {0}")]
    Registry(#[from] WorkerError),

    #[error("order store error: {0}")]
    Store(#[from] StoreError),

    #[error("claim error: {0}")]
    Claim(#[from] ClaimError),

    /// A store step did not finish within `kitchen.store_timeout_ms`.
    #[error("store step timed out after {0:?}")]
    StoreTimeout(Duration),

    #[error("kitchen worker already running")]
    AlreadyRunning,

    #[error("internal error: {0}")]
    Internal(String),
}

impl KitchenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KitchenError::Registry(e) => e.kind(),
            KitchenError::Store(StoreError::Conflict { .. }) => ErrorKind::ClaimConflict,
            KitchenError::Store(e) => e.kind(),
            KitchenError::Claim(e) => e.kind(),
            KitchenError::StoreTimeout(_) => ErrorKind::StoreUnavailable,
            KitchenError::AlreadyRunning => ErrorKind::Validation,
            KitchenError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            KitchenError::Registry(e) => e.is_transient(),
            KitchenError::Store(e) => e.is_transient(),
            KitchenError::Claim(e) => e.is_transient(),
            _ => false,
        }
    }

    /// The order moved out from under the worker (cancelled, reaped, or
    /// reassigned). The worker drops it without releasing.
    pub fn is_lost_order(&self) -> bool {
        matches!(
            self,
            KitchenError::Store(
                StoreError::Conflict { .. } | StoreError::Transition(_) | StoreError::NotFound(_)
            )
        )
    }
}

/// Current status of a kitchen worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KitchenStatus {
    pub running: bool,
    pub worker_name: String,
    /// Order being worked on right now.
    pub current_order: Option<i64>,
    /// Orders completed by this process.
    pub orders_processed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{OrderStatus, OrderType, TransitionError};

    #[test]
    fn test_lost_order_classification() {
        let conflict = KitchenError::Store(StoreError::Conflict {
            order_id: 1,
            reason: "held by kitchen-b".to_string(),
        });
        assert!(conflict.is_lost_order());
        assert_eq!(conflict.kind(), ErrorKind::ClaimConflict);

        let cancelled = KitchenError::Store(StoreError::Transition(
            TransitionError::InvalidTransition {
                from: OrderStatus::Cancelled,
                to: OrderStatus::Ready,
                order_type: OrderType::DineIn,
            },
        ));
        assert!(cancelled.is_lost_order());

        let timeout = KitchenError::StoreTimeout(Duration::from_secs(5));
        assert!(!timeout.is_lost_order());
        assert_eq!(timeout.kind(), ErrorKind::StoreUnavailable);
    }

    #[test]
    fn test_status_serialization() {
        let status = KitchenStatus {
            running: true,
            worker_name: "kitchen-a".to_string(),
            current_order: Some(4),
            orders_processed: 2,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["worker_name"], "kitchen-a");
        assert_eq!(json["current_order"], 4);
    }
}
