//! Mutually exclusive assignment of orders to kitchen workers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::error::ErrorKind;
use crate::metrics;
use crate::order::{Order, OrderStore, OrderType, StatusChange, StoreError};
use crate::worker::WorkerError;

const DEFAULT_BATCH_SIZE: usize = 10;

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] WorkerError),
}

impl ClaimError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClaimError::Store(e) => e.kind(),
            ClaimError::Registry(e) => e.kind(),
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            ClaimError::Store(e) => e.is_transient(),
            ClaimError::Registry(e) => e.is_transient(),
        }
    }
}

/// What a worker is able to take on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCapabilities {
    pub order_types: Vec<OrderType>,
}

impl WorkerCapabilities {
    pub fn new(order_types: Vec<OrderType>) -> Self {
        Self { order_types }
    }

    pub fn all() -> Self {
        Self::new(OrderType::ALL.to_vec())
    }
}

impl Default for WorkerCapabilities {
    fn default() -> Self {
        Self::all()
    }
}

/// Why an order goes back to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseReason {
    /// The holder stopped heartbeating.
    WorkerTimeout { worker: String, silent_for: Duration },
    /// The holder is shutting down.
    Shutdown,
    /// The holder could not finish the order.
    Failure(String),
}

impl ReleaseReason {
    /// Low-cardinality metrics label.
    pub fn label(&self) -> &'static str {
        match self {
            ReleaseReason::WorkerTimeout { .. } => "worker_timeout",
            ReleaseReason::Shutdown => "shutdown",
            ReleaseReason::Failure(_) => "failure",
        }
    }
}

impl fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseReason::WorkerTimeout { worker, silent_for } => write!(
                f,
                "worker_timeout: no heartbeat from {} for {}s",
                worker,
                silent_for.as_secs()
            ),
            ReleaseReason::Shutdown => f.write_str("worker shutdown"),
            ReleaseReason::Failure(reason) => write!(f, "processing failed: {}", reason),
        }
    }
}

/// Hands out pending orders so that each is held by at most one worker.
///
/// Exclusivity comes from the store's conditional claim write, not from any
/// lock in this process, so coordinators in different processes can compete
/// for the same orders.
#[derive(Clone)]
pub struct ClaimCoordinator {
    store: Arc<dyn OrderStore>,
    batch_size: usize,
}

impl ClaimCoordinator {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Claim the highest-priority, oldest eligible order for `worker`.
    ///
    /// Returns `Ok(None)` when nothing is eligible.
    pub fn claim_next(
        &self,
        worker: &str,
        capabilities: &WorkerCapabilities,
    ) -> Result<Option<Order>, ClaimError> {
        // Losing every candidate means others drained them; read a fresh batch.
        loop {
            let candidates = self
                .store
                .claim_candidates(&capabilities.order_types, self.batch_size)?;
            if candidates.is_empty() {
                break;
            }

            for candidate in candidates {
                match self.store.try_claim(candidate.id, worker)? {
                    Some(order) => {
                        metrics::CLAIMS.with_label_values(&["claimed"]).inc();
                        info!(
                            action = "claim",
                            order_id = order.id,
                            order_number = order.number,
                            worker,
                            "Order claimed"
                        );
                        return Ok(Some(order));
                    }
                    None => {
                        metrics::CLAIMS.with_label_values(&["conflict"]).inc();
                        debug!(order_id = candidate.id, worker, "Lost claim race, trying next");
                    }
                }
            }
        }

        metrics::CLAIMS.with_label_values(&["empty"]).inc();
        Ok(None)
    }

    /// Send an order held by `worker` back to `received`.
    ///
    /// Returns `Ok(None)` when `worker` no longer holds it.
    pub fn release(
        &self,
        order_id: i64,
        worker: &str,
        reason: &ReleaseReason,
    ) -> Result<Option<StatusChange>, ClaimError> {
        let released = self.store.release(order_id, worker, &reason.to_string())?;

        if released.is_some() {
            metrics::RELEASES.with_label_values(&[reason.label()]).inc();
            info!(
                action = "release",
                order_id,
                worker,
                reason = %reason,
                "Order released back to queue"
            );
        }

        Ok(released)
    }
}
