//! Configuration for kitchen workers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::order::{OrderStatus, OrderType};
use crate::retry::RetryPolicy;

/// Configuration for a kitchen worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KitchenConfig {
    /// Unique worker name. Generated when unset.
    #[serde(default)]
    pub worker_name: Option<String>,

    /// Order types this worker accepts.
    #[serde(default = "default_order_types")]
    pub order_types: Vec<OrderType>,

    /// Heartbeat interval in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Fallback claim poll interval when no order.created hint arrives.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Time spent preparing before the oven.
    #[serde(default = "default_prep")]
    pub prep_ms: u64,

    /// Time in the oven.
    #[serde(default = "default_bake")]
    pub bake_ms: u64,

    /// Time on the road for delivery orders.
    #[serde(default = "default_delivery")]
    pub delivery_ms: u64,

    /// Upper bound for a single store step.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,

    /// Candidates read per claim attempt.
    #[serde(default = "default_claim_batch")]
    pub claim_batch_size: usize,

    /// Retry policy for transient store errors.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_order_types() -> Vec<OrderType> {
    OrderType::ALL.to_vec()
}

fn default_heartbeat_interval() -> u64 {
    10_000
}

fn default_poll_interval() -> u64 {
    1_000
}

fn default_prep() -> u64 {
    3_000
}

fn default_bake() -> u64 {
    5_000
}

fn default_delivery() -> u64 {
    4_000
}

fn default_store_timeout() -> u64 {
    5_000
}

fn default_claim_batch() -> usize {
    10
}

impl Default for KitchenConfig {
    fn default() -> Self {
        Self {
            worker_name: None,
            order_types: default_order_types(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            poll_interval_ms: default_poll_interval(),
            prep_ms: default_prep(),
            bake_ms: default_bake(),
            delivery_ms: default_delivery(),
            store_timeout_ms: default_store_timeout(),
            claim_batch_size: default_claim_batch(),
            retry: RetryPolicy::default(),
        }
    }
}

impl KitchenConfig {
    /// Sets the worker name.
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = Some(name.into());
        self
    }

    /// Restricts the accepted order types.
    pub fn with_order_types(mut self, order_types: Vec<OrderType>) -> Self {
        self.order_types = order_types;
        self
    }

    /// Sets every preparation timing at once.
    pub fn with_timings(mut self, prep_ms: u64, bake_ms: u64, delivery_ms: u64) -> Self {
        self.prep_ms = prep_ms;
        self.bake_ms = bake_ms;
        self.delivery_ms = delivery_ms;
        self
    }

    /// The configured name, or a fresh `kitchen-xxxxxxxx`.
    pub fn resolved_worker_name(&self) -> String {
        match self.worker_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                let id = uuid::Uuid::new_v4().simple().to_string();
                format!("kitchen-{}", &id[..8])
            }
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// How long the kitchen works on an order in `current` before moving it on.
    pub fn step_delay(&self, current: OrderStatus) -> Duration {
        let ms = match current {
            OrderStatus::Preparing => self.prep_ms + self.bake_ms,
            OrderStatus::OutForDelivery => self.delivery_ms,
            _ => 0,
        };
        Duration::from_millis(ms)
    }
}
