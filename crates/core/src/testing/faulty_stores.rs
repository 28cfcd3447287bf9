//! Store wrappers that delay or fail selected calls.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::order::{
    CreateOrderRequest, Order, OrderDetails, OrderFilter, OrderItem, OrderStore, OrderType,
    StatusChange, StatusLogEntry, StoreError, TransitionRequest,
};
use crate::worker::{WorkerError, WorkerRecord, WorkerRegistry, WorkerStatus};

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Order store that delegates to a real store, with injectable slowness and
/// failures.
///
/// # Example
///
/// ```rust,ignore
/// let store = Arc::new(FaultyOrderStore::new(Arc::new(SqliteOrderStore::in_memory()?)));
/// // try_claim commits, then takes 300ms to answer
/// store.set_claim_delay(Duration::from_millis(300));
/// store.fail_transitions(1);
/// ```
pub struct FaultyOrderStore {
    inner: Arc<dyn OrderStore>,
    claim_delay_ms: AtomicU64,
    transition_delay_ms: AtomicU64,
    transition_failures: AtomicU32,
}

impl FaultyOrderStore {
    pub fn new(inner: Arc<dyn OrderStore>) -> Self {
        Self {
            inner,
            claim_delay_ms: AtomicU64::new(0),
            transition_delay_ms: AtomicU64::new(0),
            transition_failures: AtomicU32::new(0),
        }
    }

    /// Sleep this long after every `try_claim` has committed.
    pub fn set_claim_delay(&self, delay: Duration) {
        self.claim_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Sleep this long before every `transition`.
    pub fn set_transition_delay(&self, delay: Duration) {
        self.transition_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Fail the next `n` transitions with a non-transient database error.
    pub fn fail_transitions(&self, n: u32) {
        self.transition_failures.store(n, Ordering::SeqCst);
    }

    fn pause(millis: &AtomicU64) {
        let ms = millis.load(Ordering::SeqCst);
        if ms > 0 {
            std::thread::sleep(Duration::from_millis(ms));
        }
    }
}

impl OrderStore for FaultyOrderStore {
    fn create(&self, request: CreateOrderRequest) -> Result<OrderDetails, StoreError> {
        self.inner.create(request)
    }

    fn get(&self, id: i64) -> Result<Option<Order>, StoreError> {
        self.inner.get(id)
    }

    fn get_by_number(&self, number: i64) -> Result<Option<Order>, StoreError> {
        self.inner.get_by_number(number)
    }

    fn items(&self, order_id: i64) -> Result<Vec<OrderItem>, StoreError> {
        self.inner.items(order_id)
    }

    fn history(&self, order_id: i64) -> Result<Vec<StatusLogEntry>, StoreError> {
        self.inner.history(order_id)
    }

    fn details(&self, id: i64) -> Result<Option<OrderDetails>, StoreError> {
        self.inner.details(id)
    }

    fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        self.inner.list(filter)
    }

    fn count(&self, filter: &OrderFilter) -> Result<i64, StoreError> {
        self.inner.count(filter)
    }

    fn transition(&self, request: TransitionRequest) -> Result<StatusChange, StoreError> {
        Self::pause(&self.transition_delay_ms);
        if take_one(&self.transition_failures) {
            return Err(StoreError::Database("simulated disk failure".to_string()));
        }
        self.inner.transition(request)
    }

    fn claim_candidates(
        &self,
        order_types: &[OrderType],
        limit: usize,
    ) -> Result<Vec<Order>, StoreError> {
        self.inner.claim_candidates(order_types, limit)
    }

    fn try_claim(&self, order_id: i64, worker: &str) -> Result<Option<Order>, StoreError> {
        let claimed = self.inner.try_claim(order_id, worker);
        Self::pause(&self.claim_delay_ms);
        claimed
    }

    fn release(
        &self,
        order_id: i64,
        worker: &str,
        reason: &str,
    ) -> Result<Option<StatusChange>, StoreError> {
        self.inner.release(order_id, worker, reason)
    }

    fn claimed_by(&self, worker: &str) -> Result<Vec<Order>, StoreError> {
        self.inner.claimed_by(worker)
    }
}

/// Worker registry that delegates to a real registry and can fail heartbeats.
pub struct FaultyWorkerRegistry {
    inner: Arc<dyn WorkerRegistry>,
    heartbeat_failures: AtomicU32,
    heartbeat_calls: AtomicU32,
}

impl FaultyWorkerRegistry {
    pub fn new(inner: Arc<dyn WorkerRegistry>) -> Self {
        Self {
            inner,
            heartbeat_failures: AtomicU32::new(0),
            heartbeat_calls: AtomicU32::new(0),
        }
    }

    /// Fail the next `n` heartbeats with a transient error.
    pub fn fail_heartbeats(&self, n: u32) {
        self.heartbeat_failures.store(n, Ordering::SeqCst);
    }

    /// Heartbeat attempts so far, failed or not.
    pub fn heartbeat_calls(&self) -> u32 {
        self.heartbeat_calls.load(Ordering::SeqCst)
    }
}

impl WorkerRegistry for FaultyWorkerRegistry {
    fn register(
        &self,
        name: &str,
        worker_type: &str,
        liveness_window: Duration,
    ) -> Result<WorkerRecord, WorkerError> {
        self.inner.register(name, worker_type, liveness_window)
    }

    fn heartbeat_at(&self, name: &str, at: DateTime<Utc>) -> Result<(), WorkerError> {
        self.heartbeat_calls.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.heartbeat_failures) {
            return Err(WorkerError::Unavailable("simulated lock timeout".to_string()));
        }
        self.inner.heartbeat_at(name, at)
    }

    fn set_status(&self, name: &str, status: WorkerStatus) -> Result<(), WorkerError> {
        self.inner.set_status(name, status)
    }

    fn record_completion(&self, name: &str) -> Result<(), WorkerError> {
        self.inner.record_completion(name)
    }

    fn get(&self, name: &str) -> Result<Option<WorkerRecord>, WorkerError> {
        self.inner.get(name)
    }

    fn list(&self) -> Result<Vec<WorkerRecord>, WorkerError> {
        self.inner.list()
    }

    fn stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<WorkerRecord>, WorkerError> {
        self.inner.stale(cutoff)
    }
}
