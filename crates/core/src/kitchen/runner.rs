//! Kitchen worker implementation.
//!
//! Two tasks per worker:
//! - Heartbeat: refreshes `last_seen` on a fixed interval, independent of work
//! - Claim loop: claims one order at a time and walks it to `completed`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broker::{topics, Broker, OrderEvent, Subscription};
use crate::claim::{ClaimCoordinator, ReleaseReason, WorkerCapabilities};
use crate::metrics;
use crate::order::{
    next_kitchen_step, Order, OrderStatus, OrderStore, StatusChange, TransitionRequest,
};
use crate::retry::retry_with_backoff;
use crate::worker::{WorkerRegistry, WorkerStatus, KITCHEN_WORKER_TYPE};

use super::config::KitchenConfig;
use super::types::{KitchenError, KitchenStatus};

const SERVICE: &str = "kitchen-worker";

/// Consumer group a worker reads `order.created` hints through.
fn hints_group(worker: &str) -> String {
    format!("kitchen-hints.{}", worker)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessOutcome {
    Completed,
    /// Someone else owns the order now; nothing to undo.
    Dropped,
    Released,
    Shutdown,
}

#[derive(Debug, Default)]
struct KitchenState {
    current_order: Option<i64>,
    orders_processed: u64,
    /// Releases that failed and must be retried.
    stranded: Vec<i64>,
    /// A store call timed out and may still commit; held orders must be
    /// checked before the next claim.
    needs_reconcile: bool,
    /// Store calls that outlived their timeout and are still running.
    late_calls: Vec<JoinHandle<()>>,
}

/// Everything the worker tasks share.
struct KitchenContext {
    name: String,
    config: KitchenConfig,
    capabilities: WorkerCapabilities,
    orders: Arc<dyn OrderStore>,
    registry: Arc<dyn WorkerRegistry>,
    coordinator: ClaimCoordinator,
    broker: Broker,
    liveness_window: Duration,
    state: RwLock<KitchenState>,
}

/// A kitchen worker: claims pending orders and drives them to completion.
pub struct KitchenWorker {
    ctx: Arc<KitchenContext>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl KitchenWorker {
    /// Create a new worker. The name is resolved (or generated) here.
    pub fn new(
        config: KitchenConfig,
        orders: Arc<dyn OrderStore>,
        registry: Arc<dyn WorkerRegistry>,
        broker: Broker,
        liveness_window: Duration,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let name = config.resolved_worker_name();
        let coordinator =
            ClaimCoordinator::new(Arc::clone(&orders)).with_batch_size(config.claim_batch_size);

        Self {
            ctx: Arc::new(KitchenContext {
                name,
                capabilities: WorkerCapabilities::new(config.order_types.clone()),
                config,
                orders,
                registry,
                coordinator,
                broker,
                liveness_window,
                state: RwLock::new(KitchenState::default()),
            }),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.ctx.name
    }

    /// Register the worker and spawn its tasks.
    ///
    /// Fails when another live worker already uses this name.
    pub async fn start(&self) -> Result<(), KitchenError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(KitchenError::AlreadyRunning);
        }

        if let Err(e) = self.ctx.register().await {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        info!(
            service = SERVICE,
            action = "register",
            worker = %self.ctx.name,
            order_types = ?self.ctx.capabilities.order_types,
            "Kitchen worker registered"
        );

        self.ctx.recover_held_orders().await;

        let hints = self
            .ctx
            .broker
            .subscribe_from_latest(&hints_group(&self.ctx.name), topics::ORDER_CREATED);

        let heartbeat = self.spawn_heartbeat_loop();
        let claim = self.spawn_claim_loop(hints);
        self.tasks.lock().await.extend([heartbeat, claim]);

        info!(service = SERVICE, worker = %self.ctx.name, "Kitchen worker started");
        Ok(())
    }

    /// Stop gracefully: finish the current store step, release a held order,
    /// and mark the worker offline.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Kitchen worker not running");
            return;
        }

        info!(service = SERVICE, worker = %self.ctx.name, "Stopping kitchen worker");
        let _ = self.shutdown_tx.send(());

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                error!("Kitchen worker task failed: {}", e);
            }
        }

        // Hint groups start from the latest offset, so a restart needs no row
        if let Err(e) = self
            .ctx
            .broker
            .drop_group(&hints_group(&self.ctx.name), topics::ORDER_CREATED)
            .await
        {
            warn!(worker = %self.ctx.name, "Failed to drop hint group: {}", e);
        }

        let registry = Arc::clone(&self.ctx.registry);
        let name = self.ctx.name.clone();
        if let Err(e) = self
            .ctx
            .store(move || registry.mark_offline(&name).map_err(KitchenError::from))
            .await
        {
            warn!(worker = %self.ctx.name, "Failed to mark worker offline: {}", e);
        }

        info!(service = SERVICE, worker = %self.ctx.name, "Kitchen worker stopped");
    }

    /// Get current worker status.
    pub async fn status(&self) -> KitchenStatus {
        let state = self.ctx.state.read().await;
        KitchenStatus {
            running: self.running.load(Ordering::Relaxed),
            worker_name: self.ctx.name.clone(),
            current_order: state.current_order,
            orders_processed: state.orders_processed,
        }
    }

    fn spawn_heartbeat_loop(&self) -> JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            debug!(worker = %ctx.name, "Heartbeat loop started");
            let interval = ctx.config.heartbeat_interval();
            let mut failures: u32 = 0;

            loop {
                let delay = if failures == 0 {
                    interval
                } else {
                    ctx.config.retry.delay_for_attempt(failures).min(interval)
                };

                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                let registry = Arc::clone(&ctx.registry);
                let name = ctx.name.clone();
                match ctx
                    .store(move || registry.heartbeat(&name).map_err(KitchenError::from))
                    .await
                {
                    Ok(()) => {
                        if failures > 0 {
                            info!(worker = %ctx.name, failures, "Heartbeat recovered");
                        }
                        failures = 0;
                    }
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        metrics::HEARTBEAT_FAILURES.inc();
                        warn!(
                            service = SERVICE,
                            action = "heartbeat",
                            worker = %ctx.name,
                            failures,
                            "Heartbeat failed: {}",
                            e
                        );
                    }
                }
            }
            debug!(worker = %ctx.name, "Heartbeat loop stopped");
        })
    }

    fn spawn_claim_loop(&self, mut hints: Subscription) -> JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let running = Arc::clone(&self.running);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(worker = %ctx.name, "Claim loop started");

            'outer: loop {
                ctx.release_stranded().await;
                let settled = ctx.reconcile_claims().await;

                // Drain everything claimable before waiting again
                while settled {
                    if !running.load(Ordering::Relaxed) {
                        break 'outer;
                    }
                    match ctx.claim_next().await {
                        Ok(Some(order)) => {
                            if ctx.process(order, &mut shutdown_rx).await == ProcessOutcome::Shutdown {
                                break 'outer;
                            }
                            if ctx.state.read().await.needs_reconcile {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(worker = %ctx.name, "Claim attempt failed: {}", e);
                            ctx.state.write().await.needs_reconcile = true;
                            break;
                        }
                    }
                }

                let hint = tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    hint = hints.next() => Some(hint),
                    _ = tokio::time::sleep(ctx.config.poll_interval()) => None,
                };

                match hint {
                    Some(Ok(delivery)) => {
                        debug!(worker = %ctx.name, offset = delivery.offset, "Order created hint");
                        if let Err(e) = hints.ack(&delivery).await {
                            debug!("Failed to ack hint: {}", e);
                        }
                    }
                    Some(Err(e)) => debug!("Hint subscription error: {}", e),
                    None => {}
                }
            }

            ctx.release_stranded().await;
            let late_calls = std::mem::take(&mut ctx.state.write().await.late_calls);
            for task in late_calls {
                let _ = tokio::time::timeout(ctx.config.store_timeout(), task).await;
            }
            ctx.reconcile_claims().await;
            info!(worker = %ctx.name, "Claim loop stopped");
        })
    }
}

impl KitchenContext {
    /// Run a blocking store call bounded by `kitchen.store_timeout_ms`.
    async fn store<T, F>(&self, f: F) -> Result<T, KitchenError>
    where
        F: FnOnce() -> Result<T, KitchenError> + Send + 'static,
        T: Send + 'static,
    {
        let deadline = self.config.store_timeout();
        let mut task = tokio::task::spawn_blocking(f);
        match tokio::time::timeout(deadline, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(KitchenError::Internal(format!("store task failed: {}", e))),
            Err(_) => {
                // The call keeps running and may still commit
                let late = tokio::spawn(async move {
                    let _ = task.await;
                });
                let mut state = self.state.write().await;
                state.late_calls.push(late);
                state.needs_reconcile = true;
                Err(KitchenError::StoreTimeout(deadline))
            }
        }
    }

    async fn register(&self) -> Result<(), KitchenError> {
        let registry = Arc::clone(&self.registry);
        let name = self.name.clone();
        let window = self.liveness_window;
        self.store(move || {
            registry
                .register(&name, KITCHEN_WORKER_TYPE, window)
                .map(|_| ())
                .map_err(KitchenError::from)
        })
        .await
    }

    async fn set_status(&self, status: WorkerStatus) {
        let registry = Arc::clone(&self.registry);
        let name = self.name.clone();
        if let Err(e) = self
            .store(move || registry.set_status(&name, status).map_err(KitchenError::from))
            .await
        {
            warn!(worker = %self.name, %status, "Failed to update worker status: {}", e);
        }
    }

    async fn publish(&self, event: OrderEvent) {
        let order_id = event.order_id();
        if let Err(e) = self.broker.publish_event(event, None).await {
            warn!(
                service = SERVICE,
                action = "publish",
                order_id,
                worker = %self.name,
                "Event not published, store remains authoritative: {}",
                e
            );
        }
    }

    /// Release orders this name still holds from a previous run.
    async fn recover_held_orders(&self) {
        let orders = Arc::clone(&self.orders);
        let name = self.name.clone();
        match self
            .store(move || orders.claimed_by(&name).map_err(KitchenError::from))
            .await
        {
            Ok(held) => {
                for order in held {
                    warn!(order_id = order.id, worker = %self.name, "Releasing order held by previous run");
                    self.release(order.id, ReleaseReason::Failure("worker restarted".to_string()))
                        .await;
                }
            }
            Err(e) => warn!(worker = %self.name, "Failed to check for held orders: {}", e),
        }
    }

    /// A store call that timed out (or a claim that failed without an answer)
    /// may still have committed. Any order this worker holds while idle got
    /// there that way; release it.
    ///
    /// Returns false while a late call is still running or the check failed.
    async fn reconcile_claims(&self) -> bool {
        {
            let mut state = self.state.write().await;
            if !state.needs_reconcile {
                return true;
            }
            state.late_calls.retain(|task| !task.is_finished());
            if !state.late_calls.is_empty() {
                debug!(
                    worker = %self.name,
                    pending = state.late_calls.len(),
                    "Timed out store calls still running"
                );
                return false;
            }
        }

        let orders = Arc::clone(&self.orders);
        let name = self.name.clone();
        let held = match self
            .store(move || orders.claimed_by(&name).map_err(KitchenError::from))
            .await
        {
            Ok(held) => held,
            Err(e) => {
                warn!(worker = %self.name, "Failed to reconcile claims, will retry: {}", e);
                return false;
            }
        };

        for order in held {
            warn!(
                service = SERVICE,
                action = "reconcile",
                order_id = order.id,
                worker = %self.name,
                "Releasing order left held by a timed out store call"
            );
            self.release(
                order.id,
                ReleaseReason::Failure("unconfirmed store write".to_string()),
            )
            .await;
        }
        self.state.write().await.needs_reconcile = false;
        true
    }

    async fn claim_next(&self) -> Result<Option<Order>, KitchenError> {
        let coordinator = self.coordinator.clone();
        let capabilities = self.capabilities.clone();
        let name = self.name.clone();
        self.store(move || {
            coordinator
                .claim_next(&name, &capabilities)
                .map_err(KitchenError::from)
        })
        .await
    }

    async fn release(&self, order_id: i64, reason: ReleaseReason) {
        let coordinator = self.coordinator.clone();
        let name = self.name.clone();
        let notes = reason.to_string();
        let result = self
            .store(move || {
                coordinator
                    .release(order_id, &name, &reason)
                    .map_err(KitchenError::from)
            })
            .await;

        match result {
            Ok(Some(change)) => {
                self.publish(OrderEvent::status_changed(
                    &change.order,
                    change.from,
                    Some(&self.name),
                    Some(&notes),
                ))
                .await;
            }
            Ok(None) => debug!(order_id, worker = %self.name, "Order no longer held, nothing to release"),
            Err(e) => {
                error!(
                    service = SERVICE,
                    action = "release",
                    order_id,
                    worker = %self.name,
                    "Release failed, will retry: {}",
                    e
                );
                self.state.write().await.stranded.push(order_id);
            }
        }
    }

    async fn release_stranded(&self) {
        let stranded = std::mem::take(&mut self.state.write().await.stranded);
        for order_id in stranded {
            self.release(order_id, ReleaseReason::Failure("earlier release failed".to_string()))
                .await;
        }
    }

    /// Persist one ownership-checked step, retrying transient failures.
    async fn advance(&self, order_id: i64, next: OrderStatus) -> Result<StatusChange, KitchenError> {
        let orders = Arc::clone(&self.orders);
        let name = self.name.clone();

        retry_with_backoff(
            &self.config.retry,
            "advance",
            KitchenError::is_transient,
            move || {
                let orders = Arc::clone(&orders);
                let name = name.clone();
                self.store(move || {
                    orders
                        .transition(TransitionRequest::new(order_id, next).owned_by(name))
                        .map_err(KitchenError::from)
                })
            },
        )
        .await
    }

    async fn process(
        &self,
        order: Order,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> ProcessOutcome {
        let started = Instant::now();
        let order_id = order.id;
        let order_type = order.order_type();

        self.state.write().await.current_order = Some(order_id);
        self.set_status(WorkerStatus::Busy).await;
        metrics::TRANSITIONS
            .with_label_values(&[OrderStatus::Preparing.as_str()])
            .inc();
        self.publish(OrderEvent::status_changed(
            &order,
            OrderStatus::Received,
            Some(&self.name),
            Some("claimed"),
        ))
        .await;

        let outcome = self.walk(order, shutdown_rx).await;

        if outcome == ProcessOutcome::Completed {
            let registry = Arc::clone(&self.registry);
            let name = self.name.clone();
            if let Err(e) = self
                .store(move || registry.record_completion(&name).map_err(KitchenError::from))
                .await
            {
                warn!(worker = %self.name, "Failed to record completion: {}", e);
            }
            metrics::PREPARATION_DURATION
                .with_label_values(&[order_type.as_str()])
                .observe(started.elapsed().as_secs_f64());
            self.state.write().await.orders_processed += 1;
            info!(
                service = SERVICE,
                action = "complete",
                order_id,
                worker = %self.name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Order completed"
            );
        } else if outcome != ProcessOutcome::Shutdown {
            self.set_status(WorkerStatus::Online).await;
        }

        self.state.write().await.current_order = None;
        outcome
    }

    async fn walk(
        &self,
        mut current: Order,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> ProcessOutcome {
        while let Some(next) = next_kitchen_step(current.status, current.order_type()) {
            let delay = self.config.step_delay(current.status);
            if !delay.is_zero() {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        self.release(current.id, ReleaseReason::Shutdown).await;
                        return ProcessOutcome::Shutdown;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match self.advance(current.id, next).await {
                Ok(StatusChange { order: updated, from }) => {
                    info!(
                        service = SERVICE,
                        action = "transition",
                        order_id = updated.id,
                        worker = %self.name,
                        from = %from,
                        to = %next,
                        "Order advanced"
                    );
                    metrics::TRANSITIONS.with_label_values(&[next.as_str()]).inc();
                    self.publish(OrderEvent::status_changed(
                        &updated,
                        from,
                        Some(&self.name),
                        None,
                    ))
                    .await;
                    current = updated;
                }
                Err(e) if e.is_lost_order() => {
                    warn!(
                        service = SERVICE,
                        order_id = current.id,
                        worker = %self.name,
                        "Order no longer ours, dropping: {}",
                        e
                    );
                    return ProcessOutcome::Dropped;
                }
                Err(e) => {
                    error!(
                        service = SERVICE,
                        action = "transition",
                        order_id = current.id,
                        worker = %self.name,
                        "Failed to advance order: {}",
                        e
                    );
                    self.release(current.id, ReleaseReason::Failure(e.to_string()))
                        .await;
                    return ProcessOutcome::Released;
                }
            }
        }

        ProcessOutcome::Completed
    }
}
