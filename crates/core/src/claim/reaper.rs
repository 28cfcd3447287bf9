//! Releases orders held by workers that stopped heartbeating.
//!
//! Each tick also prunes broker messages every consumer group has read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::coordinator::{ClaimCoordinator, ClaimError, ReleaseReason};
use crate::broker::{Broker, OrderEvent};
use crate::metrics;
use crate::order::{Order, OrderStatus, OrderStore, StoreError};
use crate::worker::{WorkerRegistry, WorkerStatus};

/// An order the reaper sent back to the queue.
#[derive(Debug, Clone)]
pub struct ReleasedOrder {
    pub order: Order,
    /// Status the order had while it was held.
    pub previous: OrderStatus,
    pub worker: String,
    pub reason: String,
}

/// Outcome of one reaper pass.
#[derive(Debug, Clone, Default)]
pub struct ReapReport {
    pub workers_marked_offline: Vec<String>,
    pub released: Vec<ReleasedOrder>,
}

impl ReapReport {
    pub fn is_empty(&self) -> bool {
        self.workers_marked_offline.is_empty() && self.released.is_empty()
    }
}

pub struct LivenessReaper {
    orders: Arc<dyn OrderStore>,
    registry: Arc<dyn WorkerRegistry>,
    coordinator: ClaimCoordinator,
    broker: Broker,
    window: Duration,
    interval: Duration,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl LivenessReaper {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        registry: Arc<dyn WorkerRegistry>,
        broker: Broker,
        window: Duration,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            coordinator: ClaimCoordinator::new(Arc::clone(&orders)),
            orders,
            registry,
            broker,
            window,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// One pass as of `now`: release every order held by a worker silent for
    /// longer than the window and mark those workers offline.
    pub fn reap_once_at(&self, now: DateTime<Utc>) -> Result<ReapReport, ClaimError> {
        let window = chrono::Duration::from_std(self.window)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        let cutoff = now - window;
        let mut report = ReapReport::default();

        for worker in self.registry.stale(cutoff)? {
            let silent_for = (now - worker.last_seen).to_std().unwrap_or_default();
            let reason = ReleaseReason::WorkerTimeout {
                worker: worker.name.clone(),
                silent_for,
            };

            for held in self.orders.claimed_by(&worker.name)? {
                if let Some(change) = self.coordinator.release(held.id, &worker.name, &reason)? {
                    warn!(
                        action = "reap",
                        order_id = change.order.id,
                        worker = %worker.name,
                        silent_secs = silent_for.as_secs(),
                        "Released order from silent worker"
                    );
                    report.released.push(ReleasedOrder {
                        order: change.order,
                        previous: change.from,
                        worker: worker.name.clone(),
                        reason: reason.to_string(),
                    });
                }
            }

            if worker.status != WorkerStatus::Offline {
                self.registry.mark_offline(&worker.name)?;
                metrics::WORKERS_REAPED.inc();
                info!(action = "reap", worker = %worker.name, "Worker marked offline");
                report.workers_marked_offline.push(worker.name.clone());
            }
        }

        Ok(report)
    }

    /// One pass as of now, followed by `order.status_changed` events for
    /// every release and a broker pruning pass.
    pub async fn tick(self: &Arc<Self>) -> Result<ReapReport, ClaimError> {
        let pass = Arc::clone(self);
        let report = tokio::task::spawn_blocking(move || pass.reap_once_at(Utc::now()))
            .await
            .map_err(|e| StoreError::Database(format!("reaper task failed: {}", e)))??;
        Self::publish_releases(&self.broker, &report).await;
        if let Err(e) = self.broker.prune_consumed().await {
            warn!("Broker pruning failed: {}", e);
        }
        Ok(report)
    }

    async fn publish_releases(broker: &Broker, report: &ReapReport) {
        for released in &report.released {
            let event = OrderEvent::status_changed(
                &released.order,
                released.previous,
                Some(&released.worker),
                Some(&released.reason),
            );
            if let Err(e) = broker.publish_event(event, None).await {
                error!(
                    order_id = released.order.id,
                    "Failed to publish release event: {}", e
                );
            }
        }
    }

    /// Spawn the periodic reaper loop.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Reaper already running");
            return None;
        }

        let reaper = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        Some(tokio::spawn(async move {
            info!(
                window_ms = reaper.window.as_millis() as u64,
                "Liveness reaper started"
            );
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Reaper received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(reaper.interval) => {
                        if !reaper.running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = reaper.tick().await {
                            warn!("Reaper pass failed: {}", e);
                        }
                    }
                }
            }
            info!("Liveness reaper stopped");
        }))
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
    }
}
