//! Idempotent consumer of `order.status_changed`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::notifier::Notifier;
use super::receipts::{ReceiptStore, Reservation};
use super::types::{Notification, NotificationOutcome, NotifyError};
use crate::broker::{topics, Broker, DeadLetter, Delivery, Subscription};
use crate::metrics;
use crate::order::OrderStatus;

/// Consumer group used by every notifier process.
pub const NOTIFICATION_GROUP: &str = "notification-subscriber";

const SERVICE: &str = "notification-subscriber";

/// How long a pending receipt protects an in-flight send.
pub const DEFAULT_RECEIPT_LEASE: Duration = Duration::from_secs(30);

pub struct NotificationSubscriber {
    broker: Broker,
    receipts: Arc<dyn ReceiptStore>,
    notifier: Arc<dyn Notifier>,
    max_delivery_attempts: u32,
    receipt_lease: Duration,
    subscription: Mutex<Subscription>,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl NotificationSubscriber {
    pub fn new(
        broker: Broker,
        receipts: Arc<dyn ReceiptStore>,
        notifier: Arc<dyn Notifier>,
        max_delivery_attempts: u32,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let subscription = broker.subscribe(NOTIFICATION_GROUP, topics::ORDER_STATUS_CHANGED);

        Self {
            broker,
            receipts,
            notifier,
            max_delivery_attempts: max_delivery_attempts.max(1),
            receipt_lease: DEFAULT_RECEIPT_LEASE,
            subscription: Mutex::new(subscription),
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Pending receipts older than `lease` are treated as abandoned. Keep it
    /// longer than the notifier's own timeout.
    pub fn with_receipt_lease(mut self, lease: Duration) -> Self {
        self.receipt_lease = lease;
        self
    }

    async fn receipts<T, F>(&self, f: F) -> Result<T, NotifyError>
    where
        F: FnOnce(&dyn ReceiptStore) -> Result<T, NotifyError> + Send + 'static,
        T: Send + 'static,
    {
        let receipts = Arc::clone(&self.receipts);
        tokio::task::spawn_blocking(move || f(receipts.as_ref()))
            .await
            .map_err(|e| NotifyError::Receipts(format!("receipt task failed: {}", e)))?
    }

    /// Handle one delivery and settle it (ack or nack) on `subscription`.
    pub async fn handle_delivery(
        &self,
        subscription: &mut Subscription,
        delivery: Delivery,
    ) -> NotificationOutcome {
        let outcome = self.settle(subscription, &delivery).await;
        metrics::NOTIFICATIONS
            .with_label_values(&[outcome.label()])
            .inc();
        outcome
    }

    async fn settle(
        &self,
        subscription: &mut Subscription,
        delivery: &Delivery,
    ) -> NotificationOutcome {
        let notification = match delivery.decode() {
            Ok(envelope) => match Notification::from_envelope(&envelope) {
                Some(notification) => notification,
                None => {
                    let reason = "unexpected event kind on status topic";
                    return self.dead_letter(subscription, delivery, reason).await;
                }
            },
            Err(e) => return self.dead_letter(subscription, delivery, &e.to_string()).await,
        };

        let order_id = notification.order_id;
        let status = notification.to;

        let lease = self.receipt_lease;
        match self.receipts(move |r| r.reserve(order_id, status, lease)).await {
            Ok(Reservation::Acquired) => {}
            Ok(Reservation::InFlight) => {
                debug!(
                    service = SERVICE,
                    order_id,
                    status = %status,
                    offset = delivery.offset,
                    "Notification in flight elsewhere, deferring"
                );
                subscription.nack(delivery);
                return NotificationOutcome::Deferred;
            }
            Ok(Reservation::Delivered) => {
                debug!(
                    service = SERVICE,
                    order_id,
                    status = %status,
                    offset = delivery.offset,
                    "Duplicate notification skipped"
                );
                self.ack(subscription, delivery).await;
                return NotificationOutcome::Duplicate;
            }
            Err(e) => {
                warn!(service = SERVICE, order_id, "Receipt check failed: {}", e);
                subscription.nack(delivery);
                return NotificationOutcome::Failed;
            }
        }

        if let Err(e) = self.notifier.notify(&notification).await {
            self.release_receipt(order_id, status).await;

            if delivery.attempt >= self.max_delivery_attempts {
                let reason = format!(
                    "notifier {} failed after {} attempts: {}",
                    self.notifier.name(),
                    delivery.attempt,
                    e
                );
                return self.dead_letter(subscription, delivery, &reason).await;
            }

            warn!(
                service = SERVICE,
                action = "notify",
                order_id,
                attempt = delivery.attempt,
                correlation_id = notification.correlation_id.as_deref().unwrap_or(""),
                "Notification failed, will retry: {}",
                e
            );
            subscription.nack(delivery);
            return NotificationOutcome::Failed;
        }

        if let Err(e) = self.receipts(move |r| r.confirm(order_id, status)).await {
            // The pending receipt expires after the lease; a redelivery
            // before then is deferred, after it the notification is resent
            warn!(
                service = SERVICE,
                order_id,
                status = %status,
                "Failed to confirm receipt: {}",
                e
            );
        }

        self.ack(subscription, delivery).await;
        NotificationOutcome::Delivered
    }

    async fn release_receipt(&self, order_id: i64, status: OrderStatus) {
        if let Err(e) = self.receipts(move |r| r.remove(order_id, status)).await {
            error!(
                service = SERVICE,
                order_id,
                status = %status,
                "Failed to drop receipt, redelivery waits for the lease: {}",
                e
            );
        }
    }

    async fn ack(&self, subscription: &mut Subscription, delivery: &Delivery) {
        if let Err(e) = subscription.ack(delivery).await {
            // The message comes back and is recognized as a duplicate
            warn!(service = SERVICE, offset = delivery.offset, "Ack failed: {}", e);
        }
    }

    async fn dead_letter(
        &self,
        subscription: &mut Subscription,
        delivery: &Delivery,
        reason: &str,
    ) -> NotificationOutcome {
        error!(
            service = SERVICE,
            action = "dead_letter",
            offset = delivery.offset,
            topic = %delivery.topic,
            "Message dead-lettered: {}",
            reason
        );

        let letter = DeadLetter::new(&delivery.topic, delivery.offset, &delivery.payload, reason);
        let published = match serde_json::to_vec(&letter) {
            Ok(payload) => self
                .broker
                .publish_raw(&DeadLetter::dlq_topic(&delivery.topic), payload)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match published {
            Ok(()) => {
                self.ack(subscription, delivery).await;
                NotificationOutcome::DeadLettered
            }
            Err(e) => {
                error!(
                    service = SERVICE,
                    offset = delivery.offset,
                    "Dead-letter publish failed, keeping message: {}",
                    e
                );
                subscription.nack(delivery);
                NotificationOutcome::Failed
            }
        }
    }

    /// Handle every message available right now. Stops early when a message
    /// is left for redelivery.
    pub async fn process_available(&self) -> Result<Vec<NotificationOutcome>, NotifyError> {
        let mut subscription = self.subscription.lock().await;
        let mut outcomes = Vec::new();

        while let Some(delivery) = subscription.try_next().await? {
            let outcome = self.handle_delivery(&mut subscription, delivery).await;
            outcomes.push(outcome);
            if matches!(
                outcome,
                NotificationOutcome::Failed | NotificationOutcome::Deferred
            ) {
                break;
            }
        }

        Ok(outcomes)
    }

    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Notification subscriber already running");
            return None;
        }

        let subscriber = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        Some(tokio::spawn(async move {
            info!(
                service = SERVICE,
                notifier = subscriber.notifier.name(),
                group = NOTIFICATION_GROUP,
                "Notification subscriber started"
            );

            let mut subscription = subscriber.subscription.lock().await;
            loop {
                let next = tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    next = subscription.next() => next,
                };

                match next {
                    Ok(delivery) => {
                        subscriber.handle_delivery(&mut subscription, delivery).await;
                    }
                    Err(e) => warn!(service = SERVICE, "Failed to read from broker: {}", e),
                }
            }

            info!(service = SERVICE, "Notification subscriber stopped");
        }))
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
    }
}
