//! Notification fan-out.
//!
//! The subscriber consumes `order.status_changed` as consumer group
//! `notification-subscriber`. Delivery is at least once; the receipt store
//! turns redeliveries of an already sent `(order_id, status)` pair into
//! duplicates. Undecodable messages go to `order.status_changed.dlq`.

mod notifier;
mod receipts;
mod subscriber;
mod types;

pub use notifier::{create_notifier, LogNotifier, Notifier, WebhookNotifier};
pub use receipts::{ReceiptStore, Reservation, SqliteReceiptStore};
pub use subscriber::{NotificationSubscriber, DEFAULT_RECEIPT_LEASE, NOTIFICATION_GROUP};
pub use types::{Notification, NotificationOutcome, NotifyError};
