//! Notification payloads, outcomes and errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::broker::{BrokerError, EventEnvelope, OrderEvent};
use crate::error::ErrorKind;
use crate::order::OrderStatus;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// The receipt store could not be read or written.
    #[error("receipt store error: {0}")]
    Receipts(String),

    /// The notifier could not deliver the notification.
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("notifier misconfigured: {0}")]
    Config(String),
}

impl NotifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NotifyError::Receipts(_) => ErrorKind::StoreUnavailable,
            NotifyError::Delivery(_) => ErrorKind::Internal,
            NotifyError::Broker(e) => e.kind(),
            NotifyError::Config(_) => ErrorKind::Validation,
        }
    }
}

impl From<rusqlite::Error> for NotifyError {
    fn from(err: rusqlite::Error) -> Self {
        NotifyError::Receipts(err.to_string())
    }
}

/// A status change as handed to a [`Notifier`](super::Notifier).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub order_id: i64,
    pub number: i64,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub changed_by: Option<String>,
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// `None` unless the envelope carries a status change.
    pub fn from_envelope(envelope: &EventEnvelope) -> Option<Self> {
        match &envelope.event {
            OrderEvent::StatusChanged {
                order_id,
                number,
                from,
                to,
                changed_by,
                notes,
            } => Some(Self {
                message_id: envelope.message_id.clone(),
                correlation_id: envelope.correlation_id.clone(),
                order_id: *order_id,
                number: *number,
                from: *from,
                to: *to,
                changed_by: changed_by.clone(),
                notes: notes.clone(),
                timestamp: envelope.timestamp,
            }),
            OrderEvent::OrderCreated { .. } => None,
        }
    }

    /// Human-readable line, e.g. `Order #12 is now ready (was preparing)`.
    pub fn message(&self) -> String {
        let mut text = format!("Order #{} is now {} (was {})", self.number, self.to, self.from);
        if let Some(worker) = &self.changed_by {
            text.push_str(&format!(" by {}", worker));
        }
        text
    }
}

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    Delivered,
    /// Receipt already present; acknowledged without notifying.
    Duplicate,
    /// Moved to the dead-letter topic and acknowledged.
    DeadLettered,
    /// Left unacknowledged for redelivery.
    Failed,
    /// Another consumer is sending the same notification right now; left
    /// for redelivery.
    Deferred,
}

impl NotificationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            NotificationOutcome::Delivered => "delivered",
            NotificationOutcome::Duplicate => "duplicate",
            NotificationOutcome::DeadLettered => "dead_letter",
            NotificationOutcome::Failed => "failed",
            NotificationOutcome::Deferred => "deferred",
        }
    }
}
