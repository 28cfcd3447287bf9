//! Event payloads carried by the broker.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::log::BrokerError;
use crate::order::{Order, OrderStatus, OrderType};

/// Topic names.
pub mod topics {
    pub const ORDER_CREATED: &str = "order.created";
    pub const ORDER_STATUS_CHANGED: &str = "order.status_changed";
    pub const ORDER_STATUS_CHANGED_DLQ: &str = "order.status_changed.dlq";
}

/// Domain events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderEvent {
    OrderCreated {
        order_id: i64,
        number: i64,
        order_type: OrderType,
        priority: i32,
        total_amount: Decimal,
    },
    StatusChanged {
        order_id: i64,
        number: i64,
        from: OrderStatus,
        to: OrderStatus,
        changed_by: Option<String>,
        notes: Option<String>,
    },
}

impl OrderEvent {
    pub fn created(order: &Order) -> Self {
        OrderEvent::OrderCreated {
            order_id: order.id,
            number: order.number,
            order_type: order.order_type(),
            priority: order.priority,
            total_amount: order.total_amount,
        }
    }

    /// Status change of `order` (already in its new status) from `from`.
    pub fn status_changed(
        order: &Order,
        from: OrderStatus,
        changed_by: Option<&str>,
        notes: Option<&str>,
    ) -> Self {
        OrderEvent::StatusChanged {
            order_id: order.id,
            number: order.number,
            from,
            to: order.status,
            changed_by: changed_by.map(str::to_string),
            notes: notes.map(str::to_string),
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated { .. } => topics::ORDER_CREATED,
            OrderEvent::StatusChanged { .. } => topics::ORDER_STATUS_CHANGED,
        }
    }

    pub fn order_id(&self) -> i64 {
        match self {
            OrderEvent::OrderCreated { order_id, .. } => *order_id,
            OrderEvent::StatusChanged { order_id, .. } => *order_id,
        }
    }
}

/// What goes on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub message_id: String,
    pub topic: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub event: OrderEvent,
}

impl EventEnvelope {
    pub fn new(event: OrderEvent, correlation_id: Option<String>) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            topic: event.topic().to_string(),
            timestamp: Utc::now(),
            correlation_id,
            event,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, BrokerError> {
        serde_json::to_vec(self).map_err(|e| BrokerError::Serialization(e.to_string()))
    }

    pub fn from_slice(payload: &[u8]) -> Result<Self, BrokerError> {
        serde_json::from_slice(payload).map_err(|e| BrokerError::Serialization(e.to_string()))
    }
}

/// A message that could not be processed, as appended to a `.dlq` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub original_topic: String,
    pub original_offset: i64,
    pub error: String,
    /// Raw payload, lossily decoded as UTF-8.
    pub payload: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(original_topic: &str, original_offset: i64, payload: &[u8], error: &str) -> Self {
        Self {
            original_topic: original_topic.to_string(),
            original_offset,
            error: error.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            failed_at: Utc::now(),
        }
    }

    pub fn dlq_topic(original_topic: &str) -> String {
        format!("{}.dlq", original_topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_shape() {
        let event = OrderEvent::StatusChanged {
            order_id: 7,
            number: 3,
            from: OrderStatus::Preparing,
            to: OrderStatus::Ready,
            changed_by: Some("kitchen-a".to_string()),
            notes: None,
        };
        let envelope = EventEnvelope::new(event.clone(), Some("req-1".to_string()));
        assert_eq!(envelope.topic, topics::ORDER_STATUS_CHANGED);

        let json: serde_json::Value = serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(json["event"]["kind"], "status_changed");
        assert_eq!(json["event"]["to"], "ready");
        assert_eq!(json["correlation_id"], "req-1");

        let decoded = EventEnvelope::from_slice(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.event, event);
    }

    #[test]
    fn test_malformed_payload_is_serialization_error() {
        let err = EventEnvelope::from_slice(b"{not json").unwrap_err();
        assert!(matches!(err, BrokerError::Serialization(_)));
    }

    #[test]
    fn test_dead_letter_keeps_raw_payload() {
        let letter = DeadLetter::new(topics::ORDER_STATUS_CHANGED, 12, b"garbage", "bad json");
        assert_eq!(letter.payload, "garbage");
        assert_eq!(
            DeadLetter::dlq_topic(topics::ORDER_STATUS_CHANGED),
            topics::ORDER_STATUS_CHANGED_DLQ
        );
    }
}
