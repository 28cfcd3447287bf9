//! Core order data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a stored or user-supplied enum value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

// ============================================================================
// Order type and destination
// ============================================================================

/// How the order leaves the kitchen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    DineIn,
    Delivery,
}

impl OrderType {
    pub const ALL: [OrderType; 2] = [OrderType::DineIn, OrderType::Delivery];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::DineIn => "dine_in",
            OrderType::Delivery => "delivery",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "dine_in" => Ok(OrderType::DineIn),
            "delivery" => Ok(OrderType::Delivery),
            other => Err(ParseEnumError {
                kind: "order type",
                value: other.to_string(),
            }),
        }
    }
}

/// Where the order goes. Exactly one of table or address exists by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Destination {
    DineIn { table_number: u32 },
    Delivery { address: String },
}

impl Destination {
    pub fn order_type(&self) -> OrderType {
        match self {
            Destination::DineIn { .. } => OrderType::DineIn,
            Destination::Delivery { .. } => OrderType::Delivery,
        }
    }

    pub fn table_number(&self) -> Option<u32> {
        match self {
            Destination::DineIn { table_number } => Some(*table_number),
            Destination::Delivery { .. } => None,
        }
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            Destination::DineIn { .. } => None,
            Destination::Delivery { address } => Some(address),
        }
    }
}

// ============================================================================
// Order status
// ============================================================================

/// Lifecycle status of an order. See `state_machine` for the legal edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Received,
    Preparing,
    Ready,
    OutForDelivery,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Received,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::OutForDelivery,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Received => "received",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled orders accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// States in which a kitchen worker holds the order.
    pub fn is_claimed(&self) -> bool {
        matches!(
            self,
            OrderStatus::Preparing | OrderStatus::Ready | OrderStatus::OutForDelivery
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| ParseEnumError {
                kind: "order status",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// Records
// ============================================================================

/// A customer order as persisted by the order store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    /// Human-facing sequential number.
    pub number: i64,
    pub customer_name: String,
    pub destination: Destination,
    pub total_amount: Decimal,
    /// Higher is served first.
    pub priority: i32,
    pub status: OrderStatus,
    /// Worker currently (or last) processing the order.
    pub processed_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn order_type(&self) -> OrderType {
        self.destination.order_type()
    }
}

/// A line of an order. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub name: String,
    pub quantity: u32,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// An item as submitted with a new order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub name: String,
    pub quantity: u32,
    pub price: Decimal,
}

impl NewOrderItem {
    pub fn new(name: impl Into<String>, quantity: u32, price: Decimal) -> Self {
        Self {
            name: name.into(),
            quantity,
            price,
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// One row of the append-only status log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusLogEntry {
    pub id: i64,
    pub order_id: i64,
    /// The status transitioned to.
    pub status: OrderStatus,
    pub changed_by: Option<String>,
    pub notes: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// An order together with its items and status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub history: Vec<StatusLogEntry>,
}

/// A committed status change: the order as written and the status it left,
/// both read inside the same transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub order: Order,
    pub from: OrderStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("baking".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&OrderStatus::OutForDelivery).unwrap();
        assert_eq!(json, "\"out_for_delivery\"");
    }

    #[test]
    fn test_destination_determines_type() {
        let dine_in = Destination::DineIn { table_number: 4 };
        assert_eq!(dine_in.order_type(), OrderType::DineIn);
        assert_eq!(dine_in.table_number(), Some(4));
        assert_eq!(dine_in.address(), None);

        let delivery = Destination::Delivery {
            address: "12 Baker Street".to_string(),
        };
        assert_eq!(delivery.order_type(), OrderType::Delivery);
        assert_eq!(delivery.table_number(), None);
        assert_eq!(delivery.address(), Some("12 Baker Street"));
    }

    #[test]
    fn test_destination_serialization_is_tagged() {
        let json = serde_json::to_value(Destination::DineIn { table_number: 7 }).unwrap();
        assert_eq!(json["type"], "dine_in");
        assert_eq!(json["table_number"], 7);
    }

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Ready.is_terminal());
    }

    #[test]
    fn test_line_total() {
        let item = NewOrderItem::new("Margherita", 3, Decimal::new(950, 2));
        assert_eq!(item.line_total(), Decimal::new(2850, 2));
    }

    #[test]
    fn test_order_type_parse() {
        assert_eq!("dine_in".parse::<OrderType>().unwrap(), OrderType::DineIn);
        assert_eq!(" delivery ".parse::<OrderType>().unwrap(), OrderType::Delivery);
        let err = "takeout".parse::<OrderType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown order type: takeout");
    }
}
