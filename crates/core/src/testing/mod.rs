//! Testing utilities shared by unit and integration tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use pizzeria_core::testing::{fixtures, RecordingNotifier};
//!
//! let request = fixtures::dine_in_request("Ada", 4);
//! let notifier = RecordingNotifier::new();
//! ```

mod faulty_stores;
mod recording_notifier;

pub use faulty_stores::{FaultyOrderStore, FaultyWorkerRegistry};
pub use recording_notifier::RecordingNotifier;

/// Test fixtures and helper functions.
pub mod fixtures {
    use rust_decimal::Decimal;

    use crate::intake::PlaceOrderRequest;
    use crate::order::{Destination, NewOrderItem};

    /// One Margherita at 9.50.
    pub fn margherita() -> NewOrderItem {
        NewOrderItem::new("Margherita", 1, Decimal::new(950, 2))
    }

    /// A single-pizza dine-in order.
    pub fn dine_in_request(customer: &str, table_number: u32) -> PlaceOrderRequest {
        PlaceOrderRequest {
            customer_name: customer.to_string(),
            destination: Destination::DineIn { table_number },
            items: vec![margherita()],
            priority: None,
        }
    }

    /// A two-item delivery order.
    pub fn delivery_request(customer: &str, address: &str) -> PlaceOrderRequest {
        PlaceOrderRequest {
            customer_name: customer.to_string(),
            destination: Destination::Delivery {
                address: address.to_string(),
            },
            items: vec![
                margherita(),
                NewOrderItem::new("Pepperoni", 2, Decimal::new(1250, 2)),
            ],
            priority: None,
        }
    }

    /// Large enough to get the top derived priority.
    pub fn party_request(customer: &str, table_number: u32) -> PlaceOrderRequest {
        PlaceOrderRequest {
            customer_name: customer.to_string(),
            destination: Destination::DineIn { table_number },
            items: vec![NewOrderItem::new("Quattro Stagioni", 10, Decimal::new(1450, 2))],
            priority: None,
        }
    }
}
