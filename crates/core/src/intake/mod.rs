//! Order intake.
//!
//! Validates customer submissions, persists the order with its items and the
//! initial `received` log row in one transaction, then announces it on
//! `order.created`.

mod service;
mod types;

pub use service::{
    order_total, priority_for_total, validate_request, IntakeService, INTAKE_ACTOR,
};
pub use types::{max_item_price, IntakeError, PlaceOrderRequest, ValidationError};
