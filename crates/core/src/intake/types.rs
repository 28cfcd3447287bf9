//! Request and error types for order intake.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::order::{Destination, NewOrderItem, StoreError};

pub const MAX_CUSTOMER_NAME_LEN: usize = 100;
pub const MAX_TABLE_NUMBER: u32 = 100;
pub const MIN_ADDRESS_LEN: usize = 10;
pub const MAX_ITEMS: usize = 20;
pub const MAX_ITEM_NAME_LEN: usize = 50;
pub const MAX_QUANTITY: u32 = 10;
pub const MAX_PRIORITY: i32 = 100;

/// Highest accepted unit price, 999.99.
pub fn max_item_price() -> Decimal {
    Decimal::new(99_999, 2)
}

/// A new order as submitted by a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub customer_name: String,
    #[serde(flatten)]
    pub destination: Destination,
    pub items: Vec<NewOrderItem>,
    /// Explicit priority. Derived from the total when absent.
    #[serde(default)]
    pub priority: Option<i32>,
}

/// Why a request was rejected. Nothing is written when validation fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("customer_name must not be empty")]
    EmptyCustomerName,

    #[error("customer_name must be at most {MAX_CUSTOMER_NAME_LEN} characters")]
    CustomerNameTooLong,

    #[error("table_number must be between 1 and {MAX_TABLE_NUMBER}, got {0}")]
    TableNumberOutOfRange(u32),

    #[error("delivery address must be at least {MIN_ADDRESS_LEN} characters")]
    AddressTooShort,

    #[error("an order must have between 1 and {MAX_ITEMS} items, got {0}")]
    ItemCount(usize),

    #[error("items[{0}]: name must not be empty")]
    EmptyItemName(usize),

    #[error("items[{0}]: name must be at most {MAX_ITEM_NAME_LEN} characters")]
    ItemNameTooLong(usize),

    #[error("items[{index}]: quantity must be between 1 and {MAX_QUANTITY}, got {quantity}")]
    QuantityOutOfRange { index: usize, quantity: u32 },

    #[error("items[{index}]: price must be between 0 and 999.99, got {price}")]
    PriceOutOfRange { index: usize, price: Decimal },

    #[error("priority must be between 0 and {MAX_PRIORITY}, got {0}")]
    PriorityOutOfRange(i32),
}

impl ValidationError {
    /// The request field the error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::EmptyCustomerName | ValidationError::CustomerNameTooLong => {
                "customer_name"
            }
            ValidationError::TableNumberOutOfRange(_) => "table_number",
            ValidationError::AddressTooShort => "address",
            ValidationError::ItemCount(_) => "items",
            ValidationError::EmptyItemName(_) | ValidationError::ItemNameTooLong(_) => "name",
            ValidationError::QuantityOutOfRange { .. } => "quantity",
            ValidationError::PriceOutOfRange { .. } => "price",
            ValidationError::PriorityOutOfRange(_) => "priority",
        }
    }
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("invalid order: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntakeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IntakeError::Validation(_) => ErrorKind::Validation,
            IntakeError::Store(e) => e.kind(),
            IntakeError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, IntakeError::Store(e) if e.is_transient())
    }
}
