//! Orders, their items, and the append-only status log.

mod sqlite_store;
pub mod state_machine;
mod store;
mod types;

pub use sqlite_store::SqliteOrderStore;
pub use state_machine::{
    next_kitchen_step, validate_history, validate_release, validate_transition, TransitionError,
};
pub use store::{CreateOrderRequest, OrderFilter, OrderStore, StoreError, TransitionRequest};
pub use types::{
    Destination, NewOrderItem, Order, OrderDetails, OrderItem, OrderStatus, OrderType,
    ParseEnumError, StatusChange, StatusLogEntry,
};
