//! Order tracking: read-only views over the order store and the worker
//! registry. Worker liveness is always recomputed from `last_seen`.

mod service;
mod types;

pub use service::TrackingService;
pub use types::{OrderPage, OrderRef, OrderView, TrackingError};
