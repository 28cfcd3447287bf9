pub mod error;
pub mod handlers;
pub mod middleware;
pub mod orders;
pub mod routes;
pub mod workers;

pub use error::{ApiError, ErrorResponse};
pub use middleware::{RequestId, REQUEST_ID_HEADER};
pub use routes::create_router;
