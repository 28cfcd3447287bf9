//! Kitchen worker identities and heartbeats.

mod registry;
mod sqlite_registry;
mod types;

pub use registry::{WorkerError, WorkerRegistry};
pub use sqlite_registry::SqliteWorkerRegistry;
pub use types::{WorkerHealth, WorkerRecord, WorkerStatus, KITCHEN_WORKER_TYPE};
