//! Order claiming and the liveness reaper.

mod coordinator;
mod reaper;

pub use coordinator::{ClaimCoordinator, ClaimError, ReleaseReason, WorkerCapabilities};
pub use reaper::{LivenessReaper, ReapReport, ReleasedOrder};
