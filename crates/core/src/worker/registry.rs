//! Worker registry trait and errors.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{WorkerRecord, WorkerStatus};
use crate::error::ErrorKind;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// A live worker already uses this name.
    #[error("worker {0} is already online")]
    AlreadyOnline(String),

    #[error("worker not found: {0}")]
    NotFound(String),

    /// Transient failure (lock contention, I/O). Safe to retry.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(String),
}

impl WorkerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::AlreadyOnline(_) => ErrorKind::Validation,
            WorkerError::NotFound(_) => ErrorKind::NotFound,
            WorkerError::Unavailable(_) => ErrorKind::StoreUnavailable,
            WorkerError::Database(_) => ErrorKind::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, WorkerError::Unavailable(_))
    }
}

impl From<rusqlite::Error> for WorkerError {
    fn from(err: rusqlite::Error) -> Self {
        if crate::db::is_transient(&err) {
            WorkerError::Unavailable(err.to_string())
        } else {
            WorkerError::Database(err.to_string())
        }
    }
}

/// Storage for worker identities and heartbeats.
pub trait WorkerRegistry: Send + Sync {
    /// Register `name` as online.
    ///
    /// Fails with [`WorkerError::AlreadyOnline`] when a worker with that name
    /// is not marked offline and has heartbeated within `liveness_window`.
    fn register(
        &self,
        name: &str,
        worker_type: &str,
        liveness_window: Duration,
    ) -> Result<WorkerRecord, WorkerError>;

    /// Record a heartbeat at `at`. Revives an `offline` worker to `online`;
    /// any other stored status is left alone.
    fn heartbeat_at(&self, name: &str, at: DateTime<Utc>) -> Result<(), WorkerError>;

    fn heartbeat(&self, name: &str) -> Result<(), WorkerError> {
        self.heartbeat_at(name, Utc::now())
    }

    fn set_status(&self, name: &str, status: WorkerStatus) -> Result<(), WorkerError>;

    /// Bump `orders_processed` and return the worker to `online`.
    fn record_completion(&self, name: &str) -> Result<(), WorkerError>;

    fn mark_offline(&self, name: &str) -> Result<(), WorkerError> {
        self.set_status(name, WorkerStatus::Offline)
    }

    fn get(&self, name: &str) -> Result<Option<WorkerRecord>, WorkerError>;

    fn list(&self) -> Result<Vec<WorkerRecord>, WorkerError>;

    /// Workers whose last heartbeat is older than `cutoff`.
    fn stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<WorkerRecord>, WorkerError>;
}
