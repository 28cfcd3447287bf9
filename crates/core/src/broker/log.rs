//! Append-only message log abstraction.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Debug, Error)]
pub enum BrokerError {
    /// Transient failure. Safe to retry.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("broker operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("message serialization failed: {0}")]
    Serialization(String),

    #[error("broker storage error: {0}")]
    Storage(String),
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::Unavailable(_) | BrokerError::Timeout(_) => ErrorKind::BrokerUnavailable,
            BrokerError::Serialization(_) | BrokerError::Storage(_) => ErrorKind::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Unavailable(_) | BrokerError::Timeout(_))
    }
}

impl From<rusqlite::Error> for BrokerError {
    fn from(err: rusqlite::Error) -> Self {
        if crate::db::is_transient(&err) {
            BrokerError::Unavailable(err.to_string())
        } else {
            BrokerError::Storage(err.to_string())
        }
    }
}

/// One stored message.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Position in the log. Strictly increasing across all topics.
    pub offset: i64,
    pub topic: String,
    pub payload: Vec<u8>,
    pub appended_at: DateTime<Utc>,
}

/// Durable, ordered message storage with per-consumer-group offsets.
///
/// Offsets start at 1; a committed offset of 0 means nothing was consumed.
pub trait MessageLog: Send + Sync {
    /// Append a message and return its offset.
    fn append(&self, topic: &str, payload: &[u8]) -> Result<i64, BrokerError>;

    /// Up to `limit` messages of `topic` with an offset greater than `after`.
    fn read_after(&self, topic: &str, after: i64, limit: usize)
        -> Result<Vec<LogRecord>, BrokerError>;

    /// Highest offset in `topic`, or 0 when it is empty.
    fn latest_offset(&self, topic: &str) -> Result<i64, BrokerError>;

    fn committed_offset(&self, group: &str, topic: &str) -> Result<i64, BrokerError>;

    /// Record consumption up to `offset`. Never moves a group backwards.
    fn commit_offset(&self, group: &str, topic: &str, offset: i64) -> Result<(), BrokerError>;

    /// Forget a consumer group's offset on `topic`.
    fn drop_group(&self, group: &str, topic: &str) -> Result<(), BrokerError>;

    /// Delete messages appended before `cutoff` that every group on their
    /// topic has committed. Topics without groups are left alone, and the
    /// newest message of each topic is kept so `latest_offset` holds.
    /// Returns the number of messages deleted.
    fn prune_consumed(&self, cutoff: DateTime<Utc>) -> Result<usize, BrokerError>;
}
