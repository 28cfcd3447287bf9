//! Worker records and derived liveness.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order::ParseEnumError;

/// Worker type recorded for kitchen workers.
pub const KITCHEN_WORKER_TYPE: &str = "kitchen_worker";

/// Stored worker status. Only a hint: liveness is decided by `last_seen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Online,
    Offline,
    Busy,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Online => "online",
            WorkerStatus::Offline => "offline",
            WorkerStatus::Busy => "busy",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "online" => Ok(WorkerStatus::Online),
            "offline" => Ok(WorkerStatus::Offline),
            "busy" => Ok(WorkerStatus::Busy),
            other => Err(ParseEnumError {
                kind: "worker status",
                value: other.to_string(),
            }),
        }
    }
}

/// A registered worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: i64,
    pub name: String,
    pub worker_type: String,
    pub status: WorkerStatus,
    pub last_seen: DateTime<Utc>,
    pub orders_processed: i64,
    pub created_at: DateTime<Utc>,
}

impl WorkerRecord {
    /// True while the last heartbeat is within `window` of `now`.
    pub fn is_live(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match (now - self.last_seen).to_std() {
            Ok(silence) => silence <= window,
            // last_seen in the future (clock skew between processes)
            Err(_) => true,
        }
    }
}

/// A worker record with its status recomputed at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHealth {
    #[serde(flatten)]
    pub record: WorkerRecord,
    pub effective_status: WorkerStatus,
    pub seconds_since_seen: i64,
}

impl WorkerHealth {
    pub fn derive(record: WorkerRecord, now: DateTime<Utc>, window: Duration) -> Self {
        let effective_status = if record.is_live(now, window) {
            record.status
        } else {
            WorkerStatus::Offline
        };
        let seconds_since_seen = (now - record.last_seen).num_seconds().max(0);

        Self {
            record,
            effective_status,
            seconds_since_seen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: WorkerStatus, last_seen: DateTime<Utc>) -> WorkerRecord {
        WorkerRecord {
            id: 1,
            name: "kitchen-a".to_string(),
            worker_type: KITCHEN_WORKER_TYPE.to_string(),
            status,
            last_seen,
            orders_processed: 0,
            created_at: last_seen,
        }
    }

    #[test]
    fn test_stale_worker_is_offline_regardless_of_stored_status() {
        let now = Utc::now();
        let stale = record(WorkerStatus::Online, now - chrono::Duration::seconds(31));
        let health = WorkerHealth::derive(stale, now, Duration::from_secs(30));
        assert_eq!(health.effective_status, WorkerStatus::Offline);
        assert_eq!(health.record.status, WorkerStatus::Online);
        assert_eq!(health.seconds_since_seen, 31);
    }

    #[test]
    fn test_live_worker_keeps_stored_status() {
        let now = Utc::now();
        let busy = record(WorkerStatus::Busy, now - chrono::Duration::seconds(5));
        let health = WorkerHealth::derive(busy, now, Duration::from_secs(30));
        assert_eq!(health.effective_status, WorkerStatus::Busy);
    }

    #[test]
    fn test_future_heartbeat_counts_as_live() {
        let now = Utc::now();
        let skewed = record(WorkerStatus::Online, now + chrono::Duration::seconds(2));
        assert!(skewed.is_live(now, Duration::from_secs(1)));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("busy".parse::<WorkerStatus>().unwrap(), WorkerStatus::Busy);
        assert!("sleeping".parse::<WorkerStatus>().is_err());
    }
}
