//! Stable error kinds shared by every service boundary.
//!
//! Callers react to the kind; the message is for humans and logs.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input, rejected before anything was written.
    Validation,
    /// The state machine refused the requested status change.
    InvalidTransition,
    NotFound,
    /// Lost a race for an order. Callers try the next one.
    ClaimConflict,
    StoreUnavailable,
    BrokerUnavailable,
    /// A worker stopped heartbeating and its claims were released.
    WorkerTimeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ClaimConflict => "claim_conflict",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::BrokerUnavailable => "broker_unavailable",
            ErrorKind::WorkerTimeout => "worker_timeout",
            ErrorKind::Internal => "internal",
        }
    }

    /// Transient infrastructure failures worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::StoreUnavailable | ErrorKind::BrokerUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(ErrorKind::Validation.as_str(), "validation");
        assert_eq!(
            serde_json::to_string(&ErrorKind::InvalidTransition).unwrap(),
            "\"invalid_transition\""
        );
        assert_eq!(ErrorKind::WorkerTimeout.to_string(), "worker_timeout");
    }

    #[test]
    fn test_transient_kinds() {
        assert!(ErrorKind::StoreUnavailable.is_transient());
        assert!(ErrorKind::BrokerUnavailable.is_transient());
        assert!(!ErrorKind::Validation.is_transient());
    }
}
