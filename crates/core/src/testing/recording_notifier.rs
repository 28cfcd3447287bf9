//! Notifier that records what it was asked to send.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::notify::{Notification, Notifier, NotifyError};

/// Mock implementation of the Notifier trait.
///
/// Records every successful notification and can be told to fail, or to
/// hang forever on, the next N calls.
///
/// # Example
///
/// ```rust,ignore
/// use pizzeria_core::testing::RecordingNotifier;
///
/// let notifier = Arc::new(RecordingNotifier::new());
/// notifier.fail_next(1);
/// // first delivery fails, the redelivery is recorded
/// assert_eq!(notifier.count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failures_left: AtomicU32,
    stalls_left: AtomicU32,
    calls: AtomicU32,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls with a delivery error.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Never return from the next `n` calls, like a send cut off by a crash.
    pub fn stall_next(&self, n: u32) {
        self.stalls_left.store(n, Ordering::SeqCst);
    }

    /// Successful notifications so far.
    pub fn count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }

    /// Every call, failed or not.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let stalling = self
            .stalls_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stalling {
            std::future::pending::<()>().await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(NotifyError::Delivery("simulated failure".to_string()));
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification.clone());
        }
        Ok(())
    }
}
