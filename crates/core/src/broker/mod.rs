//! Topic-based message broker over an append-only log.
//!
//! Publishing appends to the log; consumers read through [`Subscription`]s
//! that track a committed offset per consumer group. Delivery is
//! at-least-once, so consumers must be idempotent.

mod events;
mod log;
mod memory;
mod sqlite;
mod subscription;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{BrokerBackend, BrokerConfig};
use crate::metrics;
use crate::retry::retry_with_backoff;

pub use events::{topics, DeadLetter, EventEnvelope, OrderEvent};
pub use log::{BrokerError, LogRecord, MessageLog};
pub use memory::MemoryMessageLog;
pub use sqlite::SqliteMessageLog;
pub use subscription::{Delivery, StartPosition, Subscription};

/// Run a log call off the async runtime, bounded by `deadline`.
pub(crate) async fn run_blocking<T, F>(
    log: &Arc<dyn MessageLog>,
    deadline: Duration,
    f: F,
) -> Result<T, BrokerError>
where
    F: FnOnce(&dyn MessageLog) -> Result<T, BrokerError> + Send + 'static,
    T: Send + 'static,
{
    let log = Arc::clone(log);
    match tokio::time::timeout(deadline, tokio::task::spawn_blocking(move || f(log.as_ref())))
        .await
    {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(BrokerError::Storage(format!("blocking task failed: {}", e))),
        Err(_) => Err(BrokerError::Timeout(deadline)),
    }
}

/// Handle for publishing and subscribing. Cheap to clone.
#[derive(Clone)]
pub struct Broker {
    log: Arc<dyn MessageLog>,
    config: BrokerConfig,
}

impl Broker {
    pub fn new(log: Arc<dyn MessageLog>, config: BrokerConfig) -> Self {
        Self { log, config }
    }

    /// Open the log selected by `config.backend`.
    pub fn open(
        config: &BrokerConfig,
        db_path: &std::path::Path,
        busy_timeout: Duration,
    ) -> Result<Self, BrokerError> {
        let log: Arc<dyn MessageLog> = match config.backend {
            BrokerBackend::Sqlite => {
                Arc::new(SqliteMessageLog::with_busy_timeout(db_path, busy_timeout)?)
            }
            BrokerBackend::Memory => Arc::new(MemoryMessageLog::new()),
        };
        Ok(Self::new(log, config.clone()))
    }

    /// In-process broker with default settings.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryMessageLog::new()), BrokerConfig::default())
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn log(&self) -> Arc<dyn MessageLog> {
        Arc::clone(&self.log)
    }

    /// Append a raw payload, retrying transient failures.
    pub async fn publish_raw(&self, topic: &str, payload: Vec<u8>) -> Result<i64, BrokerError> {
        let payload = &payload;
        let deadline = self.config.publish_timeout();

        let result = retry_with_backoff(
            &self.config.retry,
            "publish",
            BrokerError::is_transient,
            move || {
                let topic = topic.to_string();
                let payload = payload.clone();
                run_blocking(&self.log, deadline, move |log| log.append(&topic, &payload))
            },
        )
        .await;

        match &result {
            Ok(offset) => {
                metrics::EVENTS_PUBLISHED.with_label_values(&[topic]).inc();
                debug!(topic, offset, "Published message");
            }
            Err(e) => {
                metrics::PUBLISH_FAILURES.with_label_values(&[topic]).inc();
                warn!(topic, "Publish failed: {}", e);
            }
        }

        result
    }

    pub async fn publish(&self, envelope: &EventEnvelope) -> Result<i64, BrokerError> {
        let payload = envelope.to_bytes()?;
        self.publish_raw(&envelope.topic, payload).await
    }

    /// Wrap `event` in an envelope and publish it.
    pub async fn publish_event(
        &self,
        event: OrderEvent,
        correlation_id: Option<String>,
    ) -> Result<EventEnvelope, BrokerError> {
        let envelope = EventEnvelope::new(event, correlation_id);
        self.publish(&envelope).await?;
        Ok(envelope)
    }

    /// Forget `group`'s offset on `topic`. For groups that will not come back.
    pub async fn drop_group(&self, group: &str, topic: &str) -> Result<(), BrokerError> {
        let group = group.to_string();
        let topic = topic.to_string();
        run_blocking(&self.log, self.config.publish_timeout(), move |log| {
            log.drop_group(&group, &topic)
        })
        .await
    }

    /// Delete messages every group has consumed and that are older than the
    /// configured retention.
    pub async fn prune_consumed(&self) -> Result<usize, BrokerError> {
        let retention = chrono::Duration::from_std(self.config.retention())
            .unwrap_or_else(|_| chrono::Duration::days(365));
        let cutoff = chrono::Utc::now() - retention;
        let pruned = run_blocking(&self.log, self.config.publish_timeout(), move |log| {
            log.prune_consumed(cutoff)
        })
        .await?;
        if pruned > 0 {
            debug!(pruned, "Pruned consumed messages");
        }
        Ok(pruned)
    }

    /// Subscribe `group` to `topic`, resuming from its committed offset.
    pub fn subscribe(&self, group: &str, topic: &str) -> Subscription {
        Subscription::new(
            Arc::clone(&self.log),
            group,
            topic,
            self.config.clone(),
            StartPosition::Earliest,
        )
    }

    /// Like [`Broker::subscribe`], but a new group skips the backlog.
    pub fn subscribe_from_latest(&self, group: &str, topic: &str) -> Subscription {
        Subscription::new(
            Arc::clone(&self.log),
            group,
            topic,
            self.config.clone(),
            StartPosition::Latest,
        )
    }
}
