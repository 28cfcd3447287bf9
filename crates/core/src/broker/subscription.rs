//! Consumer-group subscriptions over a message log.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::debug;

use super::events::EventEnvelope;
use super::log::{BrokerError, LogRecord, MessageLog};
use super::run_blocking;
use crate::config::BrokerConfig;

/// Where a group with no committed offset starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// From the beginning of the topic.
    Earliest,
    /// Only messages appended after the first read.
    Latest,
}

/// One message handed to a consumer. Must be acked or nacked.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub offset: i64,
    pub topic: String,
    pub payload: Vec<u8>,
    /// 1 on first delivery, incremented on every redelivery.
    pub attempt: u32,
    pub appended_at: DateTime<Utc>,
}

impl Delivery {
    pub fn decode(&self) -> Result<EventEnvelope, BrokerError> {
        EventEnvelope::from_slice(&self.payload)
    }
}

/// At-least-once reader for one (group, topic) pair.
///
/// Messages are handed out in offset order. Acking commits the group offset;
/// nacking rewinds so the message is redelivered after a backoff.
pub struct Subscription {
    log: Arc<dyn MessageLog>,
    group: String,
    topic: String,
    config: BrokerConfig,
    start: StartPosition,
    cursor: Option<i64>,
    buffer: VecDeque<LogRecord>,
    attempts: HashMap<i64, u32>,
    resume_at: Option<Instant>,
}

impl Subscription {
    pub(crate) fn new(
        log: Arc<dyn MessageLog>,
        group: &str,
        topic: &str,
        config: BrokerConfig,
        start: StartPosition,
    ) -> Self {
        Self {
            log,
            group: group.to_string(),
            topic: topic.to_string(),
            config,
            start,
            cursor: None,
            buffer: VecDeque::new(),
            attempts: HashMap::new(),
            resume_at: None,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    async fn starting_offset(&self) -> Result<i64, BrokerError> {
        let group = self.group.clone();
        let topic = self.topic.clone();
        let start = self.start;
        run_blocking(&self.log, self.config.publish_timeout(), move |log| {
            let committed = log.committed_offset(&group, &topic)?;
            match start {
                StartPosition::Earliest => Ok(committed),
                StartPosition::Latest if committed > 0 => Ok(committed),
                StartPosition::Latest => log.latest_offset(&topic),
            }
        })
        .await
    }

    async fn fill(&mut self) -> Result<(), BrokerError> {
        let cursor = match self.cursor {
            Some(cursor) => cursor,
            None => {
                let start = self.starting_offset().await?;
                self.cursor = Some(start);
                start
            }
        };

        let topic = self.topic.clone();
        let limit = self.config.batch_size.max(1);
        let records = run_blocking(&self.log, self.config.publish_timeout(), move |log| {
            log.read_after(&topic, cursor, limit)
        })
        .await?;

        self.buffer.extend(records);
        Ok(())
    }

    /// The next message if one is available right now.
    pub async fn try_next(&mut self) -> Result<Option<Delivery>, BrokerError> {
        if let Some(at) = self.resume_at {
            if Instant::now() < at {
                return Ok(None);
            }
            self.resume_at = None;
        }

        if self.buffer.is_empty() {
            if let Err(e) = self.fill().await {
                self.resume_at = Some(Instant::now() + self.config.poll_interval());
                return Err(e);
            }
        }

        let Some(record) = self.buffer.pop_front() else {
            return Ok(None);
        };

        self.cursor = Some(record.offset);
        let attempt = self.attempts.entry(record.offset).or_insert(0);
        *attempt += 1;

        Ok(Some(Delivery {
            offset: record.offset,
            topic: record.topic,
            payload: record.payload,
            attempt: *attempt,
            appended_at: record.appended_at,
        }))
    }

    /// Wait for the next message, polling the log.
    pub async fn next(&mut self) -> Result<Delivery, BrokerError> {
        loop {
            if let Some(at) = self.resume_at {
                tokio::time::sleep_until(at).await;
            }
            match self.try_next().await? {
                Some(delivery) => return Ok(delivery),
                None => tokio::time::sleep(self.config.poll_interval()).await,
            }
        }
    }

    /// Mark `delivery` consumed for this group.
    pub async fn ack(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        let group = self.group.clone();
        let topic = self.topic.clone();
        let offset = delivery.offset;
        run_blocking(&self.log, self.config.publish_timeout(), move |log| {
            log.commit_offset(&group, &topic, offset)
        })
        .await?;

        self.attempts.remove(&offset);
        Ok(())
    }

    /// Give `delivery` back; it is redelivered after a backoff.
    pub fn nack(&mut self, delivery: &Delivery) {
        let delay = self.config.retry.delay_for_attempt(delivery.attempt);
        debug!(
            group = %self.group,
            topic = %self.topic,
            offset = delivery.offset,
            attempt = delivery.attempt,
            delay_ms = delay.as_millis() as u64,
            "Message nacked, will redeliver"
        );

        self.buffer.clear();
        self.cursor = Some(delivery.offset - 1);
        self.resume_at = Some(Instant::now() + delay);
    }
}
