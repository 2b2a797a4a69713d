use crate::common::model::config::ConsumerConfig;
use crate::common::model::sample::Sample;
use crate::errors::Result;
use crate::queue::MessageSource;
use crate::store::{BulkLoader, RowSink};
use crate::utils::connection::{ConnectionGuard, Connector};
use crate::utils::shutdown::Shutdown;
use log::{debug, error, info};
use metrics::counter;
use std::time::Duration;

/// When a batch is complete enough to flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    /// Upper bound of samples per flush.
    pub max_batch_size: usize,
    /// Consecutive empty polls that close a batch.
    pub max_idle_polls: u32,
    /// Bounded wait of one poll.
    pub poll_timeout: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            max_idle_polls: 2,
            poll_timeout: Duration::from_secs(1),
        }
    }
}

impl From<&ConsumerConfig> for BatchPolicy {
    fn from(config: &ConsumerConfig) -> Self {
        Self {
            max_batch_size: config.batch_size.max(1),
            max_idle_polls: config.max_idle_polls.max(1),
            poll_timeout: config.poll_timeout(),
        }
    }
}

/// Drains the queue in batches and hands every batch to the [`BulkLoader`].
///
/// A batch is flushed when it holds `max_batch_size` samples or after
/// `max_idle_polls` consecutive empty polls. Offsets are committed by the queue client
/// on its own schedule, so a crash between poll and flush replays messages.
pub struct ConsumerLoop<Q, S>
where
    Q: Connector,
    Q::Conn: MessageSource,
    S: Connector,
    S::Conn: RowSink,
{
    source: ConnectionGuard<Q>,
    loader: BulkLoader<S>,
    topic: String,
    policy: BatchPolicy,
}

impl<Q, S> ConsumerLoop<Q, S>
where
    Q: Connector,
    Q::Conn: MessageSource,
    S: Connector,
    S::Conn: RowSink,
{
    pub fn new(
        source: Q,
        loader: BulkLoader<S>,
        topic: impl Into<String>,
        policy: BatchPolicy,
    ) -> Self {
        Self {
            source: ConnectionGuard::new(source),
            loader,
            topic: topic.into(),
            policy,
        }
    }

    /// Consumes until `shutdown` fires or an error occurs. Both connections are closed
    /// before returning.
    pub async fn run(mut self, mut shutdown: Shutdown) -> Result<()> {
        info!(
            "Consumer loop started on topic {} (batch size {}, idle threshold {})",
            self.topic, self.policy.max_batch_size, self.policy.max_idle_polls
        );
        let result = self.consume(&mut shutdown).await;
        self.source.close().await;
        self.loader.close().await;
        match &result {
            Ok(()) => info!("Consumer loop on topic {} stopped", self.topic),
            Err(e) => error!("Consumer loop on topic {} terminated: {}", self.topic, e),
        }
        result
    }

    async fn consume(&mut self, shutdown: &mut Shutdown) -> Result<()> {
        // both ends connect before the first poll: a missing topic or table fails at
        // startup, before any message is taken off the queue
        if let Err(e) = self.source.get().await {
            error!("Cannot subscribe to topic {}: {}", self.topic, e);
            return Err(e);
        }
        self.loader.connect().await?;
        loop {
            let batch = self.next_batch(shutdown).await?;
            // the flush runs to completion even when shutdown fired during the batch
            self.loader.flush(&batch).await?;
            if shutdown.is_shutdown() {
                if !batch.is_empty() {
                    info!("Flushed final batch of {} samples before stopping", batch.len());
                }
                return Ok(());
            }
        }
    }

    /// Polls until the batch is full, the idle threshold is reached, or shutdown is
    /// signalled. A cancelled batch is returned as collected so far.
    pub async fn next_batch(&mut self, shutdown: &mut Shutdown) -> Result<Vec<Sample>> {
        let mut batch = Vec::with_capacity(self.policy.max_batch_size);
        let mut idle_polls = 0;

        while batch.len() < self.policy.max_batch_size && idle_polls < self.policy.max_idle_polls {
            let remaining = self.policy.max_batch_size - batch.len();
            let source = match self.source.get().await {
                Ok(source) => source,
                Err(e) => {
                    error!("Cannot reconnect to topic {}: {}", self.topic, e);
                    return Err(e);
                }
            };

            let polled = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    debug!("Shutdown during poll, closing batch of {} samples", batch.len());
                    break;
                }
                polled = source.poll(remaining, self.policy.poll_timeout) => polled,
            };

            let records = match polled {
                Ok(records) => records,
                Err(e) => {
                    error!("Poll on topic {} failed: {}", self.topic, e);
                    counter!("consumer_polls_total", "result" => "error").increment(1);
                    self.source.invalidate();
                    return Err(e);
                }
            };

            if records.is_empty() {
                idle_polls += 1;
                counter!("consumer_polls_total", "result" => "empty").increment(1);
                continue;
            }
            idle_polls = 0;
            counter!("consumer_polls_total", "result" => "records").increment(1);

            for raw in records.into_iter().take(remaining) {
                match Sample::from_payload(&raw) {
                    Ok(sample) => batch.push(sample),
                    Err(e) => {
                        error!(
                            "Malformed message on topic {}: {} (payload: {})",
                            self.topic,
                            e,
                            String::from_utf8_lossy(&raw)
                        );
                        return Err(e);
                    }
                }
            }
        }

        debug!(
            "Batch closed with {} samples after {} idle polls",
            batch.len(),
            idle_polls
        );
        Ok(batch)
    }
}
