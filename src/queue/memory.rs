use crate::errors::{QueueError, Result};
use crate::queue::{MessageSink, MessageSource};
use crate::utils::connection::Connector;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Bounded in-process queue used when samplers and consumer share one process.
#[derive(Clone)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

struct Inner {
    buffer: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
    capacity: usize,
}

impl MemoryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                buffer: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.inner
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer().is_empty()
    }

    fn drain(&self, max_records: usize) -> Vec<Vec<u8>> {
        let mut buffer = self.buffer();
        let take = buffer.len().min(max_records);
        buffer.drain(..take).collect()
    }
}

#[async_trait]
impl MessageSink for MemoryQueue {
    async fn send(&self, payload: &[u8]) -> Result<()> {
        {
            let mut buffer = self.buffer();
            if buffer.len() >= self.inner.capacity {
                return Err(QueueError::PushFailed(
                    format!("memory queue is full ({} messages)", self.inner.capacity).into(),
                )
                .into());
            }
            buffer.push_back(payload.to_vec());
        }
        self.inner.notify.notify_one();
        Ok(())
    }
}

#[async_trait]
impl MessageSource for MemoryQueue {
    async fn poll(&self, max_records: usize, timeout: Duration) -> Result<Vec<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        loop {
            let records = self.drain(max_records);
            if !records.is_empty() || max_records == 0 {
                return Ok(records);
            }
            // notify_one stores a permit, so a send between drain and here is not lost
            if tokio::time::timeout_at(deadline, self.inner.notify.notified())
                .await
                .is_err()
            {
                return Ok(Vec::new());
            }
        }
    }
}

/// Hands out handles to a shared [`MemoryQueue`].
#[derive(Clone)]
pub struct MemoryConnector {
    queue: MemoryQueue,
}

impl MemoryConnector {
    pub fn new(queue: MemoryQueue) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Conn = MemoryQueue;

    fn name(&self) -> &str {
        "memory queue"
    }

    async fn connect(&self) -> Result<MemoryQueue> {
        Ok(self.queue.clone())
    }
}
