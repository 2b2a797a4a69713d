//! Queue plumbing between the samplers and the store.
//!
//! Backends implement [`MessageSink`] (publish side) and [`MessageSource`] (consume
//! side). The [`Publisher`] and the [`ConsumerLoop`] hold their backend connection in a
//! [`ConnectionGuard`](crate::utils::connection::ConnectionGuard).

pub mod consumer;
pub mod kafka;
pub mod memory;
pub mod publisher;

pub use consumer::{BatchPolicy, ConsumerLoop};
pub use kafka::{KafkaConsumerConnector, KafkaProducerConnector};
pub use memory::{MemoryConnector, MemoryQueue};
pub use publisher::Publisher;

use crate::errors::Result;
use async_trait::async_trait;
use std::time::Duration;


/// Publish side of a queue.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Sends one message and returns once the broker acknowledged it. No key, no
    /// headers.
    async fn send(&self, payload: &[u8]) -> Result<()>;
}

/// Consume side of a queue.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Waits at most `timeout` for the first message, then returns it together with
    /// whatever else is already available, never more than `max_records`. An empty
    /// vector means the wait elapsed.
    async fn poll(&self, max_records: usize, timeout: Duration) -> Result<Vec<Vec<u8>>>;
}
