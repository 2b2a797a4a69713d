//! Time-series store: COPY encoding of sample batches, the TimescaleDB connection,
//! table provisioning and the [`BulkLoader`].

pub mod copy;
pub mod loader;
pub mod provision;
pub mod timescale;

#[cfg(test)]
pub(crate) mod testing;

pub use loader::BulkLoader;
pub use timescale::{TimescaleConnector, TimescaleSink};

use crate::errors::Result;
use async_trait::async_trait;

/// Destination of a bulk load.
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Runs `statement` (a `COPY ... FROM STDIN`) streaming `payload` in one round
    /// trip. Returns the number of rows written.
    async fn copy_in(&self, statement: &str, payload: Vec<u8>) -> Result<u64>;
}
