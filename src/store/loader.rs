use crate::common::model::config::is_sql_identifier;
use crate::common::model::sample::Sample;
use crate::errors::{DataStoreError, Result};
use crate::store::RowSink;
use crate::store::copy::{copy_statement, encode_rows};
use crate::utils::connection::{ConnectionGuard, Connector};
use log::{debug, error, info};
use metrics::counter;

/// Writes a batch of samples to the store in a single COPY round trip.
pub struct BulkLoader<C>
where
    C: Connector,
    C::Conn: RowSink,
{
    guard: ConnectionGuard<C>,
    table: String,
    statement: String,
}

impl<C> BulkLoader<C>
where
    C: Connector,
    C::Conn: RowSink,
{
    pub fn new(connector: C, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        if !is_sql_identifier(&table) {
            return Err(DataStoreError::InvalidTableName(table).into());
        }
        Ok(Self {
            guard: ConnectionGuard::new(connector),
            statement: copy_statement(&table),
            table,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Opens the store connection ahead of the first batch, so a missing table is
    /// reported before anything is consumed.
    pub async fn connect(&mut self) -> Result<()> {
        match self.guard.get().await {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Cannot connect to the store for {}: {}", self.table, e);
                Err(e)
            }
        }
    }

    /// Loads `batch` and returns the number of rows written. An empty batch does not
    /// touch the store. On failure the batch is logged, the connection dropped, and
    /// the error returned without retry.
    pub async fn flush(&mut self, batch: &[Sample]) -> Result<usize> {
        if batch.is_empty() {
            debug!("Empty batch, nothing to load into {}", self.table);
            return Ok(0);
        }

        let sink = match self.guard.get().await {
            Ok(sink) => sink,
            Err(e) => {
                error!(
                    "Cannot connect to the store, batch of {} samples not loaded into {}: {}; batch: {:?}",
                    batch.len(),
                    self.table,
                    e,
                    batch
                );
                return Err(e);
            }
        };

        match sink.copy_in(&self.statement, encode_rows(batch)).await {
            Ok(rows) => {
                counter!("batches_flushed_total").increment(1);
                counter!("rows_loaded_total").increment(rows);
                info!("Loaded {} samples into {}", rows, self.table);
                Ok(rows as usize)
            }
            Err(e) => {
                error!(
                    "Bulk load of {} samples into {} failed: {}; batch: {:?}",
                    batch.len(),
                    self.table,
                    e,
                    batch
                );
                self.guard.invalidate();
                Err(e)
            }
        }
    }

    pub async fn close(&mut self) {
        self.guard.close().await;
    }
}
