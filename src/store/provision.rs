use crate::common::model::config::{DatabaseConfig, is_sql_identifier};
use crate::errors::{DataStoreError, Error, Result};
use crate::store::timescale::split_table_name;
use log::{info, warn};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, Statement};

/// Hypertable dimensions: `time` plus the `web_url` space partitioning.
pub const EXPECTED_DIMENSIONS: i64 = 2;

pub fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\
         time TIMESTAMPTZ NOT NULL, \
         web_url TEXT NOT NULL, \
         http_status SMALLINT NOT NULL, \
         resp_time DOUBLE PRECISION NOT NULL, \
         regex_match BOOLEAN NULL)"
    )
}

/// Enables TimescaleDB, creates the sample table and turns it into a hypertable
/// partitioned by `time` and `web_url`. Every step is idempotent.
pub async fn provision_table(db: &DatabaseConnection, config: &DatabaseConfig) -> Result<()> {
    if !is_sql_identifier(&config.table) {
        return Err(DataStoreError::InvalidTableName(config.table.clone()).into());
    }
    let partitions = i32::try_from(config.partitions)
        .map_err(|_| Error::invalid_value("db.partitions", "does not fit a 32-bit integer"))?;

    info!("Enabling the TimescaleDB extension");
    db.execute_unprepared("CREATE EXTENSION IF NOT EXISTS timescaledb")
        .await?;

    info!("Creating table {} if it does not exist", config.table);
    db.execute_unprepared(&create_table_sql(&config.table)).await?;

    info!(
        "Turning {} into a hypertable on time and web_url ({} partitions, chunks of {})",
        config.table, config.partitions, config.chunk_time_interval
    );
    db.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT create_hypertable($1::regclass, 'time', 'web_url', $2, \
         chunk_time_interval => $3::interval, if_not_exists => TRUE)",
        [
            config.table.as_str().into(),
            partitions.into(),
            config.chunk_time_interval.as_str().into(),
        ],
    ))
    .await?;
    Ok(())
}

/// Number of dimensions of the hypertable, `None` when the table is not a hypertable.
pub async fn hypertable_dimensions(db: &DatabaseConnection, table: &str) -> Result<Option<i64>> {
    let (schema, name) = split_table_name(table);
    let row = db
        .query_one(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT num_dimensions::bigint AS dimensions \
             FROM _timescaledb_catalog.hypertable \
             WHERE schema_name = $1 AND table_name = $2",
            [schema.into(), name.into()],
        ))
        .await?;
    match row {
        Some(row) => Ok(Some(row.try_get::<i64>("", "dimensions")?)),
        None => Ok(None),
    }
}

/// True when `table` is a hypertable with the expected two dimensions.
pub async fn validate_table(db: &DatabaseConnection, table: &str) -> Result<bool> {
    let dimensions = hypertable_dimensions(db, table).await?;
    match dimensions {
        Some(EXPECTED_DIMENSIONS) => {
            info!("{} is a hypertable with {} dimensions", table, EXPECTED_DIMENSIONS);
            Ok(true)
        }
        Some(other) => {
            warn!(
                "{} is a hypertable with {} dimensions, expected {}",
                table, other, EXPECTED_DIMENSIONS
            );
            Ok(false)
        }
        None => {
            warn!("{} is not a hypertable", table);
            Ok(false)
        }
    }
}
