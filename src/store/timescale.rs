use crate::common::model::config::{DatabaseConfig, is_sql_identifier};
use crate::errors::{DataStoreError, Error, OrmError, Result};
use crate::store::RowSink;
use crate::utils::connection::Connector;
use async_trait::async_trait;
use log::{debug, warn};
use sea_orm::sqlx::{self, Connection, PgConnection};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use std::time::Duration;

fn sqlx_error(e: sqlx::Error) -> Error {
    Error::orm_query(e)
}

/// Splits `schema.table` into its catalog names, defaulting the schema to `public`.
/// Table names are unquoted identifiers, so PostgreSQL stores them lowercased.
pub fn split_table_name(table: &str) -> (String, String) {
    let (schema, name) = table.split_once('.').unwrap_or(("public", table));
    (schema.to_lowercase(), name.to_lowercase())
}

pub async fn connect_database(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(1)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Trace);
    Database::connect(options)
        .await
        .map_err(|e| Error::from(e).context("connecting to the store"))
}

pub async fn table_exists(db: &DatabaseConnection, table: &str) -> Result<bool> {
    let row = db
        .query_one(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT to_regclass($1) IS NOT NULL AS present",
            [table.into()],
        ))
        .await?
        .ok_or(OrmError::NotFound)?;
    Ok(row.try_get::<bool>("", "present")?)
}

/// Store connection: a single-connection pool used for COPY.
pub struct TimescaleSink {
    db: DatabaseConnection,
    autocommit: bool,
}

impl TimescaleSink {
    async fn copy(conn: &mut PgConnection, statement: &str, payload: Vec<u8>) -> Result<u64> {
        let mut copy = conn.copy_in_raw(statement).await.map_err(sqlx_error)?;
        let sent = copy.send(payload).await.map(|_| ());
        if let Err(e) = sent {
            if let Err(abort) = copy.abort(e.to_string()).await {
                debug!("COPY abort reported: {}", abort);
            }
            return Err(sqlx_error(e));
        }
        copy.finish().await.map_err(sqlx_error)
    }
}

#[async_trait]
impl RowSink for TimescaleSink {
    async fn copy_in(&self, statement: &str, payload: Vec<u8>) -> Result<u64> {
        let pool = self.db.get_postgres_connection_pool();
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| OrmError::ConnectionError(e.into()))?;

        if self.autocommit {
            return Self::copy(&mut conn, statement, payload).await;
        }

        let mut tx = conn
            .begin()
            .await
            .map_err(|e| OrmError::TransactionError(e.into()))?;
        let rows = Self::copy(&mut tx, statement, payload).await?;
        tx.commit()
            .await
            .map_err(|e| OrmError::TransactionError(e.into()))?;
        Ok(rows)
    }
}

pub struct TimescaleConnector {
    config: DatabaseConfig,
}

impl TimescaleConnector {
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        if !is_sql_identifier(&config.table) {
            return Err(DataStoreError::InvalidTableName(config.table.clone()).into());
        }
        Ok(Self { config })
    }

    pub fn table(&self) -> &str {
        &self.config.table
    }
}

#[async_trait]
impl Connector for TimescaleConnector {
    type Conn = TimescaleSink;

    fn name(&self) -> &str {
        "timescale"
    }

    async fn connect(&self) -> Result<TimescaleSink> {
        let db = connect_database(&self.config).await?;
        if !table_exists(&db, &self.config.table).await? {
            let _ = db.close().await;
            return Err(DataStoreError::TableNotFound(self.config.table.clone()).into());
        }
        Ok(TimescaleSink {
            db,
            autocommit: self.config.autocommit,
        })
    }

    async fn is_alive(&self, conn: &TimescaleSink) -> bool {
        conn.db.ping().await.is_ok()
    }

    async fn close(&self, conn: TimescaleSink) {
        if let Err(e) = conn.db.close().await {
            warn!("Closing the store connection failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_table_name() {
        assert_eq!(
            split_table_name("web_health_metrics"),
            ("public".to_string(), "web_health_metrics".to_string())
        );
        assert_eq!(
            split_table_name("metrics.web_health"),
            ("metrics".to_string(), "web_health".to_string())
        );
    }

    #[test]
    fn test_split_table_name_folds_case_like_postgres() {
        assert_eq!(
            split_table_name("Metrics.WebHealth"),
            ("metrics".to_string(), "webhealth".to_string())
        );
    }

    #[test]
    fn test_connector_rejects_unsafe_table_name() {
        let config = DatabaseConfig {
            url: "postgres://localhost/db".into(),
            table: "web_health; DROP TABLE users".into(),
            autocommit: true,
            partitions: 4,
            chunk_time_interval: "1 week".into(),
        };
        let err = TimescaleConnector::new(config).err().unwrap();
        assert!(err.is_data_store());
    }
}
