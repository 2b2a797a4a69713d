use crate::common::model::config::{ChannelBackend, Config};
use crate::errors::Result;
use crate::queue::kafka::{ensure_topic, topic_exists};
use crate::store::provision::{provision_table, validate_table};
use crate::store::timescale::connect_database;
use log::{info, warn};
use sea_orm::DatabaseConnection;

/// Result of checking the infrastructure the pipeline needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationReport {
    pub topic_ready: bool,
    pub table_ready: bool,
}

impl ValidationReport {
    pub fn is_ready(&self) -> bool {
        self.topic_ready && self.table_ready
    }
}

async fn close(db: DatabaseConnection) {
    if let Err(e) = db.close().await {
        warn!("Closing the store connection failed: {}", e);
    }
}

/// Creates the topic and provisions the hypertable. Safe to run repeatedly.
pub async fn setup(config: &Config) -> Result<()> {
    if config.channel.backend == ChannelBackend::Kafka {
        ensure_topic(&config.kafka).await?;
    } else {
        info!("Memory channel selected, no topic to create");
    }

    let db = connect_database(&config.db).await?;
    let provisioned = provision_table(&db, &config.db).await;
    let validated = match provisioned {
        Ok(()) => validate_table(&db, &config.db.table).await,
        Err(e) => Err(e),
    };
    close(db).await;

    if validated? {
        info!("Setup of {} complete", config.db.table);
    } else {
        warn!("{} was provisioned but does not have the expected layout", config.db.table);
    }
    Ok(())
}

/// Checks that the topic exists and that the table is a hypertable on `time` and
/// `web_url`. Connection failures are returned as errors.
pub async fn validate(config: &Config) -> Result<ValidationReport> {
    let topic_ready = match config.channel.backend {
        ChannelBackend::Kafka => {
            let exists = topic_exists(&config.kafka).await?;
            if exists {
                info!("Topic {} exists", config.kafka.topic);
            } else {
                warn!("Topic {} does not exist", config.kafka.topic);
            }
            exists
        }
        ChannelBackend::Memory => true,
    };

    let db = connect_database(&config.db).await?;
    let table_ready = validate_table(&db, &config.db.table).await;
    close(db).await;

    Ok(ValidationReport {
        topic_ready,
        table_ready: table_ready?,
    })
}
