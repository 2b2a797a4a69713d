use crate::common::model::config::KafkaConfig;
use crate::errors::{Error, QueueError, Result};
use crate::queue::{MessageSink, MessageSource};
use crate::utils::connection::Connector;
use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, info, warn};
use rdkafka::message::Message as KafkaMessageTrait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use std::time::Duration;

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Broker address and TLS material shared by every client this crate creates.
pub fn client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client.set("bootstrap.servers", config.brokers.as_str());
    if config.uses_tls() {
        client.set("security.protocol", "SSL");
        if let Some(ca) = &config.ca_location {
            client.set("ssl.ca.location", ca.as_str());
        }
        if let Some(cert) = &config.certificate_location {
            client.set("ssl.certificate.location", cert.as_str());
        }
        if let Some(key) = &config.key_location {
            client.set("ssl.key.location", key.as_str());
        }
    }
    client
}

/// Looks the topic up in the broker metadata.
pub async fn topic_exists(config: &KafkaConfig) -> Result<bool> {
    let client = client_config(config);
    let topic = config.topic.clone();
    tokio::task::spawn_blocking(move || -> Result<bool> {
        let consumer: BaseConsumer = client.create().map_err(Error::queue_connection)?;
        let metadata = consumer
            .fetch_metadata(Some(&topic), METADATA_TIMEOUT)
            .map_err(Error::queue_connection)?;
        Ok(metadata
            .topics()
            .iter()
            .any(|t| t.name() == topic && t.error().is_none() && !t.partitions().is_empty()))
    })
    .await
    .map_err(|e| QueueError::OperationFailed(Box::new(e)))?
}

/// Fails with [`QueueError::TopicNotFound`] unless the topic is in the broker
/// metadata.
pub async fn require_topic(config: &KafkaConfig) -> Result<()> {
    if topic_exists(config).await? {
        Ok(())
    } else {
        Err(QueueError::TopicNotFound(config.topic.clone()).into())
    }
}

/// Creates the sample topic with one partition and replication factor 1. An existing
/// topic is left untouched.
pub async fn ensure_topic(config: &KafkaConfig) -> Result<()> {
    let admin: AdminClient<DefaultClientContext> = client_config(config)
        .create()
        .map_err(Error::queue_connection)?;
    let topic = NewTopic::new(&config.topic, 1, TopicReplication::Fixed(1));
    let opts = AdminOptions::new().operation_timeout(Some(METADATA_TIMEOUT));

    let results = admin.create_topics(&[topic], &opts).await?;
    for result in results {
        match result {
            Ok(name) => info!("Created Kafka topic: {}", name),
            Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                warn!("Kafka topic {} already exists", name)
            }
            Err((name, code)) => {
                return Err(Error::from(QueueError::OperationFailed(Box::new(
                    rdkafka::error::KafkaError::AdminOp(code),
                )))
                .context(format!("creating topic {name}")));
            }
        }
    }
    Ok(())
}

/// Producer connection: every send waits for the acknowledgment of all in-sync
/// replicas.
pub struct KafkaSink {
    producer: FutureProducer,
    topic: String,
    ack_timeout: Duration,
}

#[async_trait]
impl MessageSink for KafkaSink {
    async fn send(&self, payload: &[u8]) -> Result<()> {
        let record = FutureRecord::<(), [u8]>::to(&self.topic).payload(payload);
        match self.producer.send(record, self.ack_timeout).await {
            Ok((partition, offset)) => {
                debug!(
                    "Kafka acknowledged message on {} [{}] at offset {}",
                    self.topic, partition, offset
                );
                Ok(())
            }
            Err((e, _)) => Err(QueueError::PushFailed(Box::new(e)).into()),
        }
    }
}

pub struct KafkaProducerConnector {
    config: KafkaConfig,
}

impl KafkaProducerConnector {
    pub fn new(config: KafkaConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for KafkaProducerConnector {
    type Conn = KafkaSink;

    fn name(&self) -> &str {
        "kafka producer"
    }

    async fn connect(&self) -> Result<KafkaSink> {
        // without this check a missing topic only shows up once the first send times out
        require_topic(&self.config).await?;
        let ack_timeout = self.config.ack_timeout();
        let producer: FutureProducer = client_config(&self.config)
            .set("acks", "all")
            .set("message.timeout.ms", ack_timeout.as_millis().to_string())
            .create()
            .map_err(Error::queue_connection)?;
        Ok(KafkaSink {
            producer,
            topic: self.config.topic.clone(),
            ack_timeout,
        })
    }
}

/// Consumer connection subscribed to the sample topic. Offsets are committed by the
/// client on a timer, independently of the store.
pub struct KafkaSource {
    consumer: StreamConsumer,
}

impl KafkaSource {
    fn record(message: &impl KafkaMessageTrait) -> Vec<u8> {
        message.payload().map(<[u8]>::to_vec).unwrap_or_default()
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn poll(&self, max_records: usize, timeout: Duration) -> Result<Vec<Vec<u8>>> {
        let mut records = Vec::new();
        if max_records == 0 {
            return Ok(records);
        }
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => return Ok(records),
            Ok(message) => {
                let message = message.map_err(|e| QueueError::PopFailed(Box::new(e)))?;
                records.push(Self::record(&message));
            }
        }
        while records.len() < max_records {
            match self.consumer.recv().now_or_never() {
                Some(message) => {
                    let message = message.map_err(|e| QueueError::PopFailed(Box::new(e)))?;
                    records.push(Self::record(&message));
                }
                None => break,
            }
        }
        Ok(records)
    }
}

pub struct KafkaConsumerConnector {
    config: KafkaConfig,
}

impl KafkaConsumerConnector {
    pub fn new(config: KafkaConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for KafkaConsumerConnector {
    type Conn = KafkaSource;

    fn name(&self) -> &str {
        "kafka consumer"
    }

    async fn connect(&self) -> Result<KafkaSource> {
        require_topic(&self.config).await?;

        let consumer: StreamConsumer = client_config(&self.config)
            .set("group.id", self.config.group_id.as_str())
            .set("enable.partition.eof", "false")
            .set("enable.auto.commit", "true")
            .set(
                "auto.commit.interval.ms",
                self.config.auto_commit_interval_ms.to_string(),
            )
            .set("auto.offset.reset", self.config.auto_offset_reset.as_str())
            .create()
            .map_err(Error::queue_connection)?;
        consumer
            .subscribe(&[self.config.topic.as_str()])
            .map_err(Error::queue_connection)?;
        info!(
            "Subscribed to Kafka topic {} as group {}",
            self.config.topic, self.config.group_id
        );
        Ok(KafkaSource { consumer })
    }
}
