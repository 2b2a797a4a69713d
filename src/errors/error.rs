use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Boxed source error carried inside [`Error`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Request,
    Queue,
    Orm,
    DataStore,
    Config,
    Task,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Request => write!(f, "request"),
            ErrorKind::Queue => write!(f, "queue"),
            ErrorKind::Orm => write!(f, "orm"),
            ErrorKind::DataStore => write!(f, "data store"),
            ErrorKind::Config => write!(f, "config"),
            ErrorKind::Task => write!(f, "task"),
        }
    }
}

pub struct ErrorInner {
    pub kind: ErrorKind,
    pub source: Option<BoxError>,
    pub message: Option<String>,
}

pub struct Error {
    pub inner: Box<ErrorInner>,
}

impl Error {
    pub fn new<E>(kind: ErrorKind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(ErrorInner {
                kind,
                source: source.map(Into::into),
                message: None,
            }),
        }
    }

    /// Attaches a human readable context (topic, url, table) to an existing error.
    pub fn context(mut self, message: impl Into<String>) -> Error {
        self.inner.message = Some(message.into());
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.inner.kind
    }

    pub fn is_request(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Request)
    }

    pub fn is_queue(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Queue)
    }

    pub fn is_orm(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Orm)
    }

    pub fn is_data_store(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::DataStore)
    }

    pub fn is_config(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Config)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("pulsewatch::Error");
        f.field("kind", &self.inner.kind);
        if let Some(ref message) = self.inner.message {
            f.field("message", message);
        }
        if let Some(ref source) = self.inner.source {
            f.field("source", source);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref message) = self.inner.message {
            write!(f, "{} error: {}", self.inner.kind, message)?;
        } else {
            write!(f, "{} error", self.inner.kind)?;
        }

        if let Some(ref source) = self.inner.source {
            write!(f, ": {source}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|e| &**e as &(dyn StdError + 'static))
    }
}

impl From<RequestError> for Error {
    fn from(err: RequestError) -> Self {
        Error::new(ErrorKind::Request, Some(err))
    }
}

impl From<QueueError> for Error {
    fn from(err: QueueError) -> Self {
        Error::new(ErrorKind::Queue, Some(err))
    }
}

impl From<OrmError> for Error {
    fn from(err: OrmError) -> Self {
        Error::new(ErrorKind::Orm, Some(err))
    }
}

impl From<DataStoreError> for Error {
    fn from(value: DataStoreError) -> Self {
        Error::new(ErrorKind::DataStore, Some(value))
    }
}

impl From<ConfigError> for Error {
    fn from(value: ConfigError) -> Self {
        Error::new(ErrorKind::Config, Some(value))
    }
}

impl From<TaskError> for Error {
    fn from(value: TaskError) -> Self {
        Error::new(ErrorKind::Task, Some(value))
    }
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[source] BoxError),
    #[error("build failed: {0}")]
    BuildFailed(#[source] BoxError),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("data not serialization: {0}")]
    SerializationFailed(#[source] BoxError),
    #[error("data not deserialization: {0}")]
    DeserializationFailed(#[source] BoxError),
    #[error("connection failed: {0}")]
    ConnectionFailed(#[source] BoxError),
    #[error("topic not found: {0}")]
    TopicNotFound(String),
    #[error("push data to queue failed: {0}")]
    PushFailed(#[source] BoxError),
    #[error("receive from queue failed: {0}")]
    PopFailed(#[source] BoxError),
    #[error("queue operation failed: {0}")]
    OperationFailed(#[source] BoxError),
}

#[derive(Debug, Error)]
pub enum OrmError {
    #[error("database connection error: {0}")]
    ConnectionError(#[source] BoxError),
    #[error("query execution error: {0}")]
    QueryExecutionError(#[source] BoxError),
    #[error("transaction error: {0}")]
    TransactionError(#[source] BoxError),
    #[error("data not found")]
    NotFound,
}

#[derive(Debug, Error)]
pub enum DataStoreError {
    #[error("table not found: {0}")]
    TableNotFound(String),
    #[error("invalid table name: {0}")]
    InvalidTableName(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    ParseFailed(#[source] BoxError),
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("worker {0} panicked")]
    Panicked(String),
}

impl Error {
    pub fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        Error::from(ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        })
    }

    pub fn queue_connection<E: Into<BoxError>>(source: E) -> Self {
        Error::from(QueueError::ConnectionFailed(source.into()))
    }

    pub fn orm_query<E: Into<BoxError>>(source: E) -> Self {
        Error::from(OrmError::QueryExecutionError(source.into()))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::from(ConfigError::ParseFailed(err.into()))
    }
}

impl From<sea_orm::DbErr> for Error {
    fn from(err: sea_orm::DbErr) -> Self {
        match err {
            sea_orm::DbErr::Conn(_) | sea_orm::DbErr::ConnectionAcquire(_) => {
                Error::from(OrmError::ConnectionError(err.into()))
            }
            _ => Error::from(OrmError::QueryExecutionError(err.into())),
        }
    }
}

impl From<rdkafka::error::KafkaError> for Error {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Error::from(QueueError::OperationFailed(err.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panicked_worker_is_task_error() {
        let err = Error::from(TaskError::Panicked("sampler-0".into()));
        assert_eq!(*err.kind(), ErrorKind::Task);
        assert_eq!(err.to_string(), "task error: worker sampler-0 panicked");
    }

    #[test]
    fn test_error_display() {
        let err = Error::from(QueueError::TopicNotFound("web_health".into()));
        assert_eq!(err.to_string(), "queue error: topic not found: web_health");

        let err = Error::from(QueueError::TopicNotFound("web_health".into()))
            .context("consumer startup");
        assert_eq!(
            err.to_string(),
            "queue error: consumer startup: topic not found: web_health"
        );
    }

    #[test]
    fn test_error_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = Error::from(ConfigError::ReadFailed {
            path: "config.toml".into(),
            source: io_err,
        });
        assert!(err.source().is_some());
        assert!(err.is_config());
    }

    #[test]
    fn test_error_kinds() {
        let err = Error::queue_connection("connection refused");
        assert!(err.is_queue());
        assert!(!err.is_request());

        let err = Error::from(DataStoreError::TableNotFound("metrics".into()));
        assert!(err.is_data_store());
        assert!(!err.is_queue());
    }
}
