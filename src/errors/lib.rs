pub mod error;

pub use error::{
    BoxError, ConfigError, DataStoreError, Error, ErrorKind, OrmError, QueueError, RequestError,
    Result, TaskError,
};
