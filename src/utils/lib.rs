pub mod connection;
pub mod logger;
pub mod shard;
pub mod shutdown;
