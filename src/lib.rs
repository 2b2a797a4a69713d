//! pulsewatch: web health sampling into Kafka and bulk loading into TimescaleDB.
//! Every component lives as a local module under `src/`.

#[path = "common/lib.rs"]
pub mod common;
#[path = "engine/lib.rs"]
pub mod engine;
#[path = "errors/lib.rs"]
pub mod errors;
#[path = "queue/lib.rs"]
pub mod queue;
#[path = "sampler/lib.rs"]
pub mod sampler;
#[path = "store/lib.rs"]
pub mod store;
#[path = "utils/lib.rs"]
pub mod utils;
