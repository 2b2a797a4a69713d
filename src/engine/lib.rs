//! Runtime wiring: the [`Orchestrator`] starts samplers and the consumer loop as
//! supervised workers, [`setup`] prepares the topic and the hypertable.

pub mod engine;
pub mod setup;

pub use engine::{Orchestrator, RunReport, WorkerSet, shutdown_signal};
pub use setup::{ValidationReport, setup, validate};
