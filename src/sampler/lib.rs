//! HTTP samplers: [`Probe`] measures one target, [`SamplerWorker`] loops over a shard
//! of targets and publishes the results.

pub mod probe;
pub mod worker;

pub use probe::Probe;
pub use worker::SamplerWorker;
