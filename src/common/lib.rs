//! Shared domain models and configuration.
//!
//! Holds the [`Sample`](model::sample::Sample) record that travels from the samplers
//! through the queue into the store, and the TOML configuration model.

pub mod config;
pub mod model;

pub use model::config::Config;
pub use model::sample::Sample;
