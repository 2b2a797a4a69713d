use crate::common::model::config::Config;
use crate::errors::Result;
use log::info;

pub mod targets;

/// Loads the TOML file at `path` and validates it.
pub fn load_config(path: &str) -> Result<Config> {
    let config = Config::load(path).map_err(|e| e.context(format!("loading {path}")))?;
    config.validate()?;
    info!("Loaded configuration `{}` from {}", config.name, path);
    Ok(config)
}
