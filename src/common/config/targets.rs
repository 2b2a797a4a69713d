use crate::common::model::config::MonitorConfig;
use crate::errors::{ConfigError, Error, Result};
use std::collections::HashSet;
use std::path::Path;

/// Reads one URL per line, skipping blank lines and `#` comments.
pub fn read_targets_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
        path: path.display().to_string(),
        source,
    })?;
    Ok(parse_targets(&content))
}

pub fn parse_targets(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Drops repeated URLs, keeping the first occurrence.
pub fn dedup_targets<I>(targets: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Inline targets followed by the targets file, de-duplicated. An empty result is a
/// configuration error.
pub fn resolve_targets(monitor: &MonitorConfig) -> Result<Vec<String>> {
    let mut all: Vec<String> = monitor
        .targets
        .iter()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect();
    if let Some(path) = &monitor.targets_path {
        all.extend(read_targets_file(path)?);
    }
    let targets = dedup_targets(all);
    if targets.is_empty() {
        return Err(Error::invalid_value(
            "monitor.targets",
            "no target URL configured",
        ));
    }
    Ok(targets)
}
