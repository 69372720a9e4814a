use super::types::Config;
use super::{expand_env_vars, expand_tilde};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Load, expand and validate a config file.
///
/// Missing required fields are fatal here: the pipeline must not start and
/// silently idle without an endpoint or a watched directory.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let expanded = expand_env_vars(&raw);
    let mut config: Config = serde_yaml::from_str(&expanded)?;

    config.watch.log_dir = expand_tilde(&config.watch.log_dir);
    if let Some(base_dir) = &config.watch.base_dir {
        config.watch.base_dir = Some(expand_tilde(base_dir));
    }
    if let Some(snapshot) = &config.state.snapshot_path {
        config.state.snapshot_path = Some(expand_tilde(snapshot));
    }
    if let Some(edge) = &mut config.edge {
        edge.queue_dir = expand_tilde(&edge.queue_dir);
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    let url = config.endpoint.url.trim();
    if url.is_empty() {
        return Err(ConfigError::Invalid(
            "endpoint.url is required".to_string(),
        ));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Invalid(format!(
            "endpoint.url must be an http(s) URL, got '{}'",
            url
        )));
    }

    if config.watch.log_dir.as_os_str().is_empty() {
        return Err(ConfigError::Invalid(
            "watch.log_dir is required".to_string(),
        ));
    }

    if config.endpoint.timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "endpoint.timeout_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}
