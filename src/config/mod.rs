pub mod model;
pub mod resolve;
pub mod validate;

use std::path::Path;

use thiserror::Error;

use model::BridgeConfig;

/// Rejection of a configuration update received over HTTP.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown configuration key `{0}`")]
    UnknownKey(String),
    #[error("invalid value `{value}` for `{key}`: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    #[error("{0}")]
    Rejected(String),
}

/// Load and parse a config file. Returns the raw source alongside the parsed
/// config so validation diagnostics can point into it.
pub fn load_config(path: &Path) -> anyhow::Result<(BridgeConfig, String)> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
    let config: BridgeConfig = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file {}: {}", path.display(), e))?;
    Ok((config, content))
}

/// Load the config at `path`, or the built-in defaults when there is none.
pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<BridgeConfig> {
    match path {
        Some(p) => load_config(p).map(|(config, _)| config),
        None => {
            tracing::info!("no bridge.toml found, using built-in defaults");
            Ok(BridgeConfig::default())
        }
    }
}
