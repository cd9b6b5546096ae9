pub mod serve;
pub mod show;
pub mod stop;
pub mod validate;

use std::path::Path;

use anyhow::Result;

use crate::config;
use crate::config::resolve::resolve_config;

/// Control URL of a running bridge: `url` when given, otherwise the control
/// port from the resolved config on localhost.
pub fn control_url(config_file: Option<&Path>, url: Option<String>) -> Result<String> {
    if let Some(url) = url {
        return Ok(url);
    }
    let config_path = resolve_config(config_file)?;
    let config = config::load_or_default(config_path.as_deref())?;
    Ok(format!("http://localhost:{}/bridge", config.bridge.port))
}
