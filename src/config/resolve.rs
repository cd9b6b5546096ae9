use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "bridge.toml";

/// Walk up the directory tree from `start`, checking for `filename` at each level.
pub fn find_config(start: &Path, filename: &str) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(filename);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Per-user fallback location, e.g. `~/.config/bridge/bridge.toml`.
fn user_config() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("bridge").join(CONFIG_FILENAME);
    path.is_file().then_some(path)
}

/// Resolve the config file path.
///
/// An explicit `cli_file` must exist. Otherwise the working directory and its
/// parents are searched for `bridge.toml`, then the per-user config dir.
/// `Ok(None)` means the bridge should run on built-in defaults.
pub fn resolve_config(cli_file: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = cli_file {
        if path.is_file() {
            return Ok(Some(path.canonicalize()?));
        }
        anyhow::bail!("Config file not found: {}", path.display());
    }

    let cwd = std::env::current_dir()?;
    Ok(find_config(&cwd, CONFIG_FILENAME).or_else(user_config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn config_in_current_dir_found() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join(CONFIG_FILENAME);
        fs::write(&config_path, "").unwrap();

        let result = find_config(tmp.path(), CONFIG_FILENAME);
        assert_eq!(result, Some(config_path));
    }

    #[test]
    fn config_in_ancestor_found() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join(CONFIG_FILENAME);
        fs::write(&config_path, "").unwrap();

        let nested = tmp.path().join("harness").join("run");
        fs::create_dir_all(&nested).unwrap();

        let result = find_config(&nested, CONFIG_FILENAME);
        assert_eq!(result, Some(config_path));
    }

    #[test]
    fn cli_file_valid_path() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("custom.toml");
        fs::write(&config_path, "").unwrap();

        let result = resolve_config(Some(&config_path)).unwrap();
        // canonicalize() may return UNC paths on Windows, so compare canonical forms
        assert_eq!(result, Some(config_path.canonicalize().unwrap()));
    }

    #[test]
    fn cli_file_invalid_path_errors() {
        let nonexistent = Path::new("/tmp/definitely_does_not_exist_bridge.toml");
        let err_msg = resolve_config(Some(nonexistent)).unwrap_err().to_string();
        assert!(
            err_msg.contains("Config file not found"),
            "Expected 'Config file not found' in error, got: {}",
            err_msg
        );
    }
}
