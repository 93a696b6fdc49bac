//! Config file lookup for the CLI.

use anyhow::{Context, Result};
use disthash::TableConfig;
use std::path::PathBuf;

const CONFIG_FILE: &str = "disthash.toml";

/// Load the table config from `path`, or from `disthash.toml` in the current
/// or a parent directory. Falls back to defaults when neither exists.
pub fn load(path: Option<&str>) -> Result<TableConfig> {
    let path = match path {
        Some(p) => PathBuf::from(p),
        None => match find_config_file() {
            Some(p) => p,
            None => return Ok(TableConfig::default()),
        },
    };
    TableConfig::load(&path).with_context(|| format!("Failed to load config: {}", path.display()))
}

/// Load a config that must name every rank's address.
pub fn load_with_peers(path: Option<&str>) -> Result<TableConfig> {
    let config = load(path)?;
    if config.peers.is_empty() {
        anyhow::bail!(
            "No peers configured. Add `peers = [...]` with one address per rank to {}",
            CONFIG_FILE
        );
    }
    Ok(config)
}

/// Find disthash.toml in current or parent directories.
fn find_config_file() -> Option<PathBuf> {
    let mut dir = std::env::current_dir().ok()?;
    loop {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }
        if !dir.pop() {
            break;
        }
    }
    None
}
