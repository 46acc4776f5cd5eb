pub mod schema;

pub use schema::ProxyConfig;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default toolproxy home directory (~/.toolproxy).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".toolproxy"))
        .unwrap_or_else(|| PathBuf::from(".toolproxy"))
}

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    default_home_dir().join("toolproxy.toml")
}

/// Expand a leading `~` in a user-supplied path.
pub fn resolve_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Load config from the given path, or return defaults.
pub fn load_config(path: &Path) -> Result<ProxyConfig> {
    let config = if path.exists() {
        let contents =
            std::fs::read_to_string(path).context("Failed to read toolproxy config file")?;
        toml::from_str(&contents).context("Failed to parse toolproxy config (TOML)")?
    } else {
        ProxyConfig::default()
    };
    config
        .validate()
        .with_context(|| format!("Invalid config in {}", path.display()))?;
    Ok(config)
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &ProxyConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}
