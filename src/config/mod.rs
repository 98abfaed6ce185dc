pub use pf_core::config::*;

use anyhow::{Context, Result};
use pf_pipeline::ProfileStore;
use std::path::Path;

/// Default config locations, searched in order.
const DEFAULT_PATHS: [&str; 3] = [
    "./photoforge.toml",
    "~/.config/photoforge/config.toml",
    "/etc/photoforge/config.toml",
];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = Config::from_toml(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Reject configs the pipeline cannot run with; log the rest as warnings.
fn validate_config(config: &Config) -> Result<()> {
    if config.tools.timeout_secs == Some(0) {
        anyhow::bail!("tools.timeout_secs cannot be 0");
    }

    if config.pipeline.image_extensions.is_empty() {
        anyhow::bail!("pipeline.image_extensions cannot be empty");
    }

    ProfileStore::builtin()
        .with_overrides(&config.profiles)
        .context("Invalid profile override")?;

    for warning in config.validate() {
        tracing::warn!("{warning}");
    }

    Ok(())
}
