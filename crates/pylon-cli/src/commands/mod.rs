//! CLI Command Implementations

pub mod init;
pub mod simulate;
pub mod verify_events;

use anyhow::{Context, Result};
use pylon_core::PylonConfig;
use std::path::PathBuf;

/// Default config location: `<config dir>/pylon/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pylon")
        .join("config.json")
}

/// Load config from file (or defaults), then apply `PYLON_*` environment overrides.
pub fn load_config(path: Option<PathBuf>) -> Result<PylonConfig> {
    let path = path.unwrap_or_else(default_config_path);

    let config = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?
    } else {
        PylonConfig::default()
    };
    config
        .with_env_overrides()
        .context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"fees": {"fee_collector": "pylo1fees", "default_fee_bps": 300}}"#,
        )
        .unwrap();
        let config = load_config(Some(path)).unwrap();
        assert_eq!(config.fees.default_fee_bps, 300);
    }

    #[test]
    fn load_config_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_config(Some(path)).is_err());
    }
}
