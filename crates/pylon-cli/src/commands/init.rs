//! `pylon init` command implementation

use anyhow::{Context, Result};
use pylon_core::PylonConfig;
use std::fs;
use std::path::{Path, PathBuf};

pub fn run(output: PathBuf, force: bool) -> Result<()> {
    println!("🔧 Initializing pylon configuration...");
    let config_path = write_default_config(&output, force)?;

    println!("✅ Created configuration at {}", config_path.display());
    println!();
    println!("🚀 Next steps:");
    println!("   1. Edit fees.fee_collector to your fee pool account");
    println!(
        "   2. Replay a scenario: pylon --config {} simulate --scenario demos/scenario.json",
        config_path.display()
    );
    Ok(())
}

pub fn write_default_config(output: &Path, force: bool) -> Result<PathBuf> {
    let pylon_dir = output.join(".pylon");
    fs::create_dir_all(&pylon_dir).context("Failed to create .pylon directory")?;

    let config_path = pylon_dir.join("config.json");
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    let config = PylonConfig::default();
    config.validate()?;
    let config_json = serde_json::to_string_pretty(&config)?;
    fs::write(&config_path, config_json).context("Failed to write config file")?;
    Ok(config_path)
}
