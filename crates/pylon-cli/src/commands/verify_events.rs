//! `pylon verify-events` command implementation

use anyhow::{Context, Result};
use pylon_core::events::EventLog;
use std::path::PathBuf;

pub fn run(file: PathBuf) -> Result<()> {
    let log = EventLog::read_jsonl(&file)
        .with_context(|| format!("Event log {} failed verification", file.display()))?;
    println!(
        "✅ {} records, head {}",
        log.len(),
        log.head_hash()
    );
    Ok(())
}
