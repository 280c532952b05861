use anyhow::Result;
use serde::Serialize;

use memvault::config::MemvaultConfig;
use memvault::memory::Memory;

/// Export format — every memory, oldest first.
#[derive(Debug, Serialize)]
struct ExportData {
    vectorizer: Option<String>,
    memories: Vec<Memory>,
}

/// Export all memories as JSON to stdout.
pub fn export(config: &MemvaultConfig, project: Option<&str>) -> Result<()> {
    let engine = super::open_engine(config, project)?;

    let data = ExportData {
        vectorizer: engine.store().vectorizer()?,
        memories: engine.memories()?,
    };

    let json = serde_json::to_string_pretty(&data)?;
    println!("{json}");

    eprintln!("Exported {} memories.", data.memories.len());
    Ok(())
}
