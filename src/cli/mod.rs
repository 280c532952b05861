pub mod doctor;
pub mod export;
pub mod forget;
pub mod import;
pub mod reindex;
pub mod remember;
pub mod search;
pub mod show;
pub mod stats;
pub mod timeline;

use anyhow::{Context, Result};

use memvault::config::MemvaultConfig;
use memvault::memory::MemoryEngine;

/// Open the engine for `project` (or the configured default project).
pub fn open_engine(config: &MemvaultConfig, project: Option<&str>) -> Result<MemoryEngine> {
    let path = config.store_path(project)?;
    MemoryEngine::open(&path, config)
        .with_context(|| format!("failed to open memory store at {}", path.display()))
}

/// Single-line preview of at most `max` characters.
pub fn preview(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > max {
        format!("{}...", flat.chars().take(max).collect::<String>())
    } else {
        flat
    }
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
