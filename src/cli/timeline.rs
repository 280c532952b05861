use anyhow::Result;

use memvault::config::MemvaultConfig;
use memvault::memory::TimelinePosition;

/// Print memories around `anchor` in creation order.
pub fn timeline(config: &MemvaultConfig, project: Option<&str>, anchor: &str, radius: usize) -> Result<()> {
    let engine = super::open_engine(config, project)?;
    let entries = engine.timeline(anchor, radius)?;

    if entries.is_empty() {
        println!("No memory with ID {anchor}.");
        return Ok(());
    }

    for entry in &entries {
        let marker = match entry.position {
            TimelinePosition::Anchor => ">>",
            TimelinePosition::Before | TimelinePosition::After => "  ",
        };
        println!(
            "{marker} {}  [{}] {}  {}",
            entry.memory.created_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.memory.memory_type,
            entry.memory.id,
            super::preview(&entry.memory.title, 60),
        );
    }
    Ok(())
}
