use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::Path;

use memvault::config::MemvaultConfig;
use memvault::memory::Memory;

/// Import format — matches export output.
#[derive(Debug, Deserialize)]
struct ImportData {
    memories: Vec<Memory>,
}

/// Import memories from a JSON export.
///
/// Skips memories whose ID already exists. Imported memories keep their
/// exported timestamps, so timelines survive an export/import round trip.
pub async fn import(config: &MemvaultConfig, project: Option<&str>, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read import file: {}", file.display()))?;

    let data: ImportData =
        serde_json::from_str(&json).context("failed to parse import JSON")?;

    let mut engine = super::open_engine(config, project)?;
    let total = data.memories.len();
    println!("Importing {total} memories...");

    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("  {bar:40.cyan/blue} {pos}/{len} ({eta})") {
        pb.set_style(style.progress_chars("##-"));
    }

    // Vectorizing and indexing is CPU-bound; keep it off the async runtime
    let (engine, imported, skipped) = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut imported = 0u64;
        let mut skipped = 0u64;
        for memory in data.memories {
            if engine.import(&memory)? {
                imported += 1;
            } else {
                skipped += 1;
            }
            pb.inc(1);
        }
        pb.finish_and_clear();
        Ok((engine, imported, skipped))
    })
    .await??;

    engine.close()?;

    println!("Import complete:");
    println!("  Memories imported: {imported}");
    println!("  Memories skipped:  {skipped} (already exist)");
    Ok(())
}
