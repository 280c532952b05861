//! CLI `reindex` command — rebuild the vector index from stored memories.

use anyhow::{Context, Result};

use memvault::config::MemvaultConfig;

/// Re-vectorize every memory into a fresh index and persist it.
pub async fn reindex(config: &MemvaultConfig, project: Option<&str>) -> Result<()> {
    let mut engine = super::open_engine(config, project)?;

    let started = std::time::Instant::now();
    let (engine, nodes) = tokio::task::spawn_blocking(move || -> Result<_> {
        let nodes = engine.reindex().context("failed to rebuild index")?;
        Ok((engine, nodes))
    })
    .await??;
    engine.close()?;

    println!(
        "Reindexed {nodes} memories ({} dimensions) in {:.2?}.",
        config.index.dimensions,
        started.elapsed()
    );
    Ok(())
}
