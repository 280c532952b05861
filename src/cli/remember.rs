use anyhow::{Context, Result};

use memvault::config::MemvaultConfig;
use memvault::memory::{MemoryInput, MemoryType};

/// Arguments for `memvault remember`.
pub struct RememberArgs {
    pub memory_type: MemoryType,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub id: Option<String>,
}

/// Save one memory and print its ID.
pub fn remember(config: &MemvaultConfig, project: Option<&str>, args: RememberArgs) -> Result<()> {
    let mut engine = super::open_engine(config, project)?;
    let project_name = project.unwrap_or(&config.storage.default_project);

    let mut input = MemoryInput::new(args.memory_type, args.title, args.content)
        .with_project(project_name)
        .with_tags(args.tags);
    input.id = args.id;

    let memory = engine.remember(input).context("failed to save memory")?;
    engine.close()?;

    println!("{}", memory.id);
    Ok(())
}
