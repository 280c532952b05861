//! CLI `show` command — display full details for memories by ID.

use anyhow::Result;

use memvault::config::MemvaultConfig;

/// Print every known memory in `ids`; unknown IDs are reported and skipped.
pub fn show(config: &MemvaultConfig, project: Option<&str>, ids: &[String]) -> Result<()> {
    let engine = super::open_engine(config, project)?;
    let memories = engine.details(ids)?;

    for id in ids {
        if !memories.iter().any(|m| &m.id == id) {
            eprintln!("Not found: {id}");
        }
    }

    for m in &memories {
        println!("Memory: {}", m.id);
        println!("{}", "=".repeat(50));
        println!("  Type:           {}", m.memory_type);
        println!("  Title:          {}", m.title);
        if !m.project.is_empty() {
            println!("  Project:        {}", m.project);
        }
        if !m.tags.is_empty() {
            println!("  Tags:           {}", m.tags.join(", "));
        }
        println!("  Created:        {}", m.created_at);
        println!("  Updated:        {}", m.updated_at);
        println!("  Accessed:       {}", m.accessed_at);
        println!();
        println!("Content:");
        println!("  {}", m.content);
        println!();
    }

    Ok(())
}
