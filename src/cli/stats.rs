use anyhow::Result;

use memvault::config::MemvaultConfig;
use memvault::memory::MemoryType;

/// Display memory statistics in the terminal.
pub fn stats(config: &MemvaultConfig, project: Option<&str>, json: bool) -> Result<()> {
    let engine = super::open_engine(config, project)?;
    let response = engine.stats(None)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("Memory Statistics");
    println!("{}", "=".repeat(40));
    println!("  Total memories:      {}", response.total_memories);
    println!();

    println!("By Type:");
    for t in MemoryType::ALL {
        let count = response.by_type.get(t.as_str()).copied().unwrap_or(0);
        println!("  {:<12} {}", t.as_str(), count);
    }
    println!();

    if !response.by_project.is_empty() {
        println!("By Project:");
        let mut projects: Vec<_> = response.by_project.iter().collect();
        projects.sort();
        for (name, count) in projects {
            let name = if name.is_empty() { "(none)" } else { name.as_str() };
            println!("  {:<12} {}", name, count);
        }
        println!();
    }

    println!(
        "Index:                 {} nodes, {} dimensions",
        response.index_nodes, response.index_dimensions
    );
    println!("Database size:         {}", super::format_bytes(response.db_size_bytes));

    if let Some(ref oldest) = response.oldest_memory {
        println!("Oldest memory:         {oldest}");
    }
    if let Some(ref newest) = response.newest_memory {
        println!("Newest memory:         {newest}");
    }

    Ok(())
}
