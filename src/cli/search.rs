use anyhow::Result;
use std::collections::HashMap;

use memvault::config::MemvaultConfig;
use memvault::memory::SearchQuery;

/// Run a search from the terminal.
pub fn search(config: &MemvaultConfig, project: Option<&str>, query: &SearchQuery) -> Result<()> {
    let engine = super::open_engine(config, project)?;
    let hits = engine.search(query)?;

    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    // Hydrate titles for display
    let ids: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();
    let titles: HashMap<String, String> = engine
        .details(&ids)?
        .into_iter()
        .map(|m| (m.id, m.title))
        .collect();

    println!("Found {} result(s) ({} mode)\n", hits.len(), query.mode);

    for (i, hit) in hits.iter().enumerate() {
        let title = titles.get(&hit.id).map(String::as_str).unwrap_or("");
        let distance = hit
            .distance
            .map(|d| format!(", distance: {d:.4}"))
            .unwrap_or_default();
        println!(
            "  {}. [{}] {} (score: {:.4}{}, match: {:?})",
            i + 1,
            hit.memory_type,
            hit.id,
            hit.score,
            distance,
            hit.match_type,
        );
        println!("     {}", super::preview(title, 100));
        println!();
    }

    Ok(())
}
