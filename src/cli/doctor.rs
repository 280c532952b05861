//! CLI `doctor` command — run database diagnostics and print a health report.

use anyhow::{Context, Result};

use memvault::config::MemvaultConfig;
use memvault::db;
use memvault::embedding::{EmbeddingProvider, HashingVectorizer};

/// Run database diagnostics and print a health report.
pub fn doctor(config: &MemvaultConfig, project: Option<&str>) -> Result<()> {
    let db_path = config.store_path(project)?;

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `memvault remember` to create it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path)
        .map(|m| m.len())
        .unwrap_or(0);

    let conn = db::open_database(&db_path)
        .context("failed to open database (may be corrupt)")?;

    let report = db::check_database_health(&conn)
        .context("failed to run health check")?;

    let configured = HashingVectorizer::new(config.index.dimensions).identifier();

    println!("memvault Health Report");
    println!("======================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", super::format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Vectorizer:");
    println!("  Stored:          {}", report.vectorizer.as_deref().unwrap_or("(not set)"));
    println!("  Configured:      {configured}");
    match report.vectorizer {
        Some(ref stored) if stored != &configured => {
            println!("  WARNING: vectorizer mismatch! The index is rebuilt on next open,");
            println!("           or run `memvault reindex` now.");
        }
        Some(_) => println!("  Status:          OK (match)"),
        None => {}
    }
    println!();
    println!("Row counts:");
    println!("  Memories:        {}", report.memory_count);
    println!("  Index snapshot:  {}", super::format_bytes(report.snapshot_bytes));
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Restore from a backup: cp backup.db {}", db_path.display());
        println!("  2. Or export from a good copy and reimport:");
        println!("     memvault export > backup.json");
        println!("     memvault import backup.json");
    }

    Ok(())
}
