use anyhow::Result;

use memvault::config::MemvaultConfig;

/// Permanently delete a memory and its vector.
pub fn forget(config: &MemvaultConfig, project: Option<&str>, id: &str) -> Result<()> {
    let mut engine = super::open_engine(config, project)?;
    let deleted = engine.forget(id)?;
    engine.close()?;

    if deleted {
        println!("Forgot {id}.");
    } else {
        println!("No memory with ID {id}.");
    }
    Ok(())
}
