pub mod migrations;
pub mod schema;

use std::path::Path;

use rusqlite::{Connection, ErrorCode, OptionalExtension};
use serde::Serialize;

use crate::error::{MemoryError, Result};

/// `PRAGMA application_id` stamped on every memvault file ("MVLT").
pub const APPLICATION_ID: i32 = i32::from_be_bytes(*b"MVLT");

/// Open (or create) a memvault database at the given path with schema
/// initialized, migrated, and checkpointed into the main file.
///
/// Files that are not SQLite, belong to another application, or carry a
/// newer schema are rejected with [`MemoryError::CorruptStore`].
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            MemoryError::storage(format!("failed to create directory {}", parent.display()), e)
        })?;
    }

    let mut conn = Connection::open(path).map_err(|e| {
        MemoryError::storage(format!("failed to open database at {}", path.display()), e)
    })?;

    conn.busy_timeout(std::time::Duration::from_millis(5000))?;
    verify_format(&conn, path)?;

    // WAL mode: each commit is durable without an explicit close
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| classify(path, e))?;
    conn.pragma_update(None, "synchronous", "FULL")?;

    schema::init_schema(&conn).map_err(|e| classify(path, e))?;
    let version = migrations::get_schema_version(&conn)?;
    if version > migrations::CURRENT_SCHEMA_VERSION {
        return Err(MemoryError::corrupt(
            path,
            format!(
                "schema version {version} is newer than supported {}",
                migrations::CURRENT_SCHEMA_VERSION
            ),
        ));
    }
    migrations::run_migrations(&mut conn)?;

    checkpoint(&conn)?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Copy the write-ahead log into the main database file and truncate it.
pub fn checkpoint(conn: &Connection) -> Result<()> {
    let (busy, _log, _checkpointed): (i64, i64, i64) = conn.query_row(
        "PRAGMA wal_checkpoint(TRUNCATE)",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    if busy != 0 {
        // Another connection holds a read lock; committed data is still durable in the WAL.
        tracing::debug!("checkpoint could not complete, WAL left in place");
    }
    Ok(())
}

/// Open an in-memory database for testing.
#[cfg(test)]
pub fn open_memory_database() -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    schema::init_schema(&conn)?;
    migrations::run_migrations(&mut conn)?;
    Ok(conn)
}

/// Reject files that are not ours before touching the schema.
///
/// An unclaimed file (application id 0) is claimed here, before any table is
/// created, if it is empty or already holds a memvault schema. The second case
/// is what an interrupted first open leaves behind.
fn verify_format(conn: &Connection, path: &Path) -> Result<()> {
    let objects: i64 = conn
        .query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0))
        .map_err(|e| classify(path, e))?;
    let app_id: i32 = conn
        .pragma_query_value(None, "application_id", |row| row.get(0))
        .map_err(|e| classify(path, e))?;

    if app_id == APPLICATION_ID {
        return Ok(());
    }
    if app_id == 0 && (objects == 0 || has_memvault_schema(conn)?) {
        conn.pragma_update(None, "application_id", APPLICATION_ID)
            .map_err(|e| classify(path, e))?;
        if objects > 0 {
            tracing::warn!(path = %path.display(), "claimed unstamped memvault database");
        }
        return Ok(());
    }
    Err(MemoryError::corrupt(
        path,
        format!("foreign SQLite database (application_id {app_id:#x}, {objects} schema objects)"),
    ))
}

/// Whether the file already carries our core tables and a schema version.
fn has_memvault_schema(conn: &Connection) -> Result<bool> {
    let tables: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master
         WHERE type = 'table' AND name IN ('memories', 'schema_meta')",
        [],
        |row| row.get(0),
    )?;
    if tables != 2 {
        return Ok(false);
    }
    let version = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(version.is_some_and(|v| v.parse::<u32>().is_ok()))
}

/// Map "not a database" and corruption codes to `CorruptStore`.
fn classify(path: &Path, err: rusqlite::Error) -> MemoryError {
    match err.sqlite_error_code() {
        Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt) => {
            MemoryError::corrupt(path, err.to_string())
        }
        _ => MemoryError::storage(format!("failed to read {}", path.display()), err),
    }
}

/// Result of [`check_database_health`].
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub schema_version: u32,
    pub vectorizer: Option<String>,
    pub memory_count: u64,
    pub snapshot_bytes: u64,
}

/// Run SQLite's integrity check and collect row counts.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let details: Vec<String> = conn
        .prepare("PRAGMA integrity_check")?
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let integrity_ok = details.len() == 1 && details[0] == "ok";

    let memory_count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
    let snapshot_bytes: i64 = conn.query_row(
        "SELECT COALESCE(SUM(LENGTH(data)), 0) FROM index_snapshot",
        [],
        |r| r.get(0),
    )?;

    Ok(HealthReport {
        integrity_ok,
        integrity_details: details.join("; "),
        schema_version: migrations::get_schema_version(conn)?,
        vectorizer: migrations::get_vectorizer(conn)?,
        memory_count: memory_count as u64,
        snapshot_bytes: snapshot_bytes as u64,
    })
}
