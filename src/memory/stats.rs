use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;

use crate::error::Result;
use crate::index::HnswIndex;
use crate::memory::store::MemoryStore;
use crate::memory::types::MemoryType;

/// Response from `memvault stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_memories: u64,
    pub by_type: HashMap<String, u64>,
    pub by_project: HashMap<String, u64>,
    pub db_size_bytes: u64,
    pub index_nodes: usize,
    pub index_dimensions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_memory: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_memory: Option<DateTime<Utc>>,
}

/// Compute store and index statistics.
///
/// If `project` is provided, record counts are restricted to that project;
/// size and index figures always describe the whole file.
pub fn memory_stats(
    store: &MemoryStore,
    index: &HnswIndex,
    project: Option<&str>,
) -> Result<StatsResponse> {
    let conn = store.connection();
    let (where_clause, param) = project_filter(project);

    let total: i64 = match &param {
        Some(p) => conn.query_row(
            &format!("SELECT COUNT(*) FROM memories {where_clause}"),
            params![p],
            |row| row.get(0),
        )?,
        None => conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?,
    };

    let mut by_type = grouped_counts(conn, "type", &where_clause, param.as_deref())?;
    for t in MemoryType::ALL {
        by_type.entry(t.as_str().to_string()).or_insert(0);
    }
    let by_project = grouped_counts(conn, "project", &where_clause, param.as_deref())?;
    let (oldest, newest) = memory_time_range(conn, &where_clause, param.as_deref())?;

    Ok(StatsResponse {
        total_memories: total as u64,
        by_type,
        by_project,
        db_size_bytes: store.get_db_size_bytes()?,
        index_nodes: index.len(),
        index_dimensions: index.dimensions(),
        oldest_memory: oldest.and_then(DateTime::from_timestamp_millis),
        newest_memory: newest.and_then(DateTime::from_timestamp_millis),
    })
}

/// `column -> count` over the filtered rows.
fn grouped_counts(
    conn: &Connection,
    column: &str,
    where_clause: &str,
    param: Option<&str>,
) -> Result<HashMap<String, u64>> {
    let sql = format!("SELECT {column}, COUNT(*) FROM memories {where_clause} GROUP BY {column}");
    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<(String, i64)> = match param {
        Some(p) => stmt
            .query_map(params![p], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        None => stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?,
    };
    Ok(rows.into_iter().map(|(k, n)| (k, n as u64)).collect())
}

/// Oldest and newest `created_at`, in milliseconds.
fn memory_time_range(
    conn: &Connection,
    where_clause: &str,
    param: Option<&str>,
) -> Result<(Option<i64>, Option<i64>)> {
    let sql = format!("SELECT MIN(created_at), MAX(created_at) FROM memories {where_clause}");
    let range = match param {
        Some(p) => conn.query_row(&sql, params![p], |row| Ok((row.get(0)?, row.get(1)?)))?,
        None => conn.query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))?,
    };
    Ok(range)
}

fn project_filter(project: Option<&str>) -> (String, Option<String>) {
    match project {
        Some(p) => ("WHERE project = ?1".to_string(), Some(p.to_string())),
        None => (String::new(), None),
    }
}
