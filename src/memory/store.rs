//! Durable record store — one SQLite file per project.
//!
//! [`MemoryStore::initialize`] creates parent directories, writes the schema,
//! and checkpoints it into the main file before returning, so the file exists
//! on disk with a valid schema even if nothing is ever saved. Every write runs
//! in its own committed transaction; nothing depends on [`MemoryStore::close`]
//! being called.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db;
use crate::error::{MemoryError, Result};
use crate::memory::types::{Memory, MemoryInput, MemoryType};

/// IDs per `IN (...)` lookup.
const FETCH_BATCH: usize = 500;

const MEMORY_COLUMNS: &str =
    "id, type, title, content, project, tags, created_at, updated_at, accessed_at";

/// Handle over one persistence file. Single writer; see crate docs.
pub struct MemoryStore {
    conn: Connection,
    path: PathBuf,
}

impl MemoryStore {
    /// Open or create the store at `path`.
    pub fn initialize(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = db::open_database(&path)?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Insert or replace a memory. Re-saving an ID keeps its `created_at`.
    pub fn save_memory(&mut self, input: MemoryInput) -> Result<Memory> {
        let id = input
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
        let tags_json = serde_json::to_string(&input.tags)?;

        let tx = self.conn.transaction()?;
        let now = tick(&tx)?;

        let previous: Option<(i64, String, String, String, i64)> = tx
            .query_row(
                "SELECT rowid, title, content, type, created_at FROM memories WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        let (rowid, created_at) = match previous {
            Some((rowid, old_title, old_content, old_type, created_at)) => {
                // External-content FTS5 needs the old values to retract them
                tx.execute(
                    "INSERT INTO memories_fts(memories_fts, rowid, title, content, id, type) \
                     VALUES('delete', ?1, ?2, ?3, ?4, ?5)",
                    params![rowid, old_title, old_content, id, old_type],
                )?;
                tx.execute(
                    "UPDATE memories SET type = ?2, title = ?3, content = ?4, project = ?5, \
                     tags = ?6, updated_at = ?7, accessed_at = ?7 WHERE id = ?1",
                    params![
                        id,
                        input.memory_type.as_str(),
                        input.title,
                        input.content,
                        input.project,
                        tags_json,
                        now,
                    ],
                )?;
                (rowid, created_at)
            }
            None => {
                tx.execute(
                    "INSERT INTO memories (id, type, title, content, project, tags, \
                     created_at, updated_at, accessed_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?7)",
                    params![
                        id,
                        input.memory_type.as_str(),
                        input.title,
                        input.content,
                        input.project,
                        tags_json,
                        now,
                    ],
                )?;
                (tx.last_insert_rowid(), now)
            }
        };

        tx.execute(
            "INSERT INTO memories_fts (rowid, title, content, id, type) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![rowid, input.title, input.content, id, input.memory_type.as_str()],
        )?;
        tx.commit()?;

        tracing::debug!(id = %id, memory_type = %input.memory_type, replaced = created_at != now, "memory saved");

        Ok(Memory {
            id,
            memory_type: input.memory_type,
            title: input.title,
            content: input.content,
            project: input.project,
            tags: input.tags,
            created_at: millis_to_datetime(created_at),
            updated_at: millis_to_datetime(now),
            accessed_at: millis_to_datetime(now),
        })
    }

    /// Insert a previously exported memory with its original timestamps.
    ///
    /// Returns `false` without writing if the ID is already stored. The clock
    /// moves past every imported timestamp, so later saves still sort after it.
    pub fn import_memory(&mut self, memory: &Memory) -> Result<bool> {
        let tags_json = serde_json::to_string(&memory.tags)?;
        let created_at = memory.created_at.timestamp_millis();
        let updated_at = memory.updated_at.timestamp_millis();
        let accessed_at = memory.accessed_at.timestamp_millis();

        let tx = self.conn.transaction()?;
        let exists: Option<i64> = tx
            .query_row(
                "SELECT rowid FROM memories WHERE id = ?1",
                params![memory.id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO memories (id, type, title, content, project, tags, \
             created_at, updated_at, accessed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                memory.id,
                memory.memory_type.as_str(),
                memory.title,
                memory.content,
                memory.project,
                tags_json,
                created_at,
                updated_at,
                accessed_at,
            ],
        )?;
        tx.execute(
            "INSERT INTO memories_fts (rowid, title, content, id, type) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                tx.last_insert_rowid(),
                memory.title,
                memory.content,
                memory.id,
                memory.memory_type.as_str()
            ],
        )?;
        advance_clock(&tx, created_at.max(updated_at).max(accessed_at))?;
        tx.commit()?;

        tracing::debug!(id = %memory.id, created_at, "memory imported");
        Ok(true)
    }

    /// Fetch one memory, bumping its `accessed_at`.
    pub fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        Ok(self.get_memories(&[id.to_string()])?.into_iter().next())
    }

    /// Like [`get_memory`](Self::get_memory) but leaves `accessed_at` alone.
    pub fn peek_memory(&self, id: &str) -> Result<Option<Memory>> {
        Ok(self.fetch(&[id])?.remove(id))
    }

    /// Fetch memories in the order given, skipping unknown IDs and bumping
    /// `accessed_at` on the ones found.
    pub fn get_memories(&self, ids: &[String]) -> Result<Vec<Memory>> {
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mut found = self.fetch(&id_refs)?;
        if found.is_empty() {
            return Ok(Vec::new());
        }

        let tx = self.conn.unchecked_transaction()?;
        let now = tick(&tx)?;
        {
            let mut stmt = tx.prepare("UPDATE memories SET accessed_at = ?1 WHERE id = ?2")?;
            for id in found.keys() {
                stmt.execute(params![now, id])?;
            }
        }
        tx.commit()?;

        let accessed = millis_to_datetime(now);
        let mut out = Vec::with_capacity(found.len());
        for id in ids {
            if let Some(mut memory) = found.remove(id.as_str()) {
                memory.accessed_at = accessed;
                out.push(memory);
            }
        }
        Ok(out)
    }

    /// Permanently remove a memory. Returns `false` if it did not exist.
    pub fn delete_memory(&mut self, id: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let row: Option<(i64, String, String, String)> = tx
            .query_row(
                "SELECT rowid, title, content, type FROM memories WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        let Some((rowid, title, content, memory_type)) = row else {
            return Ok(false);
        };

        tx.execute(
            "INSERT INTO memories_fts(memories_fts, rowid, title, content, id, type) \
             VALUES('delete', ?1, ?2, ?3, ?4, ?5)",
            params![rowid, title, content, id, memory_type],
        )?;
        tx.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        tx.commit()?;

        tracing::debug!(id, "memory deleted");
        Ok(true)
    }

    pub fn get_memory_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Bytes on disk: the main file plus any un-checkpointed WAL.
    pub fn get_db_size_bytes(&self) -> Result<u64> {
        let main = std::fs::metadata(&self.path).map_err(|e| {
            MemoryError::storage(format!("failed to stat {}", self.path.display()), e)
        })?;
        let mut wal_path = self.path.clone().into_os_string();
        wal_path.push("-wal");
        let wal = std::fs::metadata(&wal_path).map(|m| m.len()).unwrap_or(0);
        Ok(main.len() + wal)
    }

    /// All memories, oldest first. Does not touch `accessed_at`.
    pub fn list_memories(&self) -> Result<Vec<Memory>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories ORDER BY created_at, id"
        ))?;
        let rows = stmt
            .query_map([], row_to_memory)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn all_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT id FROM memories ORDER BY created_at, id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Type of each known ID, without hydrating or touching the records.
    pub fn memory_types(&self, ids: &[&str]) -> Result<HashMap<String, MemoryType>> {
        Ok(self
            .fetch(ids)?
            .into_iter()
            .map(|(id, memory)| (id, memory.memory_type))
            .collect())
    }

    /// Up to `radius` memories on each side of `anchor` by `(created_at, id)`,
    /// both returned oldest first. Does not touch `accessed_at`.
    pub fn chronological_neighbors(
        &self,
        anchor: &Memory,
        radius: usize,
    ) -> Result<(Vec<Memory>, Vec<Memory>)> {
        let created = anchor.created_at.timestamp_millis();
        let limit = radius as i64;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories WHERE (created_at, id) < (?1, ?2) \
             ORDER BY created_at DESC, id DESC LIMIT ?3"
        ))?;
        let mut before = stmt
            .query_map(params![created, anchor.id, limit], row_to_memory)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        before.reverse();

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories WHERE (created_at, id) > (?1, ?2) \
             ORDER BY created_at ASC, id ASC LIMIT ?3"
        ))?;
        let after = stmt
            .query_map(params![created, anchor.id, limit], row_to_memory)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((before, after))
    }

    /// Persist a serialized index next to the records.
    pub fn save_index_snapshot(&self, dimensions: usize, data: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT INTO index_snapshot (id, dimensions, data, updated_at) VALUES (1, ?1, ?2, ?3) \
             ON CONFLICT(id) DO UPDATE SET dimensions = excluded.dimensions, \
             data = excluded.data, updated_at = excluded.updated_at",
            params![dimensions as i64, data, Utc::now().timestamp_millis()],
        )?;
        tracing::debug!(bytes = data.len(), dimensions, "index snapshot written");
        Ok(())
    }

    /// The last persisted index, as `(dimensions, bytes)`.
    pub fn load_index_snapshot(&self) -> Result<Option<(usize, Vec<u8>)>> {
        let row: Option<(i64, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT dimensions, data FROM index_snapshot WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(dims, data)| (dims as usize, data)))
    }

    pub fn vectorizer(&self) -> Result<Option<String>> {
        Ok(db::migrations::get_vectorizer(&self.conn)?)
    }

    pub fn set_vectorizer(&self, vectorizer: &str) -> Result<()> {
        Ok(db::migrations::set_vectorizer(&self.conn, vectorizer)?)
    }

    /// Flush the WAL into the main file. Returns once the data is on disk.
    pub fn save_to_disk(&self) -> Result<()> {
        db::checkpoint(&self.conn)
    }

    /// Flush and release the file handle.
    pub fn close(self) -> Result<()> {
        self.save_to_disk()?;
        let path = self.path;
        self.conn.close().map_err(|(_, e)| {
            MemoryError::storage(format!("failed to close {}", path.display()), e)
        })?;
        tracing::info!(path = %path.display(), "store closed");
        Ok(())
    }

    fn fetch(&self, ids: &[&str]) -> Result<HashMap<String, Memory>> {
        let mut found = HashMap::with_capacity(ids.len());
        // Stay under SQLite's bound-parameter limit
        for chunk in ids.chunks(FETCH_BATCH) {
            let placeholders: Vec<String> = (1..=chunk.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT {MEMORY_COLUMNS} FROM memories WHERE id IN ({})",
                placeholders.join(", ")
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(chunk), row_to_memory)?;
            for row in rows {
                let memory = row?;
                found.insert(memory.id.clone(), memory);
            }
        }
        Ok(found)
    }
}

/// Advance the persisted logical clock: `max(wall clock ms, last + 1)`.
fn tick(conn: &Connection) -> Result<i64> {
    let last: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'clock'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let last = last.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
    let now = Utc::now().timestamp_millis().max(last + 1);
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('clock', ?1)",
        [now.to_string()],
    )?;
    Ok(now)
}

/// Raise the persisted clock to at least `at`.
fn advance_clock(conn: &Connection, at: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_meta (key, value) VALUES ('clock', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = ?1 \
         WHERE CAST(value AS INTEGER) < CAST(?1 AS INTEGER)",
        [at.to_string()],
    )?;
    Ok(())
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn row_to_memory(row: &Row<'_>) -> rusqlite::Result<Memory> {
    let type_str: String = row.get(1)?;
    let memory_type = type_str
        .parse::<MemoryType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into()))?;
    let tags_str: String = row.get(5)?;
    let tags: Vec<String> = serde_json::from_str(&tags_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(Memory {
        id: row.get(0)?,
        memory_type,
        title: row.get(2)?,
        content: row.get(3)?,
        project: row.get(4)?,
        tags,
        created_at: millis_to_datetime(row.get(6)?),
        updated_at: millis_to_datetime(row.get(7)?),
        accessed_at: millis_to_datetime(row.get(8)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, MemoryStore) {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::initialize(tmp.path().join("store.db")).unwrap();
        (tmp, store)
    }

    fn note(id: &str, title: &str) -> MemoryInput {
        MemoryInput::new(MemoryType::Observation, title, format!("{title} body")).with_id(id)
    }

    #[test]
    fn save_generates_id_when_missing() {
        let (_tmp, mut store) = test_store();
        let saved = store
            .save_memory(MemoryInput::new(MemoryType::Feature, "t", "c"))
            .unwrap();
        assert!(!saved.id.is_empty());
        assert!(store.get_memory(&saved.id).unwrap().is_some());
    }

    #[test]
    fn resave_replaces_in_place_and_keeps_created_at() {
        let (_tmp, mut store) = test_store();
        let first = store.save_memory(note("a", "first")).unwrap();
        let second = store.save_memory(note("a", "second")).unwrap();

        assert_eq!(store.get_memory_count().unwrap(), 1);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(store.get_memory("a").unwrap().unwrap().title, "second");
    }

    #[test]
    fn resave_reindexes_fts() {
        let (_tmp, mut store) = test_store();
        store.save_memory(note("a", "zebra")).unwrap();
        store.save_memory(note("a", "giraffe")).unwrap();

        let hits = |term: &str| -> i64 {
            store
                .connection()
                .query_row(
                    "SELECT COUNT(*) FROM memories_fts WHERE memories_fts MATCH ?1",
                    [term],
                    |r| r.get(0),
                )
                .unwrap()
        };
        assert_eq!(hits("zebra"), 0);
        assert_eq!(hits("giraffe"), 1);
    }

    #[test]
    fn get_bumps_accessed_at() {
        let (_tmp, mut store) = test_store();
        let saved = store.save_memory(note("a", "t")).unwrap();
        let read = store.get_memory("a").unwrap().unwrap();
        assert!(read.accessed_at > saved.accessed_at);
        assert_eq!(read.updated_at, saved.updated_at);
    }

    #[test]
    fn get_memories_preserves_order_and_skips_missing() {
        let (_tmp, mut store) = test_store();
        store.save_memory(note("a", "A")).unwrap();
        store.save_memory(note("b", "B")).unwrap();

        let ids = vec!["b".to_string(), "nope".to_string(), "a".to_string()];
        let got: Vec<String> = store
            .get_memories(&ids)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(got, vec!["b", "a"]);
    }

    #[test]
    fn delete_reports_presence() {
        let (_tmp, mut store) = test_store();
        store.save_memory(note("a", "t")).unwrap();
        assert!(store.delete_memory("a").unwrap());
        assert!(!store.delete_memory("a").unwrap());
        assert_eq!(store.get_memory_count().unwrap(), 0);
    }

    #[test]
    fn clock_is_strictly_increasing() {
        let (_tmp, mut store) = test_store();
        let stamps: Vec<_> = (0..20)
            .map(|i| store.save_memory(note(&format!("m{i}"), "t")).unwrap().created_at)
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn tags_round_trip_in_order() {
        let (_tmp, mut store) = test_store();
        store
            .save_memory(note("a", "t").with_tags(["zeta", "alpha"]))
            .unwrap();
        let got = store.get_memory("a").unwrap().unwrap();
        assert_eq!(got.tags, vec!["zeta", "alpha"]);
    }

    #[test]
    fn snapshot_round_trip() {
        let (_tmp, store) = test_store();
        assert!(store.load_index_snapshot().unwrap().is_none());
        store.save_index_snapshot(64, &[1, 2, 3]).unwrap();
        store.save_index_snapshot(64, &[4, 5]).unwrap();
        assert_eq!(store.load_index_snapshot().unwrap(), Some((64, vec![4, 5])));
    }

    #[test]
    fn import_keeps_timestamps_and_advances_clock() {
        let (_tmp, mut store) = test_store();
        let ahead = Utc::now() + chrono::Duration::days(1);
        let exported = Memory {
            id: "old".into(),
            memory_type: MemoryType::Decision,
            title: "Imported".into(),
            content: "from a backup".into(),
            project: "api".into(),
            tags: vec!["backup".into()],
            created_at: millis_to_datetime(ahead.timestamp_millis() - 5_000),
            updated_at: millis_to_datetime(ahead.timestamp_millis() - 1_000),
            accessed_at: millis_to_datetime(ahead.timestamp_millis()),
        };

        assert!(store.import_memory(&exported).unwrap());
        assert!(!store.import_memory(&exported).unwrap());
        assert_eq!(store.peek_memory("old").unwrap().unwrap(), exported);

        let later = store.save_memory(note("new", "after import")).unwrap();
        assert!(later.created_at > exported.accessed_at);
    }

    #[test]
    fn get_memories_handles_more_ids_than_one_batch() {
        let (_tmp, mut store) = test_store();
        let mut ids = Vec::new();
        for i in 0..(FETCH_BATCH + 3) {
            let id = format!("m{i:04}");
            store.save_memory(note(&id, "bulk")).unwrap();
            ids.push(id);
        }
        ids.push("ghost".to_string());
        ids.reverse();

        let got = store.get_memories(&ids).unwrap();
        assert_eq!(got.len(), FETCH_BATCH + 3);
        assert_eq!(got[0].id, format!("m{:04}", FETCH_BATCH + 2));
        assert_eq!(got.last().unwrap().id, "m0000");
    }
}
