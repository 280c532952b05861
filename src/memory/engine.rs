//! One store, its vector index, and the vectorizer that links them.
//!
//! [`MemoryEngine`] keeps the [`HnswIndex`] in step with the [`MemoryStore`]:
//! every saved memory is vectorized and added under its ID, every forgotten
//! one is removed. The index lives in memory and is persisted as a snapshot
//! inside the store file. On open the snapshot is trusted only if it decodes,
//! has the configured dimensions, was built by the same vectorizer, and holds
//! exactly the stored IDs; otherwise the index is rebuilt from the records.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

use crate::config::MemvaultConfig;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::Result;
use crate::index::{HnswConfig, HnswIndex};
use crate::memory::search::{MemorySearch, SearchConfig, SearchHit, SearchQuery, TimelineEntry};
use crate::memory::stats::{memory_stats, StatsResponse};
use crate::memory::store::MemoryStore;
use crate::memory::types::{Memory, MemoryInput};

/// What a summary-enrichment collaborator sees of a memory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemorySnippet {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

impl From<Memory> for MemorySnippet {
    fn from(memory: Memory) -> Self {
        Self {
            title: memory.title,
            content: memory.content,
            tags: memory.tags,
        }
    }
}

/// Free-text lookup used to enrich retrospectives.
pub trait MemoryLookup {
    fn search_memory(&self, query: &str) -> Result<Vec<MemorySnippet>>;
}

pub struct MemoryEngine {
    store: MemoryStore,
    index: HnswIndex,
    embedder: Box<dyn EmbeddingProvider>,
    search: SearchConfig,
    snapshot_interval: usize,
    pending: usize,
}

impl MemoryEngine {
    /// Open the store at `path` and bring its index up to date.
    pub fn open(path: impl AsRef<Path>, config: &MemvaultConfig) -> Result<Self> {
        config.retrieval.validate()?;
        let hnsw = config.index.hnsw();
        // Validates the index parameters before touching the file
        let empty = HnswIndex::new(hnsw)?;

        let store = MemoryStore::initialize(path)?;
        let embedder = create_provider(hnsw.dimensions);

        let mut engine = Self {
            store,
            index: empty,
            embedder,
            search: config.retrieval.clone(),
            snapshot_interval: config.storage.snapshot_interval,
            pending: 0,
        };

        match engine.load_snapshot(&hnsw)? {
            Some(index) => {
                tracing::info!(nodes = index.len(), "index restored from snapshot");
                engine.index = index;
            }
            None => {
                engine.rebuild(hnsw)?;
            }
        }
        Ok(engine)
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn index(&self) -> &HnswIndex {
        &self.index
    }

    /// Save a memory and index it. Reusing an ID replaces the old record and vector.
    pub fn remember(&mut self, input: MemoryInput) -> Result<Memory> {
        let memory = self.store.save_memory(input)?;
        let vector = self.embedder.embed(&memory.indexed_text());
        self.index.add(memory.id.clone(), &vector)?;
        self.mutated()?;
        Ok(memory)
    }

    /// Restore an exported memory with its original timestamps and index it.
    /// Returns `false` if the ID is already stored.
    pub fn import(&mut self, memory: &Memory) -> Result<bool> {
        if !self.store.import_memory(memory)? {
            return Ok(false);
        }
        let vector = self.embedder.embed(&memory.indexed_text());
        self.index.add(memory.id.clone(), &vector)?;
        self.mutated()?;
        Ok(true)
    }

    /// Delete a memory and its vector. Returns `false` if it did not exist.
    pub fn forget(&mut self, id: &str) -> Result<bool> {
        let deleted = self.store.delete_memory(id)?;
        let unindexed = self.index.remove(id);
        if deleted || unindexed {
            self.mutated()?;
        }
        Ok(deleted)
    }

    pub fn get(&self, id: &str) -> Result<Option<Memory>> {
        self.store.get_memory(id)
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        self.searcher().search(query)
    }

    pub fn timeline(&self, anchor_id: &str, radius: usize) -> Result<Vec<TimelineEntry>> {
        self.searcher().get_timeline(anchor_id, radius)
    }

    pub fn details(&self, ids: &[String]) -> Result<Vec<Memory>> {
        self.searcher().get_full_details(ids)
    }

    /// Every stored memory, oldest first.
    pub fn memories(&self) -> Result<Vec<Memory>> {
        self.store.list_memories()
    }

    pub fn stats(&self, project: Option<&str>) -> Result<StatsResponse> {
        memory_stats(&self.store, &self.index, project)
    }

    /// Rebuild the index from stored records. Returns the node count.
    pub fn reindex(&mut self) -> Result<usize> {
        self.rebuild(*self.index.config())?;
        Ok(self.index.len())
    }

    /// Persist the index snapshot and checkpoint the store.
    pub fn flush(&mut self) -> Result<()> {
        self.write_snapshot()?;
        self.store.save_to_disk()
    }

    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.store.close()
    }

    fn searcher(&self) -> MemorySearch<'_> {
        MemorySearch::new(&self.store, &self.index, self.embedder.as_ref(), &self.search)
    }

    fn mutated(&mut self) -> Result<()> {
        self.pending += 1;
        if self.snapshot_interval > 0 && self.pending >= self.snapshot_interval {
            self.write_snapshot()?;
        }
        Ok(())
    }

    fn write_snapshot(&mut self) -> Result<()> {
        let bytes = self.index.serialize();
        self.store.save_index_snapshot(self.index.dimensions(), &bytes)?;
        self.pending = 0;
        Ok(())
    }

    /// The persisted index, if it still describes the stored records.
    fn load_snapshot(&self, hnsw: &HnswConfig) -> Result<Option<HnswIndex>> {
        let identifier = self.embedder.identifier();
        match self.store.vectorizer()? {
            Some(stored) if stored == identifier => {}
            stored => {
                tracing::warn!(
                    stored = stored.as_deref().unwrap_or("(none)"),
                    current = %identifier,
                    "vectorizer changed, index snapshot is stale"
                );
                return Ok(None);
            }
        }

        let Some((dimensions, bytes)) = self.store.load_index_snapshot()? else {
            return Ok(None);
        };
        if dimensions != hnsw.dimensions {
            tracing::warn!(
                stored = dimensions,
                configured = hnsw.dimensions,
                "index snapshot has different dimensions"
            );
            return Ok(None);
        }

        let mut index = match HnswIndex::deserialize(&bytes) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(error = %e, "index snapshot is unreadable");
                return Ok(None);
            }
        };
        if index.dimensions() != hnsw.dimensions {
            tracing::warn!("index snapshot header disagrees with its recorded dimensions");
            return Ok(None);
        }

        let stored: BTreeSet<String> = self.store.all_ids()?.into_iter().collect();
        let indexed: BTreeSet<&str> = index.labels().collect();
        if indexed.len() != stored.len() || !stored.iter().all(|id| indexed.contains(id.as_str())) {
            tracing::warn!(
                stored = stored.len(),
                indexed = indexed.len(),
                "index snapshot is out of date"
            );
            return Ok(None);
        }

        if let Some(seed) = hnsw.seed {
            index.reseed(seed);
        }
        Ok(Some(index))
    }

    /// Re-vectorize every stored memory into a fresh index and persist it.
    fn rebuild(&mut self, hnsw: HnswConfig) -> Result<()> {
        let mut index = HnswIndex::new(hnsw)?;
        let memories = self.store.list_memories()?;
        let texts: Vec<String> = memories.iter().map(Memory::indexed_text).collect();
        let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = self.embedder.embed_batch(&texts);
        for (memory, vector) in memories.iter().zip(&vectors) {
            index.add(memory.id.clone(), vector)?;
        }
        self.index = index;
        self.store.set_vectorizer(&self.embedder.identifier())?;
        self.write_snapshot()?;
        tracing::info!(nodes = self.index.len(), "index rebuilt from store");
        Ok(())
    }
}

impl MemoryLookup for MemoryEngine {
    fn search_memory(&self, query: &str) -> Result<Vec<MemorySnippet>> {
        let hits = self.search(&SearchQuery::new(query))?;
        let ids: Vec<String> = hits.into_iter().map(|hit| hit.id).collect();
        Ok(self
            .details(&ids)?
            .into_iter()
            .map(MemorySnippet::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::MemoryType;
    use tempfile::TempDir;

    fn test_config() -> MemvaultConfig {
        let mut config = MemvaultConfig::default();
        config.index.dimensions = 64;
        config.index.seed = Some(3);
        config.storage.snapshot_interval = 4;
        config
    }

    fn note(id: &str, title: &str, content: &str) -> MemoryInput {
        MemoryInput::new(MemoryType::Discovery, title, content).with_id(id)
    }

    #[test]
    fn remember_indexes_and_forget_unindexes() {
        let tmp = TempDir::new().unwrap();
        let mut engine = MemoryEngine::open(tmp.path().join("e.db"), &test_config()).unwrap();

        engine.remember(note("a", "cache eviction", "LRU policy")).unwrap();
        assert!(engine.index().contains("a"));

        assert!(engine.forget("a").unwrap());
        assert!(!engine.index().contains("a"));
        assert!(!engine.forget("a").unwrap());
    }

    #[test]
    fn snapshot_is_reused_when_current() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("e.db");
        let config = test_config();

        let mut engine = MemoryEngine::open(&path, &config).unwrap();
        engine.remember(note("a", "alpha", "first")).unwrap();
        engine.remember(note("b", "beta", "second")).unwrap();
        let before = engine.index().serialize();
        engine.close().unwrap();

        let engine = MemoryEngine::open(&path, &config).unwrap();
        assert_eq!(engine.index().serialize(), before);
    }

    #[test]
    fn stale_snapshot_triggers_rebuild() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("e.db");
        let config = test_config();

        let mut engine = MemoryEngine::open(&path, &config).unwrap();
        engine.remember(note("a", "alpha", "first")).unwrap();
        engine.flush().unwrap();
        // Below the snapshot interval, so the persisted snapshot lacks "b"
        engine.remember(note("b", "beta", "second")).unwrap();
        drop(engine);

        let engine = MemoryEngine::open(&path, &config).unwrap();
        assert_eq!(engine.index().len(), 2);
        assert!(engine.index().contains("b"));
    }

    #[test]
    fn dimension_change_rebuilds_index() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("e.db");
        let mut config = test_config();

        let mut engine = MemoryEngine::open(&path, &config).unwrap();
        engine.remember(note("a", "alpha", "first")).unwrap();
        engine.close().unwrap();

        config.index.dimensions = 32;
        let engine = MemoryEngine::open(&path, &config).unwrap();
        assert_eq!(engine.index().dimensions(), 32);
        assert!(engine.index().contains("a"));
        assert_eq!(
            engine.store().vectorizer().unwrap().as_deref(),
            Some("hash-v1/32")
        );
    }

    #[test]
    fn lookup_returns_snippets() {
        let tmp = TempDir::new().unwrap();
        let mut engine = MemoryEngine::open(tmp.path().join("e.db"), &test_config()).unwrap();
        engine
            .remember(
                note("auth", "Token refresh", "Refresh tokens rotate on every login")
                    .with_tags(["auth"]),
            )
            .unwrap();

        let snippets = engine.search_memory("token refresh").unwrap();
        assert_eq!(snippets[0].title, "Token refresh");
        assert_eq!(snippets[0].tags, vec!["auth"]);
    }
}
