//! Hybrid retrieval over one store and its vector index.
//!
//! Lexical ranking is SQLite FTS5 `bm25()` over title + content; semantic
//! ranking delegates to [`HnswIndex::search`]. Hybrid mode fuses the two
//! lists with weighted reciprocal-rank fusion, so an item found both ways
//! collects two contributions and outranks comparable single-list items.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::index::HnswIndex;
use crate::memory::store::MemoryStore;
use crate::memory::types::{Memory, MemoryType};

// ── Public types ──────────────────────────────────────────────────────────────

/// Which ranking(s) a query runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Bm25,
    Vector,
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bm25 => "bm25",
            Self::Vector => "vector",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bm25" => Ok(Self::Bm25),
            "vector" => Ok(Self::Vector),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown search mode: {other}")),
        }
    }
}

/// Which ranking(s) produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Bm25,
    Vector,
    Both,
}

/// A search request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default)]
    pub mode: SearchMode,
    /// Restrict results to one type. Applied after ranking, before truncation.
    #[serde(rename = "type", default)]
    pub memory_type: Option<MemoryType>,
    /// Falls back to [`SearchConfig::default_limit`].
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One ranked result. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// Higher is better. BM25 relevance, `1 - distance`, or fused RRF score
    /// depending on the mode.
    pub score: f64,
    /// Cosine distance from the query, when the vector ranking saw this item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    pub match_type: MatchType,
}

/// Where a timeline entry sits relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelinePosition {
    Before,
    Anchor,
    After,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub position: TimelinePosition,
    #[serde(flatten)]
    pub memory: Memory,
}

/// Ranking knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// RRF damping constant `k` in `w / (k + rank)`.
    pub rrf_k: usize,
    pub bm25_weight: f64,
    pub vector_weight: f64,
    /// Each ranking fetches `limit * candidate_multiplier` candidates.
    pub candidate_multiplier: usize,
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60,
            bm25_weight: 1.0,
            vector_weight: 1.0,
            candidate_multiplier: 3,
            default_limit: 10,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, weight) in [("bm25_weight", self.bm25_weight), ("vector_weight", self.vector_weight)] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(MemoryError::InvalidConfig(format!(
                    "{name} must be a finite, non-negative number (got {weight})"
                )));
            }
        }
        if self.candidate_multiplier == 0 {
            return Err(MemoryError::InvalidConfig(
                "candidate_multiplier must be > 0".into(),
            ));
        }
        if self.default_limit == 0 {
            return Err(MemoryError::InvalidConfig("default_limit must be > 0".into()));
        }
        Ok(())
    }
}

// ── Search ────────────────────────────────────────────────────────────────────

/// Borrowed view over a store and its index for the duration of a query.
pub struct MemorySearch<'a> {
    store: &'a MemoryStore,
    index: &'a HnswIndex,
    embedder: &'a dyn EmbeddingProvider,
    config: &'a SearchConfig,
}

impl<'a> MemorySearch<'a> {
    pub fn new(
        store: &'a MemoryStore,
        index: &'a HnswIndex,
        embedder: &'a dyn EmbeddingProvider,
        config: &'a SearchConfig,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            config,
        }
    }

    /// Rank memories against `query`. A blank query, empty corpus, or zero
    /// limit yields an empty list.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        let limit = query.limit.unwrap_or(self.config.default_limit);
        if query.query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        // A type filter may discard most candidates, so widen to the whole corpus.
        let pool = match query.memory_type {
            Some(_) => (self.store.get_memory_count()? as usize).max(self.index.len()),
            None => limit.saturating_mul(self.config.candidate_multiplier),
        };
        if pool == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = match query.mode {
            SearchMode::Bm25 => self
                .lexical(&query.query, pool)?
                .into_iter()
                .map(|hit| SearchHit {
                    id: hit.id,
                    memory_type: hit.memory_type,
                    score: hit.score,
                    distance: None,
                    match_type: MatchType::Bm25,
                })
                .collect(),
            SearchMode::Vector => self
                .semantic(&query.query, pool)?
                .into_iter()
                .map(|hit| SearchHit {
                    id: hit.id,
                    memory_type: hit.memory_type,
                    score: 1.0 - f64::from(hit.distance),
                    distance: Some(hit.distance),
                    match_type: MatchType::Vector,
                })
                .collect(),
            SearchMode::Hybrid => {
                let lexical = self.lexical(&query.query, pool)?;
                let semantic = self.semantic(&query.query, pool)?;
                fuse(&lexical, &semantic, self.config)
            }
        };

        if let Some(wanted) = query.memory_type {
            hits.retain(|hit| hit.memory_type == wanted);
        }
        hits.truncate(limit);

        tracing::debug!(
            mode = %query.mode,
            limit,
            pool,
            returned = hits.len(),
            "search complete"
        );
        Ok(hits)
    }

    /// Memories around `anchor_id` in creation order, at most `radius` on each
    /// side. Unknown anchors yield an empty list.
    pub fn get_timeline(&self, anchor_id: &str, radius: usize) -> Result<Vec<TimelineEntry>> {
        let Some(anchor) = self.store.peek_memory(anchor_id)? else {
            return Ok(Vec::new());
        };
        let (before, after) = self.store.chronological_neighbors(&anchor, radius)?;

        let mut timeline = Vec::with_capacity(before.len() + after.len() + 1);
        timeline.extend(before.into_iter().map(|memory| TimelineEntry {
            position: TimelinePosition::Before,
            memory,
        }));
        timeline.push(TimelineEntry {
            position: TimelinePosition::Anchor,
            memory: anchor,
        });
        timeline.extend(after.into_iter().map(|memory| TimelineEntry {
            position: TimelinePosition::After,
            memory,
        }));
        Ok(timeline)
    }

    /// Full records for `ids`, in the order given; unknown IDs are skipped.
    pub fn get_full_details(&self, ids: &[String]) -> Result<Vec<Memory>> {
        self.store.get_memories(ids)
    }

    fn lexical(&self, query: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        fts_search(self.store.connection(), query, limit)
    }

    fn semantic(&self, query: &str, limit: usize) -> Result<Vec<SemanticHit>> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(query);
        // Neighbors with no positive similarity are not matches, only filler
        let neighbors: Vec<_> = self
            .index
            .search(&vector, limit)?
            .into_iter()
            .filter(|n| n.distance < 1.0)
            .collect();
        if neighbors.is_empty() {
            return Ok(Vec::new());
        }

        let labels: Vec<&str> = neighbors.iter().map(|n| n.label.as_str()).collect();
        let types = self.store.memory_types(&labels)?;

        // Labels with no backing record are skipped; the engine keeps both in step.
        Ok(neighbors
            .into_iter()
            .filter_map(|n| {
                let memory_type = *types.get(&n.label)?;
                Some(SemanticHit {
                    id: n.label,
                    memory_type,
                    distance: n.distance,
                })
            })
            .collect())
    }
}

// ── Internals ─────────────────────────────────────────────────────────────────

struct LexicalHit {
    id: String,
    memory_type: MemoryType,
    score: f64,
}

struct SemanticHit {
    id: String,
    memory_type: MemoryType,
    distance: f32,
}

/// BM25 over `memories_fts`, best first. Scores are negated FTS5 ranks, so
/// higher is better.
fn fts_search(conn: &Connection, query: &str, limit: usize) -> Result<Vec<LexicalHit>> {
    let expr = fts_query(query);
    if expr.is_empty() {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT id, type, rank FROM memories_fts \
         WHERE memories_fts MATCH ?1 ORDER BY rank, id LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![expr, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(id, memory_type, rank)| -> Result<LexicalHit> {
            let memory_type = memory_type.parse::<MemoryType>().map_err(|reason| {
                MemoryError::storage(
                    "unexpected type in full-text index",
                    std::io::Error::new(std::io::ErrorKind::InvalidData, reason),
                )
            })?;
            Ok(LexicalHit {
                id,
                memory_type,
                score: -rank,
            })
        })
        .collect()
}

/// Turn free text into an FTS5 expression: every word quoted, joined with OR
/// so partial matches still rank.
fn fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| word.replace('"', ""))
        .filter(|word| word.chars().any(char::is_alphanumeric))
        .map(|word| format!("\"{word}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Weighted reciprocal-rank fusion with 1-based ranks.
fn fuse(lexical: &[LexicalHit], semantic: &[SemanticHit], config: &SearchConfig) -> Vec<SearchHit> {
    let k = config.rrf_k as f64;
    let mut fused: HashMap<&str, SearchHit> = HashMap::new();

    for (rank, hit) in lexical.iter().enumerate() {
        let entry = fused.entry(hit.id.as_str()).or_insert_with(|| SearchHit {
            id: hit.id.clone(),
            memory_type: hit.memory_type,
            score: 0.0,
            distance: None,
            match_type: MatchType::Bm25,
        });
        entry.score += config.bm25_weight / (k + (rank + 1) as f64);
    }

    for (rank, hit) in semantic.iter().enumerate() {
        let contribution = config.vector_weight / (k + (rank + 1) as f64);
        match fused.entry(hit.id.as_str()) {
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                existing.score += contribution;
                existing.distance = Some(hit.distance);
                existing.match_type = MatchType::Both;
            }
            Entry::Vacant(slot) => {
                slot.insert(SearchHit {
                    id: hit.id.clone(),
                    memory_type: hit.memory_type,
                    score: contribution,
                    distance: Some(hit.distance),
                    match_type: MatchType::Vector,
                });
            }
        }
    }

    let mut hits: Vec<SearchHit> = fused.into_values().collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    hits
}
