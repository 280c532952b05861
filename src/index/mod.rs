//! Hierarchical Navigable Small World (HNSW) index over dense vectors.
//!
//! Nodes live in a flat arena (`slots`) and reference each other by slot
//! number, so the cyclic proximity graph never needs shared ownership. A
//! `label -> slot` map gives O(1) lookup by the caller's key.
//!
//! Ordering invariants that make serialization round-trips rank-exact:
//!
//! - new nodes are always appended, so slot order is insertion order;
//! - the entry point is the first live slot whose level equals `max_level`;
//! - candidates compare by `(distance, newer slot first)`, which depends only
//!   on relative slot order, and relative order survives compaction and
//!   [`HnswIndex::deserialize`].

mod codec;
mod graph;

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};

pub use codec::{FORMAT_VERSION, MAGIC};

use graph::{Candidate, Query};

/// Default maximum neighbors per node on layers above 0 (layer 0 allows `2 * m`).
pub const DEFAULT_M: usize = 16;

/// Default candidate-list width used while inserting.
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Hard cap on a node's top layer. With `m >= 2` a level above this has
/// probability below 2^-16.
pub const MAX_LEVEL: usize = 16;

/// Compaction runs once tombstoned slots outnumber live ones past this size.
const COMPACT_MIN_SLOTS: usize = 64;

/// Construction parameters for an [`HnswIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Vector length, fixed for the lifetime of the index.
    pub dimensions: usize,
    /// Maximum neighbors per node per layer.
    pub m: usize,
    /// Beam width while inserting; search uses `max(ef_construction, k)`.
    pub ef_construction: usize,
    /// Seed for level assignment. `None` draws from OS entropy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl HnswConfig {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            m: DEFAULT_M,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            seed: None,
        }
    }

    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    pub fn with_ef_construction(mut self, ef_construction: usize) -> Self {
        self.ef_construction = ef_construction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(MemoryError::InvalidConfig("dimensions must be > 0".into()));
        }
        if self.m < 2 {
            return Err(MemoryError::InvalidConfig(format!(
                "m must be >= 2, got {}",
                self.m
            )));
        }
        if self.ef_construction == 0 {
            return Err(MemoryError::InvalidConfig(
                "ef_construction must be > 0".into(),
            ));
        }
        let limit = u32::MAX as usize;
        if self.dimensions > limit || self.m > limit || self.ef_construction > limit {
            return Err(MemoryError::InvalidConfig(
                "parameters must fit in 32 bits".into(),
            ));
        }
        Ok(())
    }
}

/// One search hit: the stored label and its cosine distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub label: String,
    pub distance: f32,
}

#[derive(Debug, Clone)]
struct Node {
    label: String,
    vector: Vec<f32>,
    norm: f32,
    /// Adjacency per layer; `links.len() - 1` is the node's top level.
    links: Vec<Vec<usize>>,
}

impl Node {
    fn new(label: String, vector: Vec<f32>, level: usize) -> Self {
        let norm = graph::norm(&vector);
        Self {
            label,
            vector,
            norm,
            links: vec![Vec::new(); level + 1],
        }
    }

    fn level(&self) -> usize {
        self.links.len() - 1
    }
}

/// In-memory approximate nearest-neighbor index with binary persistence.
#[derive(Debug)]
pub struct HnswIndex {
    config: HnswConfig,
    slots: Vec<Option<Node>>,
    labels: HashMap<String, usize>,
    entry: Option<usize>,
    max_level: usize,
    level_mult: f64,
    rng: StdRng,
}

impl HnswIndex {
    /// Create an empty index. Fails with `InvalidConfig` on unusable parameters.
    pub fn new(config: HnswConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            slots: Vec::new(),
            labels: HashMap::new(),
            entry: None,
            max_level: 0,
            level_mult: 1.0 / (config.m as f64).ln(),
            rng,
        })
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// Number of distinct labels currently present.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains_key(label)
    }

    /// Labels in insertion order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.live_nodes().map(|(_, node)| node.label.as_str())
    }

    /// Replace the level-assignment generator, e.g. after [`HnswIndex::deserialize`].
    pub fn reseed(&mut self, seed: u64) {
        self.config.seed = Some(seed);
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Insert `vector` under `label`, replacing any previous entry for it.
    pub fn add(&mut self, label: impl Into<String>, vector: &[f32]) -> Result<()> {
        self.check_dimensions(vector.len())?;
        let label = label.into();
        if self.labels.contains_key(&label) {
            self.remove(&label);
        }

        let level = self.random_level();
        let id = self.slots.len();
        self.slots
            .push(Some(Node::new(label.clone(), vector.to_vec(), level)));
        self.labels.insert(label, id);

        let Some(entry) = self.entry else {
            self.entry = Some(id);
            self.max_level = level;
            tracing::debug!(slot = id, level, "hnsw: first node");
            return Ok(());
        };

        let query = Query::new(vector);
        let mut nearest = vec![Candidate::new(self.distance_to(&query, entry), entry)];
        for layer in (level + 1..=self.max_level).rev() {
            nearest = self.search_layer(&query, &nearest, 1, layer);
        }

        for layer in (0..=level.min(self.max_level)).rev() {
            let mut found = self.search_layer(&query, &nearest, self.config.ef_construction, layer);
            found.retain(|c| c.id != id);
            let neighbors = self.select_neighbors(&found, self.max_links(layer));
            for &neighbor in &neighbors {
                self.connect(neighbor, id, layer);
            }
            if let Some(node) = self.slots[id].as_mut() {
                node.links[layer] = neighbors;
            }
            if !found.is_empty() {
                nearest = found;
            }
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry = Some(id);
        }
        tracing::debug!(slot = id, level, size = self.len(), "hnsw: inserted");
        Ok(())
    }

    /// Up to `k` nearest labels, closest first.
    pub fn search(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_dimensions(vector.len())?;
        let Some(entry) = self.entry else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = Query::new(vector);
        let mut nearest = vec![Candidate::new(self.distance_to(&query, entry), entry)];
        for layer in (1..=self.max_level).rev() {
            nearest = self.search_layer(&query, &nearest, 1, layer);
        }
        let ef = self.config.ef_construction.max(k);
        let mut found = self.search_layer(&query, &nearest, ef, 0);

        let wanted = k.min(self.len());
        if found.len() < wanted {
            self.fill_unreached(&query, &mut found);
        }

        Ok(found
            .into_iter()
            .take(k)
            .filter_map(|c| {
                self.node(c.id).map(|node| Neighbor {
                    label: node.label.clone(),
                    distance: c.distance,
                })
            })
            .collect())
    }

    /// Remove `label` and every edge pointing at it. Returns `false` if absent.
    pub fn remove(&mut self, label: &str) -> bool {
        let Some(id) = self.labels.remove(label) else {
            return false;
        };
        let Some(removed) = self.slots[id].take() else {
            return false;
        };

        let mut damaged: Vec<(usize, usize)> = Vec::new();
        for (slot, node) in self.slots.iter_mut().enumerate() {
            let Some(node) = node.as_mut() else { continue };
            for (layer, links) in node.links.iter_mut().enumerate() {
                let before = links.len();
                links.retain(|&n| n != id);
                if links.len() != before {
                    damaged.push((slot, layer));
                }
            }
        }
        for (slot, layer) in damaged {
            self.repair(slot, layer, &removed);
        }

        if self.entry == Some(id) {
            self.elect_entry();
        }
        tracing::debug!(label, slot = id, size = self.len(), "hnsw: removed");

        let live = self.labels.len();
        if self.slots.len() >= COMPACT_MIN_SLOTS && self.slots.len() - live > live {
            self.compact();
        }
        true
    }

    fn check_dimensions(&self, actual: usize) -> Result<()> {
        if actual != self.config.dimensions {
            return Err(MemoryError::DimensionMismatch {
                expected: self.config.dimensions,
                actual,
            });
        }
        Ok(())
    }

    /// Geometric level: `floor(-ln(U) / ln(m))`, capped at [`MAX_LEVEL`].
    fn random_level(&mut self) -> usize {
        let uniform: f64 = self.rng.gen();
        let level = (-(1.0 - uniform).ln() * self.level_mult).floor() as usize;
        level.min(MAX_LEVEL)
    }

    fn max_links(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.m * 2
        } else {
            self.config.m
        }
    }

    fn node(&self, id: usize) -> Option<&Node> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    fn live_nodes(&self) -> impl Iterator<Item = (usize, &Node)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|node| (id, node)))
    }

    /// Add a directed edge, shrinking the list with the selection heuristic on overflow.
    fn connect(&mut self, from: usize, to: usize, layer: usize) {
        let max = self.max_links(layer);
        let Some(node) = self.slots[from].as_mut() else {
            return;
        };
        let Some(links) = node.links.get_mut(layer) else {
            return;
        };
        if links.contains(&to) {
            return;
        }
        links.push(to);
        if links.len() <= max {
            return;
        }

        let pool: Vec<usize> = links.clone();
        let pruned = self.choose_links(from, layer, pool, max);
        if let Some(node) = self.slots[from].as_mut() {
            node.links[layer] = pruned;
        }
    }

    /// Reconnect `slot` after it lost an edge to `removed`, drawing
    /// replacement candidates from the removed node's neighborhood.
    fn repair(&mut self, slot: usize, layer: usize, removed: &Node) {
        let Some(node) = self.node(slot) else {
            return;
        };
        let mut pool = node.links[layer].clone();
        if let Some(orphans) = removed.links.get(layer) {
            for &candidate in orphans {
                if candidate != slot
                    && !pool.contains(&candidate)
                    && self
                        .node(candidate)
                        .is_some_and(|n| n.level() >= layer)
                {
                    pool.push(candidate);
                }
            }
        }
        let relinked = self.choose_links(slot, layer, pool, self.max_links(layer));
        if let Some(node) = self.slots[slot].as_mut() {
            node.links[layer] = relinked;
        }
    }

    fn choose_links(&self, from: usize, layer: usize, pool: Vec<usize>, max: usize) -> Vec<usize> {
        let Some(node) = self.node(from) else {
            return Vec::new();
        };
        let origin = Query::of(node);
        let mut candidates: Vec<Candidate> = pool
            .into_iter()
            .filter(|&n| n != from && self.node(n).is_some_and(|c| c.level() >= layer))
            .map(|n| Candidate::new(self.distance_to(&origin, n), n))
            .collect();
        candidates.sort();
        self.select_neighbors(&candidates, max)
    }

    fn elect_entry(&mut self) {
        let mut best: Option<(usize, usize)> = None;
        for (id, node) in self.live_nodes() {
            if best.map_or(true, |(_, level)| node.level() > level) {
                best = Some((id, node.level()));
            }
        }
        match best {
            Some((id, level)) => {
                self.entry = Some(id);
                self.max_level = level;
            }
            None => {
                self.entry = None;
                self.max_level = 0;
            }
        }
    }

    /// Drop tombstoned slots, keeping the relative order of live nodes.
    fn compact(&mut self) {
        let mut remap = vec![usize::MAX; self.slots.len()];
        let mut next = 0;
        for (old, slot) in self.slots.iter().enumerate() {
            if slot.is_some() {
                remap[old] = next;
                next += 1;
            }
        }

        let slots = std::mem::take(&mut self.slots);
        self.slots = slots
            .into_iter()
            .flatten()
            .map(|mut node| {
                for links in &mut node.links {
                    for n in links.iter_mut() {
                        *n = remap[*n];
                    }
                }
                Some(node)
            })
            .collect();
        for slot in self.labels.values_mut() {
            *slot = remap[*slot];
        }
        self.entry = self.entry.map(|e| remap[e]);
        tracing::debug!(slots = self.slots.len(), "hnsw: compacted arena");
    }

    /// Assemble an index from decoded parts. `nodes` are in insertion order
    /// and neighbor references are positions within `nodes`.
    fn from_parts(config: HnswConfig, nodes: Vec<Node>) -> Result<Self> {
        let mut index = Self::new(config)?;
        for (id, node) in nodes.iter().enumerate() {
            if index.labels.insert(node.label.clone(), id).is_some() {
                return Err(MemoryError::invalid_format(format!(
                    "duplicate label {:?}",
                    node.label
                )));
            }
        }
        index.slots = nodes.into_iter().map(Some).collect();
        index.elect_entry();
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot % dim] = 1.0;
        v
    }

    fn seeded(dim: usize) -> HnswIndex {
        HnswIndex::new(HnswConfig::new(dim).with_m(4).with_ef_construction(16).with_seed(7)).unwrap()
    }

    #[test]
    fn rejects_bad_config() {
        assert!(matches!(
            HnswIndex::new(HnswConfig::new(0)),
            Err(MemoryError::InvalidConfig(_))
        ));
        assert!(matches!(
            HnswIndex::new(HnswConfig::new(8).with_m(1)),
            Err(MemoryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn first_add_becomes_entry_point() {
        let mut index = seeded(4);
        index.add("a", &unit(4, 0)).unwrap();
        assert_eq!(index.entry, Some(0));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn links_stay_within_layer_bounds() {
        let mut index = seeded(8);
        for i in 0..60 {
            let v: Vec<f32> = (0..8).map(|d| ((i * 7 + d * 3) % 11) as f32).collect();
            index.add(format!("n{i}"), &v).unwrap();
        }
        for (_, node) in index.live_nodes() {
            for (layer, links) in node.links.iter().enumerate() {
                assert!(links.len() <= index.max_links(layer));
                assert!(links.iter().all(|&n| index.node(n).is_some()));
            }
        }
    }

    #[test]
    fn readd_leaves_no_stale_edges() {
        let mut index = seeded(4);
        index.add("a", &unit(4, 0)).unwrap();
        index.add("b", &unit(4, 1)).unwrap();
        index.add("a", &unit(4, 2)).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.slots[0].is_none());
        for (_, node) in index.live_nodes() {
            assert!(node.links.iter().all(|links| !links.contains(&0)));
        }
    }

    #[test]
    fn seeded_indexes_build_identical_graphs() {
        let build = || {
            let mut index = seeded(6);
            for i in 0..30 {
                let v: Vec<f32> = (0..6).map(|d| ((i + 1) * (d + 2) % 13) as f32).collect();
                index.add(format!("n{i}"), &v).unwrap();
            }
            index
                .live_nodes()
                .map(|(_, n)| n.links.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn compaction_preserves_search() {
        let mut index = seeded(8);
        for i in 0..80 {
            let v: Vec<f32> = (0..8).map(|d| ((i * 5 + d) % 17) as f32 + 1.0).collect();
            index.add(format!("n{i}"), &v).unwrap();
        }
        for i in 0..60 {
            index.remove(&format!("n{i}"));
        }
        assert_eq!(index.len(), 20);
        assert!(index.slots.len() < 80);
        let target: Vec<f32> = (0..8).map(|d| ((70 * 5 + d) % 17) as f32 + 1.0).collect();
        let hits = index.search(&target, 1).unwrap();
        assert_eq!(hits[0].label, "n70");
        assert!(hits[0].distance < 1e-5);
    }
}
