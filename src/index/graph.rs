//! Layer traversal and neighbor selection.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use super::{HnswIndex, Node};

/// A query vector with its norm computed once.
pub(super) struct Query<'a> {
    vector: &'a [f32],
    norm: f32,
}

impl<'a> Query<'a> {
    pub(super) fn new(vector: &'a [f32]) -> Self {
        Self {
            vector,
            norm: norm(vector),
        }
    }

    pub(super) fn of(node: &'a Node) -> Self {
        Self {
            vector: &node.vector,
            norm: node.norm,
        }
    }
}

/// A slot paired with its distance to the current query.
///
/// Ordered by distance, then by newer slot first, so traversal is fully
/// deterministic for a given graph.
#[derive(Debug, Clone, Copy)]
pub(super) struct Candidate {
    pub(super) distance: f32,
    pub(super) id: usize,
}

impl Candidate {
    pub(super) fn new(distance: f32, id: usize) -> Self {
        Self { distance, id }
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

pub(super) fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// `1 - cos(a, b)`. A zero-norm side is treated as orthogonal to everything.
fn cosine_distance(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    1.0 - dot / (a_norm * b_norm)
}

impl HnswIndex {
    pub(super) fn distance_to(&self, query: &Query<'_>, id: usize) -> f32 {
        match self.node(id) {
            Some(node) => cosine_distance(query.vector, query.norm, &node.vector, node.norm),
            None => f32::INFINITY,
        }
    }

    fn distance_between(&self, a: usize, b: usize) -> f32 {
        match (self.node(a), self.node(b)) {
            (Some(a), Some(b)) => cosine_distance(&a.vector, a.norm, &b.vector, b.norm),
            _ => f32::INFINITY,
        }
    }

    /// Beam search of width `ef` on one layer. Returns candidates closest first.
    pub(super) fn search_layer(
        &self,
        query: &Query<'_>,
        entry_points: &[Candidate],
        ef: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        let mut visited: HashSet<usize> = entry_points.iter().map(|c| c.id).collect();
        let mut frontier: BinaryHeap<Reverse<Candidate>> =
            entry_points.iter().copied().map(Reverse).collect();
        let mut best: BinaryHeap<Candidate> = entry_points.iter().copied().collect();
        while best.len() > ef {
            best.pop();
        }

        while let Some(Reverse(current)) = frontier.pop() {
            if best.len() >= ef && best.peek().is_some_and(|worst| current > *worst) {
                break;
            }
            let Some(links) = self.node(current.id).and_then(|n| n.links.get(layer)) else {
                continue;
            };
            for &neighbor in links {
                if !visited.insert(neighbor) {
                    continue;
                }
                let candidate = Candidate::new(self.distance_to(query, neighbor), neighbor);
                let admit = best.len() < ef || best.peek().is_some_and(|worst| candidate < *worst);
                if admit {
                    frontier.push(Reverse(candidate));
                    best.push(candidate);
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        best.into_sorted_vec()
    }

    /// Diversity-aware selection: keep a candidate only if it is closer to
    /// the origin than to every neighbor already kept, then top up with the
    /// closest rejected candidates so sparse regions stay connected.
    pub(super) fn select_neighbors(&self, candidates: &[Candidate], m: usize) -> Vec<usize> {
        let mut kept: Vec<Candidate> = Vec::with_capacity(m);
        let mut rejected: Vec<Candidate> = Vec::new();
        for &candidate in candidates {
            if kept.len() >= m {
                break;
            }
            let diverse = kept
                .iter()
                .all(|k| self.distance_between(candidate.id, k.id) > candidate.distance);
            if diverse {
                kept.push(candidate);
            } else {
                rejected.push(candidate);
            }
        }
        for candidate in rejected {
            if kept.len() >= m {
                break;
            }
            kept.push(candidate);
        }
        kept.into_iter().map(|c| c.id).collect()
    }

    /// Exact scan over nodes the traversal never reached. Only used when the
    /// beam came back short of the requested count.
    pub(super) fn fill_unreached(&self, query: &Query<'_>, found: &mut Vec<Candidate>) {
        let seen: HashSet<usize> = found.iter().map(|c| c.id).collect();
        let missing = self
            .live_nodes()
            .filter(|(id, _)| !seen.contains(id))
            .map(|(id, _)| Candidate::new(self.distance_to(query, id), id));
        found.extend(missing);
        found.sort();
        tracing::debug!(size = found.len(), "hnsw: beam fell short, scanned remaining nodes");
    }
}
