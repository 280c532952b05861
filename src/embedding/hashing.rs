//! Hashed feature-map embedding.
//!
//! Each lowercase word token and each of its boundary-marked character
//! trigrams is hashed (64-bit FNV-1a) into one of `dimensions` bins with a
//! hash-derived sign. Term weights are log-scaled, and the result is
//! L2-normalized so cosine distance behaves. Terms are accumulated in sorted
//! order, which makes the floating-point sums identical on every run.

use std::collections::BTreeMap;

use super::EmbeddingProvider;

/// Version tag for the feature map. Bump when the hashing scheme changes.
const SCHEME: &str = "hash-v1";

/// Weight of a trigram relative to its parent token.
const TRIGRAM_WEIGHT: f32 = 0.5;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of",
    "on", "or", "that", "the", "this", "to", "was", "were", "with",
];

/// Embedding provider backed by [`vectorize`].
#[derive(Debug, Clone, Copy)]
pub struct HashingVectorizer {
    dimensions: usize,
}

impl HashingVectorizer {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl EmbeddingProvider for HashingVectorizer {
    fn embed(&self, text: &str) -> Vec<f32> {
        vectorize(text, self.dimensions)
    }

    fn identifier(&self) -> String {
        format!("{SCHEME}/{}", self.dimensions)
    }
}

/// Map `text` to a `dimensions`-long vector.
///
/// Pure: the same `(text, dimensions)` always yields the same vector. Text
/// without usable tokens (including the empty string) maps to all zeros.
pub fn vectorize(text: &str, dimensions: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimensions];
    if dimensions == 0 {
        return vector;
    }

    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }

    for (term, tf) in &counts {
        let weight = 1.0 + (*tf as f32).ln();
        add_feature(&mut vector, &[&b"w:"[..], term.as_bytes()], weight);

        let marked: Vec<char> = std::iter::once('^')
            .chain(term.chars())
            .chain(std::iter::once('$'))
            .collect();
        for gram in marked.windows(3) {
            let gram: String = gram.iter().collect();
            add_feature(&mut vector, &[&b"g:"[..], gram.as_bytes()], weight * TRIGRAM_WEIGHT);
        }
    }

    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

/// Lowercased alphanumeric tokens, minus stopwords and single characters.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 1)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
}

fn add_feature(vector: &mut [f32], parts: &[&[u8]], weight: f32) {
    let hash = fnv1a(parts);
    let bin = (hash % vector.len() as u64) as usize;
    let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
    vector[bin] += sign * weight;
}

fn fnv1a(parts: &[&[u8]]) -> u64 {
    let mut hash = FNV_OFFSET;
    for part in parts {
        for byte in *part {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}
