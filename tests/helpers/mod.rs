#![allow(dead_code)]

use std::path::Path;

use memvault::config::MemvaultConfig;
use memvault::memory::{MemoryEngine, MemoryInput, MemoryType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Engine config with small, seeded index parameters so graphs are reproducible.
pub fn test_config(dimensions: usize) -> MemvaultConfig {
    let mut config = MemvaultConfig::default();
    config.index.dimensions = dimensions;
    config.index.seed = Some(42);
    config.storage.snapshot_interval = 8;
    config
}

/// Open an engine over `path` with [`test_config`] at 128 dimensions.
pub fn open_engine(path: &Path) -> MemoryEngine {
    MemoryEngine::open(path, &test_config(128)).unwrap()
}

pub fn note(id: &str, memory_type: MemoryType, title: &str, content: &str) -> MemoryInput {
    MemoryInput::new(memory_type, title, content).with_id(id)
}

/// Generate a deterministic vector with a spike at position `seed`.
/// Each seed produces a distinct, orthogonal vector.
pub fn spike(dimensions: usize, seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dimensions];
    v[seed % dimensions] = 1.0;
    v
}

/// `count` pseudo-random unit vectors from a fixed seed.
pub fn random_vectors(count: usize, dimensions: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let v: Vec<f32> = (0..dimensions).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            v.into_iter().map(|x| x / norm).collect()
        })
        .collect()
}
