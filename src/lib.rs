//! Embedded memory for coding sessions: durable notes searchable both
//! lexically and semantically.
//!
//! Memories are short structured notes (`observation`, `bugfix`, `feature`,
//! `refactor`, `decision`, `discovery`, `change`) kept in one SQLite file per
//! project. Each memory is also vectorized and stored in an in-process HNSW
//! graph, whose serialized form is saved inside the same file.
//!
//! # Architecture
//!
//! - **Vectorizer**: deterministic feature hashing of words and character
//!   trigrams into a fixed-width, L2-normalized vector
//! - **Index**: hand-built HNSW with cosine distance and a bit-exact,
//!   magic-prefixed binary format
//! - **Storage**: SQLite (WAL, synchronous commits) with FTS5 for BM25
//! - **Search**: BM25, vector, or both fused via reciprocal rank fusion
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`db`] — SQLite initialization, schema, migrations, and health checks
//! - [`embedding`] — Text-to-vector hashing pipeline
//! - [`index`] — HNSW graph and its binary codec
//! - [`memory`] — Store, search, stats, and the engine that ties them together
//! - [`retrospective`] — Session summaries enriched from memory
//!
//! ```no_run
//! use memvault::config::MemvaultConfig;
//! use memvault::memory::{MemoryEngine, MemoryInput, MemoryType, SearchQuery};
//!
//! # fn main() -> memvault::error::Result<()> {
//! let config = MemvaultConfig::default();
//! let mut engine = MemoryEngine::open("/tmp/demo.db", &config)?;
//! engine.remember(MemoryInput::new(
//!     MemoryType::Bugfix,
//!     "Session token expiry",
//!     "Tokens were compared in local time; switched to UTC",
//! ))?;
//! for hit in engine.search(&SearchQuery::new("token expiry"))? {
//!     println!("{} {:?} {:.4}", hit.id, hit.match_type, hit.score);
//! }
//! engine.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index;
pub mod memory;
pub mod retrospective;

pub use error::{MemoryError, Result};
