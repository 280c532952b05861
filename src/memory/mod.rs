pub mod engine;
pub mod search;
pub mod stats;
pub mod store;
pub mod types;

pub use engine::{MemoryEngine, MemoryLookup, MemorySnippet};
pub use search::{MatchType, SearchHit, SearchMode, SearchQuery, TimelineEntry, TimelinePosition};
pub use store::MemoryStore;
pub use types::{Memory, MemoryInput, MemoryType};
