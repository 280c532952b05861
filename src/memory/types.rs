//! Core memory type definitions.
//!
//! Defines [`MemoryType`] (the closed set of note categories), [`Memory`]
//! (a full stored record), and [`MemoryInput`] (what a caller hands to the
//! store).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a memory. Closed set, used for filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Something noticed while working.
    #[default]
    Observation,
    /// A defect and how it was fixed.
    Bugfix,
    /// New functionality that was added.
    Feature,
    /// A structural change with no behavior change.
    Refactor,
    /// A choice made between alternatives, and why.
    Decision,
    /// Something learned about the codebase or its environment.
    Discovery,
    /// Any other change worth remembering.
    Change,
}

impl MemoryType {
    pub const ALL: [MemoryType; 7] = [
        Self::Observation,
        Self::Bugfix,
        Self::Feature,
        Self::Refactor,
        Self::Decision,
        Self::Discovery,
        Self::Change,
    ];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Observation => "observation",
            Self::Bugfix => "bugfix",
            Self::Feature => "feature",
            Self::Refactor => "refactor",
            Self::Decision => "decision",
            Self::Discovery => "discovery",
            Self::Change => "change",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown memory type: {s}"))
    }
}

/// A memory record, matching the `memories` table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Primary key; caller-supplied or UUID v7.
    pub id: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub title: String,
    pub content: String,
    /// Grouping tag, usually the project name.
    pub project: String,
    /// Display order is preserved; matching ignores order.
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every direct read.
    pub accessed_at: DateTime<Utc>,
}

impl Memory {
    /// Title and content joined — the unit of vectorization and lexical indexing.
    pub fn indexed_text(&self) -> String {
        indexed_text(&self.title, &self.content)
    }
}

pub(crate) fn indexed_text(title: &str, content: &str) -> String {
    format!("{title}\n{content}")
}

/// Caller-constructed memory, before the store assigns timestamps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryInput {
    /// Reusing an existing ID replaces that record.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub memory_type: MemoryType,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl MemoryInput {
    pub fn new(memory_type: MemoryType, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            memory_type,
            title: title.into(),
            content: content.into(),
            project: String::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_type_round_trips_through_str() {
        for t in MemoryType::ALL {
            assert_eq!(t.as_str().parse::<MemoryType>().unwrap(), t);
        }
        assert!("gossip".parse::<MemoryType>().is_err());
    }

    #[test]
    fn memory_type_serializes_snake_case() {
        let json = serde_json::to_string(&MemoryType::Bugfix).unwrap();
        assert_eq!(json, "\"bugfix\"");
    }

    #[test]
    fn input_builder_sets_fields() {
        let input = MemoryInput::new(MemoryType::Decision, "Use WAL", "Readers never block")
            .with_id("wal")
            .with_project("core")
            .with_tags(["sqlite", "durability"]);
        assert_eq!(input.id.as_deref(), Some("wal"));
        assert_eq!(input.project, "core");
        assert_eq!(input.tags, vec!["sqlite", "durability"]);
    }
}
