// ── Retrospective summaries ──────────────────────────────────────────────────
//
// Compresses a session's raw notes into a short retrospective and, when a
// memory lookup is wired in, appends related memories from earlier sessions.
//
// Enrichment is optional. No lookup, a blank query, or a failing lookup all
// produce the same un-enriched summary; compression itself never fails.

use std::collections::HashSet;

use serde::Serialize;

use crate::memory::{MemoryLookup, MemorySnippet};

/// Longest headline kept, in characters.
const HEADLINE_CHARS: usize = 80;

const DEFAULT_MAX_HIGHLIGHTS: usize = 5;
const DEFAULT_HIGHLIGHT_CHARS: usize = 160;
const DEFAULT_MAX_RELATED: usize = 3;

/// The compressed view of one session.
#[derive(Debug, Clone, Serialize)]
pub struct Retrospective {
    pub headline: String,
    pub highlights: Vec<String>,
    /// Memories from earlier work that relate to this session.
    pub related: Vec<MemorySnippet>,
    /// `false` when no lookup was available or it failed.
    pub enriched: bool,
}

impl Retrospective {
    /// Markdown rendering for prompts and terminals.
    pub fn to_markdown(&self) -> String {
        let mut out = format!("## {}\n", self.headline);
        for highlight in &self.highlights {
            out.push_str(&format!("- {highlight}\n"));
        }
        if !self.related.is_empty() {
            out.push_str("\n### Related memories\n");
            for snippet in &self.related {
                let tags = if snippet.tags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", snippet.tags.join(", "))
                };
                out.push_str(&format!(
                    "- **{}**{tags}: {}\n",
                    snippet.title,
                    truncate(&snippet.content, DEFAULT_HIGHLIGHT_CHARS)
                ));
            }
        }
        out
    }
}

/// Builds [`Retrospective`]s from session notes.
pub struct ContextCompressor<'a> {
    lookup: Option<&'a dyn MemoryLookup>,
    max_highlights: usize,
    highlight_chars: usize,
    max_related: usize,
}

impl Default for ContextCompressor<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ContextCompressor<'a> {
    pub fn new() -> Self {
        Self {
            lookup: None,
            max_highlights: DEFAULT_MAX_HIGHLIGHTS,
            highlight_chars: DEFAULT_HIGHLIGHT_CHARS,
            max_related: DEFAULT_MAX_RELATED,
        }
    }

    pub fn with_lookup(mut self, lookup: &'a dyn MemoryLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_budget(mut self, max_highlights: usize, highlight_chars: usize) -> Self {
        self.max_highlights = max_highlights;
        self.highlight_chars = highlight_chars.max(1);
        self
    }

    pub fn with_max_related(mut self, max_related: usize) -> Self {
        self.max_related = max_related;
        self
    }

    pub fn compress<S: AsRef<str>>(&self, notes: &[S]) -> Retrospective {
        let mut seen = HashSet::new();
        let distinct: Vec<String> = notes
            .iter()
            .map(|note| normalize(note.as_ref()))
            .filter(|note| !note.is_empty())
            .filter(|note| seen.insert(note.to_lowercase()))
            .collect();

        let headline = distinct
            .first()
            .map(|first| truncate(first, HEADLINE_CHARS))
            .unwrap_or_else(|| "No activity recorded".to_string());

        let highlights: Vec<String> = distinct
            .iter()
            .take(self.max_highlights)
            .map(|note| truncate(note, self.highlight_chars))
            .collect();

        let (related, enriched) = self.enrich(&distinct);

        Retrospective {
            headline,
            highlights,
            related,
            enriched,
        }
    }

    fn enrich(&self, notes: &[String]) -> (Vec<MemorySnippet>, bool) {
        let Some(lookup) = self.lookup else {
            return (Vec::new(), false);
        };
        let query = notes
            .iter()
            .take(self.max_highlights)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        if query.trim().is_empty() {
            return (Vec::new(), false);
        }

        match lookup.search_memory(&query) {
            Ok(mut snippets) => {
                snippets.truncate(self.max_related);
                tracing::debug!(related = snippets.len(), "retrospective enriched");
                (snippets, true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "memory lookup failed, summary left un-enriched");
                (Vec::new(), false)
            }
        }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut to at most `max` characters, marking the cut with an ellipsis.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", kept.trim_end())
}
