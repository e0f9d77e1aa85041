//! # Pipeline Data Model
//!
//! Value types that flow through the query pipeline: the user's [`Query`], its
//! [`SubQuery`] decomposition, the raw [`RetrievedChunk`]s returned by a vector
//! store, the deduplicated [`ContextBlock`] handed to the generator, and the
//! final [`Answer`].

use crate::errors::RagError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A raw natural-language question submitted by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query(String);

impl Query {
    /// Validates and wraps the query text. Whitespace-only text is rejected.
    pub fn new(text: impl Into<String>) -> Result<Self, RagError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One atomic, self-contained question derived from a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SubQuery(String);

impl SubQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn from_query(query: &Query) -> Self {
        Self(query.as_str().to_string())
    }

    pub(crate) fn new_trimmed(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }
}

impl fmt::Display for SubQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The `(source, source_detail)` pair identifying where a chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub source_detail: String,
}

impl Provenance {
    pub fn new(source: impl Into<String>, source_detail: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_detail: source_detail.into(),
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Source: {}, {}]", self.source, self.source_detail)
    }
}

/// A citation is a provenance pair quoted back by the generator.
pub type Citation = Provenance;

/// A passage as returned by a vector store. Provenance may be incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_detail: Option<String>,
}

impl RetrievedChunk {
    pub fn new(
        text: impl Into<String>,
        source: impl Into<String>,
        source_detail: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            source: Some(source.into()),
            source_detail: Some(source_detail.into()),
        }
    }

    /// Returns the provenance pair when both halves are present and non-blank.
    pub fn provenance(&self) -> Option<Provenance> {
        let source = self.source.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let detail = self
            .source_detail
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())?;
        Some(Provenance::new(source, detail))
    }

    pub(crate) fn into_grounded(self) -> Option<GroundedChunk> {
        let provenance = self.provenance()?;
        Some(GroundedChunk {
            text: self.text,
            provenance,
        })
    }
}

/// A chunk whose provenance is guaranteed to be complete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GroundedChunk {
    pub text: String,
    pub provenance: Provenance,
}

/// Counters collected while assembling a [`ContextBlock`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    pub retrieved: usize,
    pub duplicates_removed: usize,
    pub dropped_without_provenance: usize,
    pub failed_subqueries: usize,
}

/// The ordered, deduplicated context for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextBlock {
    chunks: Vec<GroundedChunk>,
    stats: ContextStats,
}

impl ContextBlock {
    pub(crate) fn new(chunks: Vec<GroundedChunk>, stats: ContextStats) -> Self {
        Self { chunks, stats }
    }

    pub fn chunks(&self) -> &[GroundedChunk] {
        &self.chunks
    }

    pub fn stats(&self) -> ContextStats {
        self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut ContextStats {
        &mut self.stats
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The set of provenance pairs a generated answer may cite.
    pub fn provenances(&self) -> HashSet<Provenance> {
        self.chunks.iter().map(|c| c.provenance.clone()).collect()
    }

    /// Renders the block in the layout the answer-generation prompt expects:
    /// a citation label line followed by the chunk text, chunks separated by a
    /// blank line.
    pub fn render(&self) -> String {
        self.chunks
            .iter()
            .map(|c| format!("{}\n{}", c.provenance, c.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// One unit of a parsed answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerSegment {
    Supported {
        text: String,
        citations: Vec<Citation>,
    },
    Refusal,
}

/// A validated, citation-grounded answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub text: String,
    pub segments: Vec<AnswerSegment>,
}

impl Answer {
    /// The answer returned when no context supports any part of the query.
    pub fn refusal() -> Self {
        Self {
            text: crate::prompts::REFUSAL_SENTENCE.to_string(),
            segments: vec![AnswerSegment::Refusal],
        }
    }

    pub fn is_refusal(&self) -> bool {
        !self.segments.is_empty()
            && self
                .segments
                .iter()
                .all(|s| matches!(s, AnswerSegment::Refusal))
    }

    /// Distinct citations in first-seen order.
    pub fn citations(&self) -> Vec<Citation> {
        let mut seen = HashSet::new();
        self.segments
            .iter()
            .filter_map(|s| match s {
                AnswerSegment::Supported { citations, .. } => Some(citations),
                AnswerSegment::Refusal => None,
            })
            .flatten()
            .filter(|c| seen.insert((*c).clone()))
            .cloned()
            .collect()
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
