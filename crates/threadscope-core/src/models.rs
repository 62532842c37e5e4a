//! Core data models shared by collection, composition, scoring, and
//! classification.
//!
//! Records produced by a collector ([`RootItem`], [`ReplyItem`]) are never
//! mutated downstream. [`Artifact`]s are derived from them by the composer;
//! [`ScoreRecord`]s, [`ClassificationResult`]s and [`FailureRecord`]s are
//! produced by the batch passes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Text rendered for a deleted body or author.
pub const DELETED_SENTINEL: &str = "[deleted]";
/// Text rendered for content removed by a moderator.
pub const REMOVED_SENTINEL: &str = "[removed]";
/// Text rendered for a field the source did not return at all.
pub const UNAVAILABLE_SENTINEL: &str = "[unavailable]";

/// A body or author field that may be unavailable.
///
/// Sentinels are distinct from `Text(String::new())`: an empty body is
/// real content, a deleted one is not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "text", rename_all = "snake_case")]
pub enum Content {
    Text(String),
    Deleted,
    Removed,
    Unavailable,
}

impl Content {
    /// Interpret a raw source value, mapping the source's own sentinel
    /// strings onto [`Content`] sentinels.
    pub fn from_source(raw: Option<&str>) -> Self {
        match raw {
            None => Content::Unavailable,
            Some(DELETED_SENTINEL) => Content::Deleted,
            Some(REMOVED_SENTINEL) => Content::Removed,
            Some(text) => Content::Text(text.to_string()),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Content::Text(value.into())
    }

    pub fn is_sentinel(&self) -> bool {
        !matches!(self, Content::Text(_))
    }

    /// The text itself, or the sentinel marker for unavailable content.
    pub fn render(&self) -> &str {
        match self {
            Content::Text(text) => text,
            Content::Deleted => DELETED_SENTINEL,
            Content::Removed => REMOVED_SENTINEL,
            Content::Unavailable => UNAVAILABLE_SENTINEL,
        }
    }

    /// Split into a storage state tag and optional text.
    pub fn to_parts(&self) -> (&'static str, Option<&str>) {
        match self {
            Content::Text(text) => ("text", Some(text)),
            Content::Deleted => ("deleted", None),
            Content::Removed => ("removed", None),
            Content::Unavailable => ("unavailable", None),
        }
    }

    /// Inverse of [`to_parts`](Content::to_parts). Unknown tags read back
    /// as [`Content::Unavailable`].
    pub fn from_parts(state: &str, text: Option<String>) -> Self {
        match (state, text) {
            ("text", Some(text)) => Content::Text(text),
            ("deleted", _) => Content::Deleted,
            ("removed", _) => Content::Removed,
            _ => Content::Unavailable,
        }
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.render())
    }
}

/// A top-level post in a target community.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootItem {
    pub id: String,
    pub community: String,
    pub title: String,
    pub body: Content,
    pub author: Content,
    pub created_at: DateTime<Utc>,
    /// Search term that surfaced this item during collection.
    pub query: Option<String>,
    /// Reply count as reported by the source, which may exceed what was
    /// actually retrievable.
    pub num_replies: Option<i64>,
    /// Source vote score.
    pub score: Option<i64>,
    pub permalink: Option<String>,
}

/// A reply somewhere below a [`RootItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyItem {
    pub id: String,
    pub root_id: String,
    /// Another reply's id, the root id for top-level replies, or `None`
    /// when the source did not say.
    pub parent_id: Option<String>,
    pub author: Content,
    pub body: Content,
    pub created_at: DateTime<Utc>,
    pub score: Option<i64>,
}

/// One line of a flattened conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactLine {
    pub depth: usize,
    pub author: Content,
    pub text: String,
}

/// The flattened, depth-annotated rendering of one root item and its
/// reply tree. `artifact_id` equals the root item id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: String,
    pub community: String,
    pub title: String,
    pub lines: Vec<ArtifactLine>,
    pub content_hash: String,
}

impl Artifact {
    pub fn new(
        artifact_id: String,
        community: String,
        title: String,
        lines: Vec<ArtifactLine>,
    ) -> Self {
        let mut artifact = Self {
            artifact_id,
            community,
            title,
            lines,
            content_hash: String::new(),
        };
        artifact.content_hash = hash_text(&artifact.render());
        artifact
    }

    /// `(depth, text)` pairs in visitation order.
    pub fn pairs(&self) -> Vec<(usize, &str)> {
        self.lines
            .iter()
            .map(|line| (line.depth, line.text.as_str()))
            .collect()
    }

    /// Full conversation text: a title header followed by one
    /// `author: text` line per node, indented two spaces per depth level.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("Title: ");
        out.push_str(&self.title);
        out.push('\n');
        for line in &self.lines {
            for _ in 0..line.depth {
                out.push_str("  ");
            }
            out.push_str(line.author.render());
            out.push_str(": ");
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }

    /// Number of reply lines (everything below the root).
    pub fn reply_count(&self) -> usize {
        self.lines.iter().filter(|l| l.depth > 0).count()
    }
}

/// Per-attribute scores for one artifact from one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub artifact_id: String,
    pub pass: String,
    /// [`Artifact::content_hash`] of the text that was scored.
    #[serde(default)]
    pub content_hash: String,
    pub scores: BTreeMap<String, f64>,
}

/// Ranking projection of an artifact's scores. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedArtifact {
    pub artifact_id: String,
    pub max_score: f64,
    pub attribute: String,
}

/// Verdict returned by a classification service for one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationVerdict {
    pub flagged: bool,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, alias = "reasoning")]
    pub rationale: String,
    /// Taxonomy or prompt edits suggested by the service. Stored for human
    /// review only.
    #[serde(default, alias = "suggested_prompt_modifications")]
    pub suggestions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub artifact_id: String,
    pub pass: String,
    pub verdict: ClassificationVerdict,
    pub classified_at: DateTime<Utc>,
}

/// Why an item ended up in the failure log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A retryable error persisted past the retry ceiling.
    Transient,
    /// A non-retryable per-item error (oversized, unavailable, rejected).
    Permanent,
    /// Malformed source data: cycles, duplicates, foreign replies.
    Structural,
    /// A collection cap stopped retrieval before the tree was complete.
    Truncated,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::Permanent => "permanent",
            FailureKind::Structural => "structural",
            FailureKind::Truncated => "truncated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transient" => Some(FailureKind::Transient),
            "permanent" => Some(FailureKind::Permanent),
            "structural" => Some(FailureKind::Structural),
            "truncated" => Some(FailureKind::Truncated),
            _ => None,
        }
    }
}

/// An item that could not be processed, with enough context to diagnose it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: String,
    pub item_id: String,
    pub pass: String,
    pub attempts: u32,
    pub kind: FailureKind,
    pub cause: String,
    pub recorded_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(
        item_id: impl Into<String>,
        pass: impl Into<String>,
        attempts: u32,
        kind: FailureKind,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            item_id: item_id.into(),
            pass: pass.into(),
            attempts,
            kind,
            cause: cause.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Resume point of a batch pass.
///
/// `queue` fingerprints the item list the offset refers to. An offset is
/// only reused by a run over the same list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub next_offset: u64,
    pub queue: String,
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
