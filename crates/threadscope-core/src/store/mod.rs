//! Storage abstraction for threadscope.
//!
//! The [`Store`] trait is the persistence collaborator for every stage of
//! the pipeline: collectors write threads, the composer writes artifacts,
//! the batch passes write scores, classifications, failures, and
//! checkpoints.
//!
//! Writes are idempotent. Re-emitting the same record (for example after a
//! resumed run reprocesses part of a batch) never produces a duplicate:
//! threads and artifacts are upserted, score attributes and classifications
//! keep their first value, and checkpoints only move forward within one
//! queue. Scores for an artifact whose content changed replace the old ones.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{
    Artifact, Checkpoint, ClassificationResult, FailureRecord, ReplyItem, RootItem, ScoreRecord,
};

/// Row counts per table, for the `stats` overview.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreCounts {
    pub roots: i64,
    pub replies: i64,
    pub artifacts: i64,
    pub scored: i64,
    pub classified: i64,
    pub flagged: i64,
    pub failures: i64,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_thread`](Store::upsert_thread) | Persist a root item and its replies |
/// | [`load_thread`](Store::load_thread) | Root item plus every stored reply |
/// | [`upsert_artifact`](Store::upsert_artifact) | Persist a composed artifact |
/// | [`put_scores`](Store::put_scores) | Record per-attribute scores for a pass |
/// | [`put_classification`](Store::put_classification) | Record a classification once |
/// | [`record_failure`](Store::record_failure) | Append to the failure log |
/// | [`set_checkpoint`](Store::set_checkpoint) | Advance a pass's resume point |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or update a root item and insert or update its replies.
    async fn upsert_thread(&self, root: &RootItem, replies: &[ReplyItem]) -> Result<()>;

    /// Ids of stored root items, ascending, optionally for one community.
    async fn list_root_ids(&self, community: Option<&str>) -> Result<Vec<String>>;

    /// A root item and all replies stored under it.
    async fn load_thread(&self, root_id: &str) -> Result<Option<(RootItem, Vec<ReplyItem>)>>;

    /// Stored root items, optionally for one community, ordered by id.
    async fn list_roots(&self, community: Option<&str>) -> Result<Vec<RootItem>>;

    /// Replies under root items of one community, or all when `None`.
    async fn list_replies(&self, community: Option<&str>) -> Result<Vec<ReplyItem>>;

    /// Insert or replace the artifact for `artifact.artifact_id`.
    async fn upsert_artifact(&self, artifact: &Artifact) -> Result<()>;

    async fn get_artifact(&self, artifact_id: &str) -> Result<Option<Artifact>>;

    /// All artifacts ordered by `artifact_id`.
    async fn list_artifacts(&self) -> Result<Vec<Artifact>>;

    /// Store the scores in `record`.
    ///
    /// When the stored scores for `(artifact, pass)` were taken from a
    /// different `content_hash`, they are all replaced. Otherwise each
    /// attribute keeps its first value.
    async fn put_scores(&self, record: &ScoreRecord) -> Result<()>;

    /// Scores stored for one artifact under `pass`.
    async fn get_scores(&self, artifact_id: &str, pass: &str) -> Result<Option<ScoreRecord>>;

    /// Score records, optionally for one pass, grouped per artifact and pass.
    async fn list_scores(&self, pass: Option<&str>) -> Result<Vec<ScoreRecord>>;

    /// Insert a classification unless one exists for `(artifact, pass)`.
    /// Returns whether it was inserted.
    async fn put_classification(&self, result: &ClassificationResult) -> Result<bool>;

    async fn get_classification(
        &self,
        artifact_id: &str,
        pass: &str,
    ) -> Result<Option<ClassificationResult>>;

    async fn list_classifications(&self, pass: Option<&str>) -> Result<Vec<ClassificationResult>>;

    async fn record_failure(&self, failure: &FailureRecord) -> Result<()>;

    /// Failures in the order they were recorded, optionally for one pass.
    async fn list_failures(&self, pass: Option<&str>) -> Result<Vec<FailureRecord>>;

    /// Resume point for `pass`, if any was stored.
    async fn get_checkpoint(&self, pass: &str) -> Result<Option<Checkpoint>>;

    /// Advance the checkpoint for `pass`. For the same `queue`, a smaller
    /// offset than the stored one is ignored; a different `queue` replaces
    /// the stored checkpoint.
    async fn set_checkpoint(&self, pass: &str, checkpoint: &Checkpoint) -> Result<()>;

    /// Forget the checkpoint for `pass` so the next run starts from zero.
    async fn reset_checkpoint(&self, pass: &str) -> Result<()>;

    async fn counts(&self) -> Result<StoreCounts>;
}
