//! In-memory [`Store`] implementation for tests.
//!
//! Uses `BTreeMap`s behind `std::sync::RwLock`, so every listing comes back
//! in key order without an extra sort.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Artifact, Checkpoint, ClassificationResult, FailureRecord, ReplyItem, RootItem, ScoreRecord,
};

use super::{Store, StoreCounts};

/// In-memory store for tests.
pub struct InMemoryStore {
    roots: RwLock<BTreeMap<String, RootItem>>,
    /// Keyed by `(root_id, reply_id)`.
    replies: RwLock<BTreeMap<(String, String), ReplyItem>>,
    artifacts: RwLock<BTreeMap<String, Artifact>>,
    /// Keyed by `(artifact_id, pass)`.
    scores: RwLock<BTreeMap<(String, String), ScoreRecord>>,
    classifications: RwLock<BTreeMap<(String, String), ClassificationResult>>,
    failures: RwLock<Vec<FailureRecord>>,
    checkpoints: RwLock<BTreeMap<String, Checkpoint>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            roots: RwLock::new(BTreeMap::new()),
            replies: RwLock::new(BTreeMap::new()),
            artifacts: RwLock::new(BTreeMap::new()),
            scores: RwLock::new(BTreeMap::new()),
            classifications: RwLock::new(BTreeMap::new()),
            failures: RwLock::new(Vec::new()),
            checkpoints: RwLock::new(BTreeMap::new()),
        }
    }

    fn root_ids_in(&self, community: Option<&str>) -> BTreeSet<String> {
        self.roots
            .read()
            .unwrap()
            .values()
            .filter(|r| community.map_or(true, |c| r.community == c))
            .map(|r| r.id.clone())
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_thread(&self, root: &RootItem, replies: &[ReplyItem]) -> Result<()> {
        self.roots
            .write()
            .unwrap()
            .insert(root.id.clone(), root.clone());
        let mut stored = self.replies.write().unwrap();
        for reply in replies {
            stored.insert((reply.root_id.clone(), reply.id.clone()), reply.clone());
        }
        Ok(())
    }

    async fn list_root_ids(&self, community: Option<&str>) -> Result<Vec<String>> {
        Ok(self.root_ids_in(community).into_iter().collect())
    }

    async fn load_thread(&self, root_id: &str) -> Result<Option<(RootItem, Vec<ReplyItem>)>> {
        let root = match self.roots.read().unwrap().get(root_id) {
            Some(root) => root.clone(),
            None => return Ok(None),
        };
        let replies = self
            .replies
            .read()
            .unwrap()
            .iter()
            .filter(|((owner, _), _)| owner == root_id)
            .map(|(_, reply)| reply.clone())
            .collect();
        Ok(Some((root, replies)))
    }

    async fn list_roots(&self, community: Option<&str>) -> Result<Vec<RootItem>> {
        Ok(self
            .roots
            .read()
            .unwrap()
            .values()
            .filter(|r| community.map_or(true, |c| r.community == c))
            .cloned()
            .collect())
    }

    async fn list_replies(&self, community: Option<&str>) -> Result<Vec<ReplyItem>> {
        let root_ids = self.root_ids_in(community);
        Ok(self
            .replies
            .read()
            .unwrap()
            .iter()
            .filter(|((owner, _), _)| root_ids.contains(owner))
            .map(|(_, reply)| reply.clone())
            .collect())
    }

    async fn upsert_artifact(&self, artifact: &Artifact) -> Result<()> {
        self.artifacts
            .write()
            .unwrap()
            .insert(artifact.artifact_id.clone(), artifact.clone());
        Ok(())
    }

    async fn get_artifact(&self, artifact_id: &str) -> Result<Option<Artifact>> {
        Ok(self.artifacts.read().unwrap().get(artifact_id).cloned())
    }

    async fn list_artifacts(&self) -> Result<Vec<Artifact>> {
        Ok(self.artifacts.read().unwrap().values().cloned().collect())
    }

    async fn put_scores(&self, record: &ScoreRecord) -> Result<()> {
        let mut scores = self.scores.write().unwrap();
        let slot = scores
            .entry((record.artifact_id.clone(), record.pass.clone()))
            .or_insert_with(|| ScoreRecord {
                scores: BTreeMap::new(),
                ..record.clone()
            });
        if slot.content_hash != record.content_hash {
            slot.content_hash = record.content_hash.clone();
            slot.scores.clear();
        }
        for (attribute, value) in &record.scores {
            slot.scores.entry(attribute.clone()).or_insert(*value);
        }
        Ok(())
    }

    async fn get_scores(&self, artifact_id: &str, pass: &str) -> Result<Option<ScoreRecord>> {
        Ok(self
            .scores
            .read()
            .unwrap()
            .get(&(artifact_id.to_string(), pass.to_string()))
            .cloned())
    }

    async fn list_scores(&self, pass: Option<&str>) -> Result<Vec<ScoreRecord>> {
        Ok(self
            .scores
            .read()
            .unwrap()
            .values()
            .filter(|r| pass.map_or(true, |want| r.pass == want))
            .cloned()
            .collect())
    }

    async fn put_classification(&self, result: &ClassificationResult) -> Result<bool> {
        let mut stored = self.classifications.write().unwrap();
        let key = (result.artifact_id.clone(), result.pass.clone());
        if stored.contains_key(&key) {
            return Ok(false);
        }
        stored.insert(key, result.clone());
        Ok(true)
    }

    async fn get_classification(
        &self,
        artifact_id: &str,
        pass: &str,
    ) -> Result<Option<ClassificationResult>> {
        Ok(self
            .classifications
            .read()
            .unwrap()
            .get(&(artifact_id.to_string(), pass.to_string()))
            .cloned())
    }

    async fn list_classifications(&self, pass: Option<&str>) -> Result<Vec<ClassificationResult>> {
        Ok(self
            .classifications
            .read()
            .unwrap()
            .values()
            .filter(|c| pass.map_or(true, |want| c.pass == want))
            .cloned()
            .collect())
    }

    async fn record_failure(&self, failure: &FailureRecord) -> Result<()> {
        self.failures.write().unwrap().push(failure.clone());
        Ok(())
    }

    async fn list_failures(&self, pass: Option<&str>) -> Result<Vec<FailureRecord>> {
        Ok(self
            .failures
            .read()
            .unwrap()
            .iter()
            .filter(|f| pass.map_or(true, |want| f.pass == want))
            .cloned()
            .collect())
    }

    async fn get_checkpoint(&self, pass: &str) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoints.read().unwrap().get(pass).cloned())
    }

    async fn set_checkpoint(&self, pass: &str, checkpoint: &Checkpoint) -> Result<()> {
        let mut checkpoints = self.checkpoints.write().unwrap();
        let slot = checkpoints
            .entry(pass.to_string())
            .or_insert_with(|| checkpoint.clone());
        if slot.queue == checkpoint.queue {
            slot.next_offset = slot.next_offset.max(checkpoint.next_offset);
        } else {
            *slot = checkpoint.clone();
        }
        Ok(())
    }

    async fn reset_checkpoint(&self, pass: &str) -> Result<()> {
        self.checkpoints.write().unwrap().remove(pass);
        Ok(())
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let scored: BTreeSet<String> = self
            .scores
            .read()
            .unwrap()
            .keys()
            .map(|(artifact_id, _)| artifact_id.clone())
            .collect();
        let classifications = self.classifications.read().unwrap();
        Ok(StoreCounts {
            roots: self.roots.read().unwrap().len() as i64,
            replies: self.replies.read().unwrap().len() as i64,
            artifacts: self.artifacts.read().unwrap().len() as i64,
            scored: scored.len() as i64,
            classified: classifications.len() as i64,
            flagged: classifications.values().filter(|c| c.verdict.flagged).count() as i64,
            failures: self.failures.read().unwrap().len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassificationVerdict, Content, FailureKind};
    use chrono::Utc;

    fn root(id: &str, community: &str) -> RootItem {
        RootItem {
            id: id.into(),
            community: community.into(),
            title: "t".into(),
            body: Content::text("b"),
            author: Content::text("a"),
            created_at: Utc::now(),
            query: None,
            num_replies: None,
            score: None,
            permalink: None,
        }
    }

    fn reply(id: &str, root_id: &str) -> ReplyItem {
        ReplyItem {
            id: id.into(),
            root_id: root_id.into(),
            parent_id: Some(root_id.into()),
            author: Content::text("x"),
            body: Content::text("y"),
            created_at: Utc::now(),
            score: None,
        }
    }

    #[tokio::test]
    async fn thread_upsert_is_idempotent() {
        let store = InMemoryStore::new();
        let r = root("r1", "rust");
        let replies = vec![reply("c1", "r1"), reply("c2", "r1")];
        store.upsert_thread(&r, &replies).await.unwrap();
        store.upsert_thread(&r, &replies).await.unwrap();
        store.upsert_thread(&root("r2", "go"), &[reply("c3", "r2")]).await.unwrap();

        let (_, loaded) = store.load_thread("r1").await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(store.list_root_ids(Some("rust")).await.unwrap(), vec!["r1"]);
        assert_eq!(store.list_replies(Some("go")).await.unwrap().len(), 1);
        assert!(store.load_thread("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scores_keep_first_value_per_attribute() {
        let store = InMemoryStore::new();
        let first = ScoreRecord {
            artifact_id: "a".into(),
            pass: "score".into(),
            content_hash: "h1".into(),
            scores: [("toxicity".to_string(), 0.4)].into_iter().collect(),
        };
        let second = ScoreRecord {
            artifact_id: "a".into(),
            pass: "score".into(),
            content_hash: "h1".into(),
            scores: [("toxicity".to_string(), 0.9), ("insult".to_string(), 0.1)]
                .into_iter()
                .collect(),
        };
        store.put_scores(&first).await.unwrap();
        store.put_scores(&second).await.unwrap();
        let scores = store.list_scores(Some("score")).await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].scores["toxicity"], 0.4);
        assert_eq!(scores[0].scores["insult"], 0.1);
    }

    #[tokio::test]
    async fn changed_content_replaces_scores() {
        let store = InMemoryStore::new();
        let old = ScoreRecord {
            artifact_id: "a".into(),
            pass: "score".into(),
            content_hash: "h1".into(),
            scores: [("toxicity".to_string(), 0.4), ("insult".to_string(), 0.3)]
                .into_iter()
                .collect(),
        };
        store.put_scores(&old).await.unwrap();
        store
            .put_scores(&ScoreRecord {
                content_hash: "h2".into(),
                scores: [("toxicity".to_string(), 0.9)].into_iter().collect(),
                ..old.clone()
            })
            .await
            .unwrap();

        let stored = store.get_scores("a", "score").await.unwrap().unwrap();
        assert_eq!(stored.content_hash, "h2");
        assert_eq!(stored.scores.len(), 1);
        assert_eq!(stored.scores["toxicity"], 0.9);
        assert!(store.get_scores("a", "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn classifications_are_insert_once() {
        let store = InMemoryStore::new();
        let mut result = ClassificationResult {
            artifact_id: "a".into(),
            pass: "classify".into(),
            verdict: ClassificationVerdict {
                flagged: true,
                category: None,
                confidence: 0.8,
                rationale: String::new(),
                suggestions: None,
            },
            classified_at: Utc::now(),
        };
        assert!(store.put_classification(&result).await.unwrap());
        result.verdict.flagged = false;
        assert!(!store.put_classification(&result).await.unwrap());
        let stored = store.list_classifications(None).await.unwrap();
        assert!(stored[0].verdict.flagged);
        let fetched = store.get_classification("a", "classify").await.unwrap();
        assert!(fetched.is_some_and(|c| c.verdict.flagged));
        assert!(store.get_classification("b", "classify").await.unwrap().is_none());
        assert_eq!(store.counts().await.unwrap().flagged, 1);
    }

    fn checkpoint(next_offset: u64, queue: &str) -> Checkpoint {
        Checkpoint {
            next_offset,
            queue: queue.into(),
        }
    }

    #[tokio::test]
    async fn checkpoints_are_monotonic_per_queue() {
        let store = InMemoryStore::new();
        assert_eq!(store.get_checkpoint("score").await.unwrap(), None);
        store.set_checkpoint("score", &checkpoint(100, "q1")).await.unwrap();
        store.set_checkpoint("score", &checkpoint(50, "q1")).await.unwrap();
        assert_eq!(store.get_checkpoint("score").await.unwrap(), Some(checkpoint(100, "q1")));
        store.set_checkpoint("score", &checkpoint(10, "q2")).await.unwrap();
        assert_eq!(store.get_checkpoint("score").await.unwrap(), Some(checkpoint(10, "q2")));
        store.reset_checkpoint("score").await.unwrap();
        assert_eq!(store.get_checkpoint("score").await.unwrap(), None);
    }

    #[tokio::test]
    async fn failures_filter_by_pass() {
        let store = InMemoryStore::new();
        store
            .record_failure(&FailureRecord::new("a", "score", 4, FailureKind::Transient, "503"))
            .await
            .unwrap();
        store
            .record_failure(&FailureRecord::new("b", "compose", 1, FailureKind::Structural, "cycle"))
            .await
            .unwrap();
        assert_eq!(store.list_failures(Some("score")).await.unwrap().len(), 1);
        assert_eq!(store.list_failures(None).await.unwrap().len(), 2);
    }
}
