//! Score aggregation and ranking.
//!
//! Merges [`ScoreRecord`]s (possibly several per artifact, from different
//! passes or attribute subsets) into one ranking key per artifact: the
//! maximum score over all attributes, or over a chosen subset.
//!
//! Ordering is total and independent of input order: score descending,
//! then `artifact_id` ascending. Artifacts without a usable score are left
//! out rather than ranked as zero.

use std::collections::{BTreeMap, HashSet};

use crate::models::{RankedArtifact, ScoreRecord};

/// Rank artifacts by their maximum score.
///
/// When `attribute_filter` is given, only those attributes (compared
/// case-insensitively) contribute; all others are ignored even if larger.
/// Non-finite values are ignored. When two attributes of the same artifact
/// tie for the maximum, the lexicographically smaller name is reported.
pub fn rank(records: &[ScoreRecord], attribute_filter: Option<&[String]>) -> Vec<RankedArtifact> {
    let filter: Option<HashSet<String>> =
        attribute_filter.map(|attrs| attrs.iter().map(|a| a.to_lowercase()).collect());

    let merged = merge(records);
    let mut ranked: Vec<RankedArtifact> = merged
        .into_iter()
        .filter_map(|(artifact_id, scores)| {
            let mut best: Option<(&str, f64)> = None;
            // BTreeMap iteration is name-ordered, so strict `>` keeps the
            // smallest name on ties.
            for (attribute, value) in &scores {
                if let Some(filter) = &filter {
                    if !filter.contains(&attribute.to_lowercase()) {
                        continue;
                    }
                }
                match best {
                    Some((_, current)) if *value <= current => {}
                    _ => best = Some((attribute.as_str(), *value)),
                }
            }
            best.map(|(attribute, max_score)| RankedArtifact {
                artifact_id,
                max_score,
                attribute: attribute.to_string(),
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.max_score
            .total_cmp(&a.max_score)
            .then_with(|| a.artifact_id.cmp(&b.artifact_id))
    });
    ranked
}

/// Keep ranked artifacts scoring at least `min_score`, up to `limit`.
pub fn top(ranked: Vec<RankedArtifact>, min_score: f64, limit: Option<usize>) -> Vec<RankedArtifact> {
    ranked
        .into_iter()
        .filter(|r| r.max_score >= min_score)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Per artifact, the maximum finite value recorded for each attribute.
fn merge(records: &[ScoreRecord]) -> BTreeMap<String, BTreeMap<String, f64>> {
    let mut merged: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    for record in records {
        for (attribute, value) in &record.scores {
            if !value.is_finite() {
                continue;
            }
            let slot = merged
                .entry(record.artifact_id.clone())
                .or_default()
                .entry(attribute.clone())
                .or_insert(*value);
            if *value > *slot {
                *slot = *value;
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, pass: &str, scores: &[(&str, f64)]) -> ScoreRecord {
        ScoreRecord {
            artifact_id: id.to_string(),
            pass: pass.to_string(),
            content_hash: String::new(),
            scores: scores
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }

    #[test]
    fn ties_break_by_artifact_id() {
        let forward = vec![
            record("X", "score", &[("toxicity", 0.9)]),
            record("Y", "score", &[("toxicity", 0.9)]),
        ];
        let mut backward = forward.clone();
        backward.reverse();
        for records in [forward, backward] {
            let ids: Vec<String> = rank(&records, None)
                .into_iter()
                .map(|r| r.artifact_id)
                .collect();
            assert_eq!(ids, vec!["X", "Y"]);
        }
    }

    #[test]
    fn sorted_by_score_descending() {
        let records = vec![
            record("a", "score", &[("toxicity", 0.2), ("insult", 0.4)]),
            record("b", "score", &[("toxicity", 0.95)]),
            record("c", "score", &[("threat", 0.6)]),
        ];
        let ranked = rank(&records, None);
        let got: Vec<(&str, f64, &str)> = ranked
            .iter()
            .map(|r| (r.artifact_id.as_str(), r.max_score, r.attribute.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("b", 0.95, "toxicity"),
                ("c", 0.6, "threat"),
                ("a", 0.4, "insult"),
            ]
        );
    }

    #[test]
    fn filter_ignores_larger_other_attributes() {
        let records = vec![
            record("a", "score", &[("severity", 0.3), ("toxicity", 0.99)]),
            record("b", "score", &[("severity", 0.5), ("toxicity", 0.1)]),
            record("c", "score", &[("toxicity", 0.8)]),
        ];
        let filter = vec!["SEVERITY".to_string()];
        let ranked = rank(&records, Some(filter.as_slice()));
        assert_eq!(ranked.len(), 2, "c has no severity score and is excluded");
        assert_eq!(ranked[0].artifact_id, "b");
        assert_eq!(ranked[0].attribute, "severity");
        assert_eq!(ranked[1].artifact_id, "a");
        assert!((ranked[1].max_score - 0.3).abs() < 1e-12);
    }

    #[test]
    fn unscored_artifacts_are_absent_not_zero() {
        let records = vec![
            record("empty", "score", &[]),
            record("nan", "score", &[("toxicity", f64::NAN)]),
            record("zero", "score", &[("toxicity", 0.0)]),
        ];
        let ranked = rank(&records, None);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].artifact_id, "zero");
    }

    #[test]
    fn passes_merge_by_maximum() {
        let records = vec![
            record("a", "first", &[("toxicity", 0.4)]),
            record("a", "second", &[("toxicity", 0.7), ("insult", 0.1)]),
        ];
        let ranked = rank(&records, None);
        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].max_score - 0.7).abs() < 1e-12);
    }

    #[test]
    fn attribute_tie_picks_smallest_name() {
        let records = vec![record("a", "score", &[("toxicity", 0.5), ("insult", 0.5)])];
        assert_eq!(rank(&records, None)[0].attribute, "insult");
    }

    #[test]
    fn top_applies_threshold_and_limit() {
        let records = vec![
            record("a", "s", &[("t", 0.9)]),
            record("b", "s", &[("t", 0.8)]),
            record("c", "s", &[("t", 0.1)]),
        ];
        let picked = top(rank(&records, None), 0.5, Some(1));
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].artifact_id, "a");
        assert_eq!(top(rank(&records, None), 0.5, None).len(), 2);
    }
}
