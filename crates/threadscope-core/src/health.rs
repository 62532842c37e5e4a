//! Community health metrics over collected records.
//!
//! Summarises one community's collected root items and replies: volume,
//! author activity, how quickly root items draw their first reply, vote
//! distribution, and how much content had already been deleted or removed
//! by the time it was collected.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::models::{Content, ReplyItem, RootItem};

/// Replies arriving within this many minutes count as quick responses.
const QUICK_RESPONSE_MINUTES: f64 = 60.0;
/// Authors with at least this many items count as highly active.
const HIGHLY_ACTIVE_ITEMS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActivityDistribution {
    /// Exactly one item.
    pub single: usize,
    /// 2 to 4 items.
    pub low: usize,
    /// 5 to 10 items.
    pub moderate: usize,
    /// More than 10 items.
    pub high: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreDistribution {
    pub negative: usize,
    pub zero: usize,
    /// 1 to 10.
    pub low_positive: usize,
    /// Above 10.
    pub high_positive: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommunityHealth {
    pub community: String,
    pub days_analyzed: Option<i64>,
    pub total_roots: usize,
    pub total_replies: usize,
    pub total_authors: usize,
    pub reply_root_ratio: f64,
    pub avg_replies_per_root: f64,
    /// Fraction of root items with at least one collected reply.
    pub engagement_rate: f64,
    pub avg_root_score: Option<f64>,
    pub root_score_distribution: ScoreDistribution,
    pub avg_response_minutes: Option<f64>,
    pub median_response_minutes: Option<f64>,
    pub quick_responses: usize,
    pub avg_author_activity: f64,
    pub highly_active_authors: usize,
    pub author_activity: ActivityDistribution,
    /// Fraction of bodies that were deleted, removed, or unavailable.
    pub unavailable_ratio: f64,
}

/// Compute metrics for `community` from its records. When `days_back` is
/// set, only records created within that window before `now` count.
pub fn community_health(
    community: &str,
    roots: &[RootItem],
    replies: &[ReplyItem],
    now: DateTime<Utc>,
    days_back: Option<i64>,
) -> CommunityHealth {
    let cutoff = days_back.map(|days| now - Duration::days(days));
    let in_window = |t: &DateTime<Utc>| cutoff.map_or(true, |c| *t >= c);

    let roots: Vec<&RootItem> = roots
        .iter()
        .filter(|r| r.community == community && in_window(&r.created_at))
        .collect();
    let root_ids: HashSet<&str> = roots.iter().map(|r| r.id.as_str()).collect();
    let replies: Vec<&ReplyItem> = replies
        .iter()
        .filter(|r| root_ids.contains(r.root_id.as_str()) && in_window(&r.created_at))
        .collect();

    let mut activity: HashMap<&str, usize> = HashMap::new();
    let authors = roots
        .iter()
        .map(|r| &r.author)
        .chain(replies.iter().map(|r| &r.author));
    for author in authors {
        if let Content::Text(name) = author {
            *activity.entry(name.as_str()).or_default() += 1;
        }
    }

    let mut first_reply: HashMap<&str, DateTime<Utc>> = HashMap::new();
    let mut replies_per_root: HashMap<&str, usize> = HashMap::new();
    for reply in &replies {
        *replies_per_root.entry(reply.root_id.as_str()).or_default() += 1;
        first_reply
            .entry(reply.root_id.as_str())
            .and_modify(|t| {
                if reply.created_at < *t {
                    *t = reply.created_at;
                }
            })
            .or_insert(reply.created_at);
    }

    let mut response_minutes: Vec<f64> = roots
        .iter()
        .filter_map(|root| {
            first_reply
                .get(root.id.as_str())
                .map(|t| (*t - root.created_at).num_seconds() as f64 / 60.0)
        })
        .collect();
    response_minutes.sort_by(|a, b| a.total_cmp(b));

    let scores: Vec<i64> = roots.iter().filter_map(|r| r.score).collect();
    let mut score_distribution = ScoreDistribution::default();
    for score in &scores {
        match *score {
            s if s < 0 => score_distribution.negative += 1,
            0 => score_distribution.zero += 1,
            1..=10 => score_distribution.low_positive += 1,
            _ => score_distribution.high_positive += 1,
        }
    }

    let mut author_activity = ActivityDistribution::default();
    for count in activity.values() {
        match *count {
            1 => author_activity.single += 1,
            2..=4 => author_activity.low += 1,
            5..=10 => author_activity.moderate += 1,
            _ => author_activity.high += 1,
        }
    }

    let total_items = roots.len() + replies.len();
    let unavailable = roots
        .iter()
        .map(|r| &r.body)
        .chain(replies.iter().map(|r| &r.body))
        .filter(|b| b.is_sentinel())
        .count();

    CommunityHealth {
        community: community.to_string(),
        days_analyzed: days_back,
        total_roots: roots.len(),
        total_replies: replies.len(),
        total_authors: activity.len(),
        reply_root_ratio: ratio(replies.len(), roots.len()),
        avg_replies_per_root: ratio(replies.len(), roots.len()),
        engagement_rate: ratio(replies_per_root.len(), roots.len()),
        avg_root_score: mean(scores.iter().map(|s| *s as f64)),
        root_score_distribution: score_distribution,
        avg_response_minutes: mean(response_minutes.iter().copied()),
        median_response_minutes: response_minutes.get(response_minutes.len() / 2).copied(),
        quick_responses: response_minutes
            .iter()
            .filter(|m| **m < QUICK_RESPONSE_MINUTES)
            .count(),
        avg_author_activity: ratio(activity.values().sum(), activity.len()),
        highly_active_authors: activity
            .values()
            .filter(|c| **c >= HIGHLY_ACTIVE_ITEMS)
            .count(),
        author_activity,
        unavailable_ratio: ratio(unavailable, total_items),
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    numerator as f64 / denominator.max(1) as f64
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}
