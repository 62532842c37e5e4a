//! Conversation-tree composition.
//!
//! Flattens a [`RootItem`] and its flat list of [`ReplyItem`]s into one
//! ordered, depth-annotated [`Artifact`]. Source data cannot be trusted to be
//! a tree, so composition works from explicit index maps and a visited set
//! rather than by following parent pointers:
//!
//! 1. Index replies by id. Duplicates and replies belonging to another root
//!    are skipped with a structural failure.
//! 2. Group replies by parent, ordered by `(created_at, id)`. A reply whose
//!    parent is neither the root nor an indexed reply is an **orphan** and is
//!    attached directly to the root.
//! 3. Walk depth-first, pre-order, from the root at depth 0.
//! 4. Replies the walk never reached sit on (or below) a parent cycle. They
//!    are truncated and one structural failure is recorded per cycle.
//!
//! The same input set always yields a byte-identical artifact, regardless of
//! the order replies were supplied in.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::{Artifact, ArtifactLine, FailureKind, FailureRecord, ReplyItem, RootItem};

/// Pass name used on failure records emitted during composition.
pub const COMPOSE_PASS: &str = "compose";

/// Output of [`compose`]: the artifact plus any structural faults found.
#[derive(Debug, Clone)]
pub struct Composition {
    pub artifact: Artifact,
    pub failures: Vec<FailureRecord>,
}

/// Build the artifact for `root` from `replies`. Never panics on malformed
/// input.
pub fn compose(root: &RootItem, replies: &[ReplyItem]) -> Composition {
    let mut failures = Vec::new();

    // Sorting first makes duplicate resolution independent of input order.
    let mut ordered: Vec<&ReplyItem> = replies.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.created_at.cmp(&b.created_at)));

    let mut index: HashMap<&str, &ReplyItem> = HashMap::with_capacity(ordered.len());
    for reply in ordered {
        if reply.root_id != root.id {
            failures.push(structural(
                &reply.id,
                format!("reply belongs to root {}, not {}", reply.root_id, root.id),
            ));
            continue;
        }
        if reply.id == root.id {
            failures.push(structural(&reply.id, "reply id collides with its root id"));
            continue;
        }
        if index.contains_key(reply.id.as_str()) {
            failures.push(structural(&reply.id, "duplicate reply id"));
            continue;
        }
        index.insert(reply.id.as_str(), reply);
    }

    // `None` keys the root's children.
    let mut children: HashMap<Option<&str>, Vec<&ReplyItem>> = HashMap::new();
    for reply in index.values().copied() {
        children
            .entry(resolve_parent(root, &index, reply))
            .or_default()
            .push(reply);
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
    }

    let mut lines = vec![ArtifactLine {
        depth: 0,
        author: root.author.clone(),
        text: root.body.render().to_string(),
    }];

    let mut visited: HashSet<&str> = HashSet::with_capacity(index.len());
    let mut stack: Vec<(&ReplyItem, usize)> = Vec::new();
    if let Some(top) = children.get(&None) {
        stack.extend(top.iter().rev().map(|r| (*r, 1)));
    }

    while let Some((reply, depth)) = stack.pop() {
        if !visited.insert(reply.id.as_str()) {
            failures.push(structural(&reply.id, "reply reached twice during traversal"));
            continue;
        }
        lines.push(ArtifactLine {
            depth,
            author: reply.author.clone(),
            text: reply.body.render().to_string(),
        });
        if let Some(kids) = children.get(&Some(reply.id.as_str())) {
            stack.extend(kids.iter().rev().map(|r| (*r, depth + 1)));
        }
    }

    if visited.len() < index.len() {
        failures.extend(cycle_failures(root, &index, &visited));
    }

    Composition {
        artifact: Artifact::new(
            root.id.clone(),
            root.community.clone(),
            root.title.clone(),
            lines,
        ),
        failures,
    }
}

/// Which node a reply hangs from: `None` for the root (including orphans),
/// `Some(id)` for an indexed reply.
fn resolve_parent<'a>(
    root: &RootItem,
    index: &HashMap<&'a str, &'a ReplyItem>,
    reply: &'a ReplyItem,
) -> Option<&'a str> {
    match reply.parent_id.as_deref() {
        Some(parent) if parent != root.id && index.contains_key(parent) => Some(parent),
        _ => None,
    }
}

/// One failure per parent cycle among the replies the traversal never
/// reached. Each record names the smallest id on the cycle and how many
/// replies were truncated with it.
fn cycle_failures(
    root: &RootItem,
    index: &HashMap<&str, &ReplyItem>,
    visited: &HashSet<&str>,
) -> Vec<FailureRecord> {
    let mut unreached: Vec<&str> = index
        .keys()
        .copied()
        .filter(|id| !visited.contains(id))
        .collect();
    unreached.sort_unstable();

    let mut cycle_of: HashMap<&str, &str> = HashMap::new();
    let mut groups: BTreeMap<&str, (Vec<&str>, usize)> = BTreeMap::new();

    for start in unreached {
        if cycle_of.contains_key(start) {
            continue;
        }
        let mut path: Vec<&str> = Vec::new();
        let mut on_path: HashSet<&str> = HashSet::new();
        let mut current = start;
        let key = loop {
            if let Some(known) = cycle_of.get(current) {
                break *known;
            }
            if !on_path.insert(current) {
                let first = path.iter().position(|id| *id == current).unwrap_or(0);
                let mut members: Vec<&str> = path[first..].to_vec();
                members.sort_unstable();
                let key = members[0];
                groups.entry(key).or_insert_with(|| (members, 0));
                break key;
            }
            path.push(current);
            match index
                .get(current)
                .copied()
                .and_then(|reply| resolve_parent(root, index, reply))
            {
                Some(parent) => current = parent,
                // Unreachable replies always have an indexed parent; a
                // chain ending at the root would have been visited.
                None => break start,
            }
        };
        for id in path {
            cycle_of.insert(id, key);
        }
    }

    for key in cycle_of.values() {
        groups
            .entry(*key)
            .or_insert_with(|| (vec![*key], 0))
            .1 += 1;
    }

    groups
        .into_iter()
        .map(|(key, (members, truncated))| {
            structural(
                key,
                format!(
                    "parent cycle through [{}]; truncated {} repl{}",
                    members.join(", "),
                    truncated,
                    if truncated == 1 { "y" } else { "ies" }
                ),
            )
        })
        .collect()
}

fn structural(item_id: &str, cause: impl Into<String>) -> FailureRecord {
    FailureRecord::new(item_id, COMPOSE_PASS, 1, FailureKind::Structural, cause)
}
