//! Nested per-timestamp record.
//!
//! A record is a trie keyed by metric path segments. Leaves hold values;
//! inner nodes hold further segments. Merges never change the shape of
//! existing structure: a write that would turn a leaf into a node (or a node
//! into a leaf) is skipped.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::stats::MetricValue;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordNode {
    Leaf(MetricValue),
    Node(BTreeMap<String, RecordNode>),
}

/// Result of merging one `(path, value)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New leaf written.
    Inserted,
    /// Existing leaf overwritten (last write wins).
    Replaced,
    /// Path collides with existing structure; record unchanged.
    Conflict,
    /// No path segments; record unchanged.
    EmptyPath,
}

impl MergeOutcome {
    pub fn is_written(self) -> bool {
        matches!(self, MergeOutcome::Inserted | MergeOutcome::Replaced)
    }
}

/// The `values` object of one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    root: BTreeMap<String, RecordNode>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` at `path`, creating intermediate nodes.
    pub fn merge<S: AsRef<str>>(&mut self, path: &[S], value: MetricValue) -> MergeOutcome {
        if path.is_empty() {
            return MergeOutcome::EmptyPath;
        }
        merge_into(&mut self.root, path, value)
    }

    /// Look up the node at `path`.
    pub fn get<S: AsRef<str>>(&self, path: &[S]) -> Option<&RecordNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.root.get(first.as_ref())?;
        for segment in rest {
            match node {
                RecordNode::Node(children) => node = children.get(segment.as_ref())?,
                RecordNode::Leaf(_) => return None,
            }
        }
        Some(node)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn clear(&mut self) {
        self.root.clear();
    }

    /// Number of leaf values.
    pub fn leaf_count(&self) -> usize {
        fn count(map: &BTreeMap<String, RecordNode>) -> usize {
            map.values()
                .map(|n| match n {
                    RecordNode::Leaf(_) => 1,
                    RecordNode::Node(children) => count(children),
                })
                .sum()
        }
        count(&self.root)
    }

    /// Move the contents out, leaving an empty record.
    pub fn take(&mut self) -> Record {
        std::mem::take(self)
    }
}

fn merge_into<S: AsRef<str>>(
    map: &mut BTreeMap<String, RecordNode>,
    path: &[S],
    value: MetricValue,
) -> MergeOutcome {
    let (segment, rest) = match path.split_first() {
        Some(split) => split,
        None => return MergeOutcome::EmptyPath,
    };
    let segment = segment.as_ref();

    if rest.is_empty() {
        return match map.get_mut(segment) {
            None => {
                map.insert(segment.to_string(), RecordNode::Leaf(value));
                MergeOutcome::Inserted
            }
            Some(RecordNode::Leaf(existing)) => {
                *existing = value;
                MergeOutcome::Replaced
            }
            Some(RecordNode::Node(_)) => MergeOutcome::Conflict,
        };
    }

    match map
        .entry(segment.to_string())
        .or_insert_with(|| RecordNode::Node(BTreeMap::new()))
    {
        RecordNode::Node(children) => merge_into(children, rest, value),
        RecordNode::Leaf(_) => MergeOutcome::Conflict,
    }
}
