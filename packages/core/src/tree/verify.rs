//! Tree consistency checks

use super::{NestedSet, TreeError};
use crate::db::{Aggregate, Field, FindQuery, OrderBy};
use crate::models::{NodeId, TreeNode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// What a [`TreeIssue`] locator refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A bound value in `1..=edge`
    Index,
    /// A node id
    Node,
}

/// One inconsistency found by [`NestedSet::verify`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeIssue {
    pub kind: IssueKind,
    pub locator: String,
    pub message: String,
}

impl TreeIssue {
    fn index(value: i64, message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Index,
            locator: value.to_string(),
            message: message.into(),
        }
    }

    fn node(id: &str, message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Node,
            locator: id.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for TreeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            IssueKind::Index => "index",
            IssueKind::Node => "node",
        };
        write!(f, "{} {}: {}", kind, self.locator, self.message)
    }
}

/// Parent relationships implied by bound nesting
#[derive(Debug, Default)]
pub(crate) struct Containment {
    /// Nearest strictly-containing node per node, `None` at the top level
    pub parents: HashMap<NodeId, Option<NodeId>>,
    /// Number of strictly-containing nodes per node
    pub depths: HashMap<NodeId, i64>,
    /// Pairs `(node, other)` whose intervals partially overlap
    pub overlaps: Vec<(NodeId, NodeId)>,
}

/// Walk nodes in left-bound order with a stack of open intervals
///
/// `nodes` must be sorted by `lft`. Rows with `lft >= rght` are skipped.
pub(crate) fn containment(nodes: &[TreeNode]) -> Containment {
    let mut result = Containment::default();
    let mut open: Vec<&TreeNode> = Vec::new();

    for node in nodes.iter().filter(|n| n.lft < n.rght) {
        while open.last().is_some_and(|top| top.rght < node.lft) {
            open.pop();
        }

        if let Some(top) = open.last() {
            if top.lft < node.lft && top.rght < node.rght {
                result.overlaps.push((node.id.clone(), top.id.clone()));
            }
        }

        let bounds = node.bounds();
        let parent = open
            .iter()
            .rposition(|candidate| candidate.bounds().contains(&bounds));
        let (parent_id, depth) = match parent {
            Some(index) => (Some(open[index].id.clone()), index as i64 + 1),
            None => (None, 0),
        };
        result.parents.insert(node.id.clone(), parent_id);
        result.depths.insert(node.id.clone(), depth);

        open.push(node);
    }

    result
}

impl NestedSet {
    /// Check the scope for bound and parent inconsistencies
    ///
    /// Returns an empty list for a consistent tree. Never writes.
    pub async fn verify(&self) -> Result<Vec<TreeIssue>, TreeError> {
        let scope = self.scope_predicate();
        let Some(edge) = self
            .store
            .aggregate(Aggregate::Max, Field::Right, &scope)
            .await?
        else {
            return Ok(Vec::new());
        };

        let query = FindQuery::new(scope)
            .order_by(OrderBy::asc(Field::Left))
            .order_by(OrderBy::asc(Field::Id));
        let nodes = self.store.find_all(&query).await?;
        let mut issues = Vec::new();

        let mut occurrences: HashMap<i64, usize> = HashMap::new();
        for node in &nodes {
            *occurrences.entry(node.lft).or_default() += 1;
            *occurrences.entry(node.rght).or_default() += 1;
        }
        // A valid scope of N nodes uses exactly 1..=2N; anything past that is
        // reported once instead of scanning up to a corrupted edge
        let limit = edge.min(2 * nodes.len() as i64);
        if edge > limit {
            issues.push(TreeIssue::index(
                edge,
                format!("exceeds {} bounds of {} nodes", limit, nodes.len()),
            ));
        }
        for value in 1..=limit {
            match occurrences.get(&value).copied().unwrap_or(0) {
                0 => issues.push(TreeIssue::index(value, "missing")),
                1 => {}
                _ => issues.push(TreeIssue::index(value, "duplicate")),
            }
        }

        for node in &nodes {
            if node.lft < 1 || node.rght < 1 {
                issues.push(TreeIssue::node(&node.id, "has invalid left or right values"));
            } else if node.lft == node.rght {
                issues.push(TreeIssue::node(&node.id, "left and right values identical"));
            } else if node.lft > node.rght {
                issues.push(TreeIssue::node(&node.id, "left greater than right"));
            }
        }

        let walk = containment(&nodes);
        for (id, other) in &walk.overlaps {
            issues.push(TreeIssue::node(id, format!("bounds overlap node '{}'", other)));
        }

        let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        for node in &nodes {
            let Some(derived) = walk.parents.get(&node.id) else {
                continue;
            };
            match (&node.parent_id, derived) {
                (Some(parent), _) if !ids.contains(parent.as_str()) => {
                    issues.push(TreeIssue::node(
                        &node.id,
                        format!("parent node '{}' does not exist", parent),
                    ));
                }
                (Some(parent), Some(derived)) if parent != derived => {
                    issues.push(TreeIssue::node(
                        &node.id,
                        format!(
                            "parent is '{}' but bounds place it under '{}'",
                            parent, derived
                        ),
                    ));
                }
                (Some(parent), None) => {
                    issues.push(TreeIssue::node(
                        &node.id,
                        format!("parent is '{}' but bounds place it at the top level", parent),
                    ));
                }
                (None, Some(derived)) => {
                    issues.push(TreeIssue::node(
                        &node.id,
                        format!("parent is blank but bounds place it under '{}'", derived),
                    ));
                }
                _ => {}
            }
        }

        if !issues.is_empty() {
            tracing::warn!(issues = issues.len(), "Tree verification found inconsistencies");
        }
        Ok(issues)
    }
}
