//! Rebuilding one representation of the hierarchy from the other
//!
//! `RecoverMode::Parent` trusts parent pointers and renumbers every bound;
//! `RecoverMode::Tree` trusts bounds and rewrites parent pointers.

use super::verify::containment;
use super::{TreeError, TreeWriter};
use crate::db::{Assignment, Field, FindQuery, OrderBy, Predicate};
use crate::models::{NodeId, TreeNode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Which representation `recover` treats as authoritative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoverMode {
    /// Renumber bounds from parent pointers
    #[default]
    Parent,
    /// Rewrite parent pointers from bound nesting
    Tree,
}

/// What `recover` does with nodes whose parent does not exist
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingParentAction {
    /// Fail with `TreeError::MissingParents` before writing anything
    #[default]
    Error,
    /// Delete the orphans together with every node below them
    Delete,
    /// Point orphans at this node, or make them top-level nodes with `None`
    Reassign(Option<NodeId>),
}

/// Counts of rows `recover` touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecoverReport {
    /// Rows whose bounds, parent or level were rewritten
    pub updated: usize,
    /// Orphans reassigned to a new parent
    pub reassigned: usize,
    /// Rows deleted as orphans or below orphans
    pub deleted: usize,
}

impl<'a> TreeWriter<'a> {
    /// Rebuild the scope's tree from one of its two representations
    pub async fn recover(
        &self,
        mode: RecoverMode,
        missing_parent: MissingParentAction,
    ) -> Result<RecoverReport, TreeError> {
        let report = match mode {
            RecoverMode::Parent => self.recover_from_parents(missing_parent).await?,
            RecoverMode::Tree => self.recover_from_bounds().await?,
        };
        tracing::info!(
            ?mode,
            updated = report.updated,
            reassigned = report.reassigned,
            deleted = report.deleted,
            "Recovered tree"
        );
        Ok(report)
    }

    async fn load_scope(&self) -> Result<Vec<TreeNode>, TreeError> {
        let query = FindQuery::new(self.scope_predicate())
            .order_by(OrderBy::asc(Field::Left))
            .order_by(OrderBy::asc(Field::Id));
        Ok(self.store().find_all(&query).await?)
    }

    async fn recover_from_parents(
        &self,
        missing_parent: MissingParentAction,
    ) -> Result<RecoverReport, TreeError> {
        let mut nodes = self.load_scope().await?;
        let mut report = RecoverReport::default();

        let ids: HashSet<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();
        let orphans: Vec<NodeId> = nodes
            .iter()
            .filter(|n| n.parent_id.as_ref().is_some_and(|p| !ids.contains(p)))
            .map(|n| n.id.clone())
            .collect();

        // Plan the policy in memory; nothing is written until numbering succeeds
        let mut doomed: HashSet<NodeId> = HashSet::new();
        let mut reassignment: Option<Option<NodeId>> = None;
        if !orphans.is_empty() {
            match missing_parent {
                MissingParentAction::Error => return Err(TreeError::missing_parents(orphans)),
                MissingParentAction::Delete => {
                    doomed = subtrees_by_parent(&nodes, &orphans);
                    nodes.retain(|n| !doomed.contains(&n.id));
                }
                MissingParentAction::Reassign(target) => {
                    if let Some(target) = &target {
                        if !ids.contains(target) {
                            return Err(TreeError::node_not_found(target.as_str()));
                        }
                        if subtrees_by_parent(&nodes, &orphans).contains(target) {
                            return Err(TreeError::circular_reference(
                                orphans[0].as_str(),
                                target.as_str(),
                            ));
                        }
                    }
                    for node in nodes.iter_mut().filter(|n| orphans.contains(&n.id)) {
                        node.parent_id = target.clone();
                    }
                    reassignment = Some(target);
                }
            }
        }

        let numbering = number_from_parents(&nodes)?;

        if !doomed.is_empty() {
            let values = doomed.iter().cloned().map(Value::String).collect();
            self.store()
                .bulk_delete(&self.scope_predicate().is_in(Field::Id, values))
                .await?;
            report.deleted = doomed.len();
        }
        if let Some(target) = reassignment {
            let values = orphans.iter().cloned().map(Value::String).collect();
            let parent_value = target.map_or(Value::Null, Value::String);
            self.store()
                .bulk_update(
                    &[Assignment::set(Field::Parent, parent_value)],
                    &self.scope_predicate().is_in(Field::Id, values),
                )
                .await?;
            report.reassigned = orphans.len();
        }

        let tracks_level = self.config().tracks_level();
        for (node, (lft, rght, level)) in nodes.iter().zip(numbering) {
            let mut assignments = Vec::new();
            if node.lft != lft {
                assignments.push(Assignment::set(Field::Left, lft));
            }
            if node.rght != rght {
                assignments.push(Assignment::set(Field::Right, rght));
            }
            if tracks_level && node.level != level {
                assignments.push(Assignment::set(Field::Level, level));
            }
            if assignments.is_empty() {
                continue;
            }
            self.store()
                .bulk_update(&assignments, &self.row_predicate(&node.id))
                .await?;
            report.updated += 1;
        }

        Ok(report)
    }

    async fn recover_from_bounds(&self) -> Result<RecoverReport, TreeError> {
        let nodes = self.load_scope().await?;
        let walk = containment(&nodes);
        let tracks_level = self.config().tracks_level();
        let mut report = RecoverReport::default();

        for node in &nodes {
            let Some(parent) = walk.parents.get(&node.id) else {
                continue;
            };
            let mut assignments = Vec::new();
            if &node.parent_id != parent {
                let value = parent.clone().map_or(Value::Null, Value::String);
                assignments.push(Assignment::set(Field::Parent, value));
            }
            if let Some(&depth) = walk.depths.get(&node.id) {
                if tracks_level && node.level != depth {
                    assignments.push(Assignment::set(Field::Level, depth));
                }
            }
            if assignments.is_empty() {
                continue;
            }
            self.store()
                .bulk_update(&assignments, &self.row_predicate(&node.id))
                .await?;
            report.updated += 1;
        }

        Ok(report)
    }

    fn row_predicate(&self, id: &str) -> Predicate {
        self.scope_predicate().eq(Field::Id, id)
    }
}

/// Orphans plus every node reachable from them through parent pointers
fn subtrees_by_parent(nodes: &[TreeNode], orphans: &[NodeId]) -> HashSet<NodeId> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in nodes {
        if let Some(parent) = &node.parent_id {
            children.entry(parent.as_str()).or_default().push(&node.id);
        }
    }

    let mut doomed: HashSet<NodeId> = HashSet::new();
    let mut pending: Vec<&str> = orphans.iter().map(String::as_str).collect();
    while let Some(id) = pending.pop() {
        if !doomed.insert(id.to_string()) {
            continue;
        }
        if let Some(kids) = children.get(id) {
            pending.extend(kids.iter().copied());
        }
    }
    doomed
}

/// Depth-first numbering of a forest given by parent pointers
///
/// Returns `(lft, rght, level)` for each entry of `nodes`, in the same order.
/// Siblings keep the order they have in `nodes`. Nodes not reachable from a
/// top-level node sit on a parent cycle and fail the whole numbering.
fn number_from_parents(nodes: &[TreeNode]) -> Result<Vec<(i64, i64, i64)>, TreeError> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut roots = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        match node.parent_id.as_deref().and_then(|p| index.get(p)) {
            Some(&parent) => children[parent].push(i),
            None => roots.push(i),
        }
    }

    let mut numbering: Vec<Option<(i64, i64, i64)>> = vec![None; nodes.len()];
    let mut counter = 1;
    // (node, next child position, level)
    let mut stack: Vec<(usize, usize, i64)> = Vec::new();

    for root in roots {
        numbering[root] = Some((counter, 0, 0));
        counter += 1;
        stack.push((root, 0, 0));

        while let Some(&(current, position, level)) = stack.last() {
            if let Some(&child) = children[current].get(position) {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                numbering[child] = Some((counter, 0, level + 1));
                counter += 1;
                stack.push((child, 0, level + 1));
            } else {
                if let Some(entry) = numbering[current].as_mut() {
                    entry.1 = counter;
                }
                counter += 1;
                stack.pop();
            }
        }
    }

    let unreachable: Vec<NodeId> = nodes
        .iter()
        .zip(&numbering)
        .filter(|(_, n)| n.is_none())
        .map(|(node, _)| node.id.clone())
        .collect();
    if !unreachable.is_empty() {
        return Err(TreeError::parent_cycle(unreachable));
    }

    Ok(numbering.into_iter().flatten().collect())
}
