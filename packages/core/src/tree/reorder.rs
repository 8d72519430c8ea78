//! Sorting siblings by a field

use super::reads::ChildrenOptions;
use super::writer::MoveCount;
use super::{TreeError, TreeWriter};
use crate::db::{Field, OrderBy, SortDirection};
use crate::models::NodeId;
use serde::{Deserialize, Serialize};

/// Options for [`TreeWriter::reorder`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReorderOptions {
    /// Subtree to reorder, `None` for the whole scope
    pub id: Option<NodeId>,
    /// Sort key, defaults to the configured display field
    pub field: Option<Field>,
    pub direction: SortDirection,
    /// Run `verify` first and skip reordering an inconsistent tree
    pub verify: bool,
}

impl Default for ReorderOptions {
    fn default() -> Self {
        Self {
            id: None,
            field: None,
            direction: SortDirection::Asc,
            verify: true,
        }
    }
}

impl<'a> TreeWriter<'a> {
    /// Sort the children of every node below `options.id` by a field
    ///
    /// Each sibling group is sorted by moving its members, in sorted order,
    /// to the end of the group. Returns `false` without writing when
    /// verification is requested and the tree is inconsistent.
    pub async fn reorder(&self, options: ReorderOptions) -> Result<bool, TreeError> {
        if options.verify {
            let issues = self.verify().await?;
            if !issues.is_empty() {
                tracing::warn!(issues = issues.len(), "Skipping reorder of inconsistent tree");
                return Ok(false);
            }
        }

        let field = options
            .field
            .clone()
            .unwrap_or_else(|| Field::property(self.config().display_field.clone()));
        let children_options = ChildrenOptions::direct()
            .order_by(OrderBy {
                field,
                direction: options.direction,
            })
            .order_by(OrderBy::asc(Field::Left));

        let mut moves = 0usize;
        let mut pending: Vec<Option<NodeId>> = vec![options.id.clone()];
        while let Some(parent) = pending.pop() {
            let children = self.children(parent.as_deref(), &children_options).await?;
            for child in children {
                if self.move_down(&child.id, MoveCount::ToEdge).await? {
                    moves += 1;
                }
                if !child.is_leaf() {
                    pending.push(Some(child.id));
                }
            }
        }

        tracing::info!(root = ?options.id, moves, "Reordered tree");
        Ok(true)
    }
}
