//! Structural mutations
//!
//! Every method here reads the bounds it needs, checks preconditions, and only
//! then issues `sync` shifts plus the row updates for the moved node. A failed
//! precondition leaves storage untouched.

use super::sync::{BoundRange, SyncTarget};
use super::{NestedSet, TreeError};
use crate::db::{Assignment, Field, FindQuery};
use crate::models::{Bounds, NewNode, NodeChanges, NodeId, TreeNode};
use serde_json::Value;
use std::ops::Deref;
use tokio::sync::OwnedMutexGuard;

/// Exclusive mutation handle on one scope
///
/// Obtained from [`NestedSet::writer`]. Dereferences to the engine so reads
/// issued while holding the writer see the writer's own changes.
#[derive(Debug)]
pub struct TreeWriter<'a> {
    tree: &'a NestedSet,
    _guard: OwnedMutexGuard<()>,
}

impl<'a> Deref for TreeWriter<'a> {
    type Target = NestedSet;

    fn deref(&self) -> &NestedSet {
        self.tree
    }
}

/// How far `move_up`/`move_down` travel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveCount {
    /// At most this many sibling swaps
    Steps(u32),
    /// Until the node is the first (or last) of its siblings
    ToEdge,
}

impl Default for MoveCount {
    fn default() -> Self {
        MoveCount::Steps(1)
    }
}

impl From<u32> for MoveCount {
    fn from(steps: u32) -> Self {
        MoveCount::Steps(steps)
    }
}

impl MoveCount {
    fn has_steps(self) -> bool {
        !matches!(self, MoveCount::Steps(0))
    }

    fn step(self) -> Self {
        match self {
            MoveCount::Steps(n) => MoveCount::Steps(n.saturating_sub(1)),
            MoveCount::ToEdge => MoveCount::ToEdge,
        }
    }
}

/// Result of [`TreeWriter::remove_from_tree`]
#[derive(Debug, Clone, PartialEq)]
pub enum RemovalOutcome {
    /// Node kept as a new top-level leaf at the end of the scope
    Detached(TreeNode),
    /// Node row deleted
    Deleted,
}

/// Bounds captured by [`TreeWriter::before_delete`]
///
/// Carries the extent of the subtree across the deletion of its root so
/// [`TreeWriter::after_delete`] can remove descendants and close the gap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteSnapshot {
    pub id: NodeId,
    pub bounds: Bounds,
}

impl<'a> TreeWriter<'a> {
    pub(crate) fn new(tree: &'a NestedSet, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            tree,
            _guard: guard,
        }
    }

    /// Insert a node as the last child of its parent, or as the last root
    ///
    /// The scope's equality values are written into `properties`, replacing
    /// any conflicting value, so the node lands in this writer's scope.
    ///
    /// # Errors
    ///
    /// `NodeNotFound` when the parent is not in scope, `NodeExists` when the
    /// requested id is taken.
    pub async fn create(&self, mut node: NewNode) -> Result<TreeNode, TreeError> {
        self.config().scope.pin(&mut node.properties);

        if let Some(id) = &node.id {
            let taken = self
                .store()
                .count(&crate::db::Predicate::all().eq(Field::Id, id.as_str()))
                .await?;
            if taken > 0 {
                return Err(TreeError::node_exists(id.as_str()));
            }
        }

        let (bounds, level) = match node.parent_id.as_deref() {
            None => {
                let edge = self.edge().await?;
                (Bounds::new(edge + 1, edge + 2), 0)
            }
            Some(parent_id) => {
                let parent = self.require_node(parent_id).await?;
                self.sync(2, BoundRange::AtLeast(parent.rght), SyncTarget::Both)
                    .await?;
                let level = if self.config().tracks_level() {
                    parent.level + 1
                } else {
                    0
                };
                (Bounds::new(parent.rght, parent.rght + 1), level)
            }
        };

        let created = self.store().insert(&node, bounds, level).await?;
        tracing::debug!(
            id = %created.id,
            parent = ?created.parent_id,
            lft = created.lft,
            rght = created.rght,
            "Inserted node"
        );
        Ok(created)
    }

    /// Move a node (with its subtree) under a new parent, or to the top level
    ///
    /// The node becomes the last child of the new parent. Setting the parent
    /// it already has is a no-op.
    ///
    /// # Errors
    ///
    /// `CircularReference` when `parent_id` is the node itself or one of its
    /// descendants, `NodeNotFound` when either node is not in scope.
    pub async fn set_parent(
        &self,
        id: &str,
        parent_id: Option<&str>,
    ) -> Result<TreeNode, TreeError> {
        let node = self.require_node(id).await?;
        if node.parent_id.as_deref() == parent_id {
            return Ok(node);
        }

        let new_level = match parent_id {
            None => {
                self.detach_subtree(&node).await?;
                0
            }
            Some(parent_id) => {
                if parent_id == id {
                    return Err(TreeError::circular_reference(id, parent_id));
                }
                let parent = self.require_node(parent_id).await?;
                if node.bounds().contains(&parent.bounds()) {
                    return Err(TreeError::circular_reference(id, parent_id));
                }
                self.attach_subtree(&node, &parent).await?;
                parent.level + 1
            }
        };

        let parent_value = parent_id.map_or(Value::Null, Value::from);
        self.store()
            .bulk_update(
                &[Assignment::set(Field::Parent, parent_value)],
                &self.scope_predicate().eq(Field::Id, id),
            )
            .await?;

        let mut moved = self.require_node(id).await?;
        if self.config().tracks_level() && new_level != node.level {
            self.shift_levels(moved.lft, moved.rght, new_level - node.level)
                .await?;
            moved.level = new_level;
        }

        tracing::debug!(id, parent = ?parent_id, lft = moved.lft, rght = moved.rght, "Moved node");
        Ok(moved)
    }

    /// Park the subtree past the edge, then close the gap it left
    async fn detach_subtree(&self, node: &TreeNode) -> Result<(), TreeError> {
        let edge = self.edge().await?;
        let width = node.bounds().width();

        self.sync(
            edge - node.lft + 1,
            BoundRange::Between(node.lft, node.rght),
            SyncTarget::Both,
        )
        .await?;
        self.sync(-width, BoundRange::Above(node.lft), SyncTarget::Both)
            .await
    }

    /// Park the subtree past the edge, then slide it into place as the last
    /// child of `parent`, closing the gap it left
    async fn attach_subtree(&self, node: &TreeNode, parent: &TreeNode) -> Result<(), TreeError> {
        let edge = self.edge().await?;
        let width = node.bounds().width();
        let (left, right) = (node.lft, node.rght);
        let parent_right = parent.rght;

        self.sync(
            edge - left + 1,
            BoundRange::Between(left, right),
            SyncTarget::Both,
        )
        .await?;

        if left > parent.lft && right < parent_right {
            // Inside the new parent already: close the gap up to its end
            self.sync(
                -width,
                BoundRange::Between(right, parent_right - 1),
                SyncTarget::Both,
            )
            .await?;
            self.sync(
                -(edge - parent_right + width + 1),
                BoundRange::Above(edge),
                SyncTarget::Both,
            )
            .await
        } else if left > parent.lft {
            // After the new parent: open room before its right bound
            self.sync(
                width,
                BoundRange::Between(parent_right, right),
                SyncTarget::Both,
            )
            .await?;
            self.sync(
                -(edge - parent_right + 1),
                BoundRange::Above(edge),
                SyncTarget::Both,
            )
            .await
        } else {
            // Before the new parent
            self.sync(
                -width,
                BoundRange::Between(right, parent_right - 1),
                SyncTarget::Both,
            )
            .await?;
            self.sync(
                -(edge - parent_right + width + 1),
                BoundRange::Above(edge),
                SyncTarget::Both,
            )
            .await
        }
    }

    /// Update a node's parent and/or properties
    ///
    /// A parent change is applied first, exactly like [`Self::set_parent`].
    pub async fn save(&self, id: &str, changes: NodeChanges) -> Result<TreeNode, TreeError> {
        let mut node = match changes.parent_id {
            Some(parent_id) => self.set_parent(id, parent_id.as_deref()).await?,
            None => self.require_node(id).await?,
        };

        if let Some(mut properties) = changes.properties {
            self.config().scope.pin(&mut properties);
            self.store()
                .bulk_update(
                    &[Assignment::set(Field::Properties, properties.clone())],
                    &self.scope_predicate().eq(Field::Id, id),
                )
                .await?;
            node.properties = properties;
        }

        Ok(node)
    }

    /// Swap the node with its next sibling, `count` times
    ///
    /// Returns `true` if at least one swap happened; a node that is already
    /// its parent's last child returns `false`.
    pub async fn move_down(&self, id: &str, count: MoveCount) -> Result<bool, TreeError> {
        let mut remaining = count;
        let mut moved = false;

        while remaining.has_steps() {
            let node = self.require_node(id).await?;
            let next = self
                .store()
                .find_one(&FindQuery::new(
                    self.scope_predicate().eq(Field::Left, node.rght + 1),
                ))
                .await?;
            let Some(next) = next else {
                break;
            };

            let edge = self.edge().await?;
            self.sync(
                edge - node.lft + 1,
                BoundRange::Between(node.lft, node.rght),
                SyncTarget::Both,
            )
            .await?;
            self.sync(
                -(next.lft - node.lft),
                BoundRange::Between(next.lft, next.rght),
                SyncTarget::Both,
            )
            .await?;
            self.sync(
                -(edge - node.lft - (next.rght - next.lft)),
                BoundRange::Above(edge),
                SyncTarget::Both,
            )
            .await?;

            tracing::debug!(id, sibling = %next.id, "Moved node down");
            moved = true;
            remaining = remaining.step();
        }

        Ok(moved)
    }

    /// Swap the node with its previous sibling, `count` times
    ///
    /// Returns `true` if at least one swap happened; a node that is already
    /// its parent's first child returns `false`.
    pub async fn move_up(&self, id: &str, count: MoveCount) -> Result<bool, TreeError> {
        let mut remaining = count;
        let mut moved = false;

        while remaining.has_steps() {
            let node = self.require_node(id).await?;
            let previous = self
                .store()
                .find_one(&FindQuery::new(
                    self.scope_predicate().eq(Field::Right, node.lft - 1),
                ))
                .await?;
            let Some(previous) = previous else {
                break;
            };

            let edge = self.edge().await?;
            self.sync(
                edge - previous.lft + 1,
                BoundRange::Between(previous.lft, previous.rght),
                SyncTarget::Both,
            )
            .await?;
            self.sync(
                -(node.lft - previous.lft),
                BoundRange::Between(node.lft, node.rght),
                SyncTarget::Both,
            )
            .await?;
            self.sync(
                -(edge - previous.lft - (node.rght - node.lft)),
                BoundRange::Above(edge),
                SyncTarget::Both,
            )
            .await?;

            tracing::debug!(id, sibling = %previous.id, "Moved node up");
            moved = true;
            remaining = remaining.step();
        }

        Ok(moved)
    }

    /// Take a node out of the hierarchy without touching its descendants
    ///
    /// Children are promoted to the node's parent, keeping their order and
    /// position. The node itself is then deleted (`delete = true`) or kept as
    /// a detached top-level leaf at the end of the scope.
    pub async fn remove_from_tree(
        &self,
        id: &str,
        delete: bool,
    ) -> Result<RemovalOutcome, TreeError> {
        let node = self.require_node(id).await?;

        if node.is_leaf() {
            if delete {
                self.delete(id).await?;
                return Ok(RemovalOutcome::Deleted);
            }
            let detached = self.set_parent(id, None).await?;
            return Ok(RemovalOutcome::Detached(detached));
        }

        let grandparent = node.parent_id.clone().map_or(Value::Null, Value::String);
        self.store()
            .bulk_update(
                &[Assignment::set(Field::Parent, grandparent)],
                &self.scope_predicate().eq(Field::Parent, id),
            )
            .await?;

        self.sync(
            -1,
            BoundRange::Between(node.lft + 1, node.rght - 1),
            SyncTarget::Both,
        )
        .await?;
        self.sync(-2, BoundRange::Above(node.rght), SyncTarget::Both)
            .await?;

        if self.config().tracks_level() {
            let promoted = self
                .scope_predicate()
                .between(Field::Left, node.lft, node.rght - 2)
                .ne(Field::Id, id);
            self.store()
                .bulk_update(&[Assignment::shift(Field::Level, -1)], &promoted)
                .await?;
        }

        let this_node = self.scope_predicate().eq(Field::Id, id);
        if delete {
            self.store().bulk_delete(&this_node).await?;
            tracing::debug!(id, "Removed node from tree and deleted it");
            return Ok(RemovalOutcome::Deleted);
        }

        let edge = self.edge_excluding(id).await?;
        let mut assignments = vec![
            Assignment::set(Field::Left, edge + 1),
            Assignment::set(Field::Right, edge + 2),
            Assignment::set(Field::Parent, Value::Null),
        ];
        if self.config().tracks_level() {
            assignments.push(Assignment::set(Field::Level, 0));
        }
        self.store().bulk_update(&assignments, &this_node).await?;

        tracing::debug!(id, "Removed node from tree");
        Ok(RemovalOutcome::Detached(self.require_node(id).await?))
    }

    /// Capture the bounds of a node about to be deleted
    pub async fn before_delete(&self, id: &str) -> Result<DeleteSnapshot, TreeError> {
        let node = self.require_node(id).await?;
        Ok(DeleteSnapshot {
            bounds: node.bounds(),
            id: node.id,
        })
    }

    /// Delete the descendants of an already deleted node and close the gap
    ///
    /// Returns the number of descendant rows removed.
    pub async fn after_delete(&self, snapshot: DeleteSnapshot) -> Result<u64, TreeError> {
        let Bounds { left, right } = snapshot.bounds;
        let width = snapshot.bounds.width();

        let mut removed = 0;
        if width > 2 {
            let descendants = self.scope_predicate().between(Field::Left, left + 1, right - 1);
            removed = self.store().bulk_delete(&descendants).await?;
        }
        self.sync(-width, BoundRange::Above(right), SyncTarget::Both)
            .await?;

        tracing::debug!(id = %snapshot.id, descendants = removed, "Closed gap after delete");
        Ok(removed)
    }

    /// Delete a node together with its whole subtree
    ///
    /// Returns the number of rows removed.
    pub async fn delete(&self, id: &str) -> Result<u64, TreeError> {
        let snapshot = self.before_delete(id).await?;
        let mut removed = self
            .store()
            .bulk_delete(&self.scope_predicate().eq(Field::Id, id))
            .await?;
        removed += self.after_delete(snapshot).await?;

        tracing::debug!(id, removed, "Deleted subtree");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::db::MemoryTreeStore;
    use serde_json::json;
    use std::sync::Arc;

    fn engine() -> NestedSet {
        NestedSet::new(
            Arc::new(MemoryTreeStore::new()),
            TreeConfig::default().with_level("level"),
        )
        .unwrap()
    }

    async fn add(writer: &TreeWriter<'_>, id: &str, parent: Option<&str>) -> TreeNode {
        let node = NewNode {
            id: Some(id.to_string()),
            parent_id: parent.map(str::to_string),
            properties: json!({ "name": id }),
        };
        writer.create(node).await.unwrap()
    }

    async fn ids_in_order(tree: &NestedSet) -> Vec<NodeId> {
        let query = FindQuery::new(tree.scope_predicate()).order_by(crate::db::OrderBy::asc(Field::Left));
        let rows = tree.store().find_all(&query).await.unwrap();
        rows.into_iter().map(|n| n.id).collect()
    }

    async fn bounds(tree: &NestedSet, id: &str) -> (i64, i64) {
        let node = tree.get_node(id).await.unwrap().unwrap();
        (node.lft, node.rght)
    }

    #[test]
    fn test_move_count_steps() {
        assert!(MoveCount::default().has_steps());
        assert!(!MoveCount::Steps(0).has_steps());
        assert_eq!(MoveCount::Steps(2).step(), MoveCount::Steps(1));
        assert_eq!(MoveCount::ToEdge.step(), MoveCount::ToEdge);
        assert_eq!(MoveCount::from(3), MoveCount::Steps(3));
    }

    #[tokio::test]
    async fn test_create_appends_last_child() {
        let tree = engine();
        let writer = tree.writer().await;
        add(&writer, "r", None).await;
        add(&writer, "a", Some("r")).await;
        let b = add(&writer, "b", Some("r")).await;

        assert_eq!((b.lft, b.rght, b.level), (4, 5, 1));
        assert_eq!(bounds(&writer, "r").await, (1, 6));
        assert_eq!(bounds(&writer, "a").await, (2, 3));

        let second_root = add(&writer, "s", None).await;
        assert_eq!((second_root.lft, second_root.rght), (7, 8));
    }

    #[tokio::test]
    async fn test_create_rejects_missing_parent_and_taken_id() {
        let tree = engine();
        let writer = tree.writer().await;
        add(&writer, "r", None).await;

        let orphan = writer
            .create(NewNode::child_of("ghost", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(orphan, TreeError::NodeNotFound { .. }));

        let duplicate = writer
            .create(NewNode::root(json!({})).with_id("r"))
            .await
            .unwrap_err();
        assert!(matches!(duplicate, TreeError::NodeExists { .. }));
        assert_eq!(bounds(&writer, "r").await, (1, 2));
    }

    #[tokio::test]
    async fn test_set_parent_rejects_cycles_without_writes() {
        let tree = engine();
        let writer = tree.writer().await;
        add(&writer, "r", None).await;
        add(&writer, "a", Some("r")).await;
        add(&writer, "a1", Some("a")).await;

        for target in ["a", "a1"] {
            let err = writer.set_parent("a", Some(target)).await.unwrap_err();
            assert!(matches!(err, TreeError::CircularReference { .. }));
        }
        assert_eq!(bounds(&writer, "a").await, (2, 5));
        assert_eq!(bounds(&writer, "a1").await, (3, 4));
    }

    #[tokio::test]
    async fn test_move_down_and_up_swap_siblings() {
        let tree = engine();
        let writer = tree.writer().await;
        add(&writer, "r", None).await;
        add(&writer, "a", Some("r")).await;
        add(&writer, "b", Some("r")).await;
        add(&writer, "b1", Some("b")).await;

        assert!(writer.move_down("a", MoveCount::default()).await.unwrap());
        assert_eq!(bounds(&writer, "b").await, (2, 5));
        assert_eq!(bounds(&writer, "b1").await, (3, 4));
        assert_eq!(bounds(&writer, "a").await, (6, 7));
        assert!(!writer.move_down("a", MoveCount::ToEdge).await.unwrap());

        assert!(writer.move_up("a", MoveCount::ToEdge).await.unwrap());
        assert_eq!(bounds(&writer, "a").await, (2, 3));
        assert_eq!(bounds(&writer, "b").await, (4, 7));
        assert!(!writer.move_up("a", MoveCount::Steps(0)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_removes_subtree_and_closes_gap() {
        let tree = engine();
        let writer = tree.writer().await;
        add(&writer, "r", None).await;
        add(&writer, "a", Some("r")).await;
        add(&writer, "a1", Some("a")).await;
        add(&writer, "b", Some("r")).await;

        assert_eq!(writer.delete("a").await.unwrap(), 2);
        assert_eq!(ids_in_order(&writer).await, vec!["r", "b"]);
        assert_eq!(bounds(&writer, "r").await, (1, 4));
        assert_eq!(bounds(&writer, "b").await, (2, 3));
    }

    #[tokio::test]
    async fn test_try_writer_refuses_held_scope() {
        let tree = engine();
        let other = tree.scoped(crate::config::Scope::property_eq("owner", "bob"));

        let writer = tree.writer().await;
        assert!(writer.try_writer().is_none());
        assert!(other.try_writer().is_some());
        drop(writer);

        let writer = tree.try_writer().expect("lock released");
        add(&writer, "r", None).await;
        assert_eq!(bounds(&writer, "r").await, (1, 2));
    }
}
