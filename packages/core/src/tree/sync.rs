//! Bulk bound shifting
//!
//! `sync` is the one primitive that moves bounds of existing rows. It adds a
//! signed delta to every left and/or right bound falling in a range, always
//! restricted to the engine's scope.

use super::{NestedSet, TreeError};
use crate::db::{Aggregate, Assignment, CompareOp, Condition, Field};

/// Which bound values a `sync` call touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundRange {
    /// Strictly greater than the value
    Above(i64),
    /// Greater than or equal to the value
    AtLeast(i64),
    /// Inclusive range
    Between(i64, i64),
}

impl BoundRange {
    fn condition(self, field: Field) -> Condition {
        match self {
            BoundRange::Above(n) => Condition::compare(field, CompareOp::Gt, n),
            BoundRange::AtLeast(n) => Condition::compare(field, CompareOp::Ge, n),
            BoundRange::Between(low, high) => Condition::Between { field, low, high },
        }
    }
}

/// Bound column(s) a `sync` call shifts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncTarget {
    Left,
    Right,
    /// Left bounds first, then right bounds
    #[default]
    Both,
}

impl SyncTarget {
    fn fields(self) -> Vec<Field> {
        match self {
            SyncTarget::Left => vec![Field::Left],
            SyncTarget::Right => vec![Field::Right],
            SyncTarget::Both => vec![Field::Left, Field::Right],
        }
    }
}

impl NestedSet {
    /// Add `delta` to every selected bound inside `range`
    ///
    /// Each column is matched against its own pre-update value, so the left
    /// pass never changes which rows the right pass selects.
    pub(crate) async fn sync(
        &self,
        delta: i64,
        range: BoundRange,
        target: SyncTarget,
    ) -> Result<(), TreeError> {
        if delta == 0 {
            return Ok(());
        }

        for field in target.fields() {
            let predicate = self.scope_predicate().and(range.condition(field.clone()));
            let affected = self
                .store
                .bulk_update(&[Assignment::shift(field.clone(), delta)], &predicate)
                .await?;
            tracing::debug!(delta, ?range, ?field, affected, "Shifted bounds");
        }

        Ok(())
    }

    /// Largest right bound in scope, 0 for an empty scope
    pub(crate) async fn edge(&self) -> Result<i64, TreeError> {
        let max = self
            .store
            .aggregate(Aggregate::Max, Field::Right, &self.scope_predicate())
            .await?;
        Ok(max.unwrap_or(0))
    }

    /// Largest right bound in scope ignoring one node
    pub(crate) async fn edge_excluding(&self, id: &str) -> Result<i64, TreeError> {
        let predicate = self.scope_predicate().ne(Field::Id, id);
        let max = self
            .store
            .aggregate(Aggregate::Max, Field::Right, &predicate)
            .await?;
        Ok(max.unwrap_or(0))
    }

    /// Add `delta` to the depth of every node whose left bound lies in `[low, high]`
    pub(crate) async fn shift_levels(
        &self,
        low: i64,
        high: i64,
        delta: i64,
    ) -> Result<(), TreeError> {
        if delta == 0 || !self.config.tracks_level() {
            return Ok(());
        }
        let predicate = self.scope_predicate().between(Field::Left, low, high);
        self.store
            .bulk_update(&[Assignment::shift(Field::Level, delta)], &predicate)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Scope, TreeConfig};
    use crate::db::{MemoryTreeStore, TreeStore};
    use crate::models::TreeNode;
    use serde_json::json;
    use std::sync::Arc;

    fn row(id: &str, lft: i64, rght: i64, owner: &str) -> TreeNode {
        TreeNode {
            id: id.to_string(),
            parent_id: None,
            lft,
            rght,
            level: 0,
            properties: json!({ "owner": owner }),
        }
    }

    fn bounds_of(store: &MemoryTreeStore) -> Vec<(String, i64, i64)> {
        store
            .snapshot()
            .unwrap()
            .into_iter()
            .map(|n| (n.id, n.lft, n.rght))
            .collect()
    }

    #[tokio::test]
    async fn test_sync_shifts_both_columns_within_range() {
        let store = Arc::new(MemoryTreeStore::with_nodes(vec![
            row("a", 1, 6, "x"),
            row("b", 2, 3, "x"),
            row("c", 4, 5, "x"),
            row("d", 7, 8, "x"),
        ]));
        let tree = NestedSet::new(store.clone(), TreeConfig::default()).unwrap();

        tree.sync(2, BoundRange::AtLeast(5), SyncTarget::Both)
            .await
            .unwrap();

        assert_eq!(
            bounds_of(&store),
            vec![
                ("a".to_string(), 1, 8),
                ("b".to_string(), 2, 3),
                ("c".to_string(), 4, 7),
                ("d".to_string(), 9, 10),
            ]
        );
    }

    #[tokio::test]
    async fn test_sync_single_column_and_zero_delta() {
        let store = Arc::new(MemoryTreeStore::with_nodes(vec![
            row("a", 1, 2, "x"),
            row("b", 3, 4, "x"),
        ]));
        let tree = NestedSet::new(store.clone(), TreeConfig::default()).unwrap();

        tree.sync(0, BoundRange::Above(0), SyncTarget::Both)
            .await
            .unwrap();
        tree.sync(-1, BoundRange::Between(3, 4), SyncTarget::Right)
            .await
            .unwrap();

        assert_eq!(
            bounds_of(&store),
            vec![("a".to_string(), 1, 2), ("b".to_string(), 3, 3)]
        );
    }

    #[tokio::test]
    async fn test_sync_never_crosses_scope() {
        let store = Arc::new(MemoryTreeStore::with_nodes(vec![
            row("a", 1, 2, "alice"),
            row("b", 1, 2, "bob"),
        ]));
        let config = TreeConfig::default().with_scope(Scope::property_eq("owner", "alice"));
        let tree = NestedSet::new(store.clone(), config).unwrap();

        tree.sync(10, BoundRange::AtLeast(1), SyncTarget::Both)
            .await
            .unwrap();

        assert_eq!(
            bounds_of(&store),
            vec![("a".to_string(), 11, 12), ("b".to_string(), 1, 2)]
        );
        assert_eq!(tree.edge().await.unwrap(), 12);
        assert_eq!(tree.edge_excluding("a").await.unwrap(), 0);
        assert_eq!(store.count(&crate::db::Predicate::all()).await.unwrap(), 2);
    }
}
