//! Read-side queries: paths, children, counts and flattened lists

use super::{NestedSet, TreeError};
use crate::db::{Field, FindQuery, OrderBy, Predicate};
use crate::models::{NodeId, TreeNode};
use serde::{Deserialize, Serialize};

/// Options for [`NestedSet::children`]
#[derive(Debug, Clone, Default)]
pub struct ChildrenOptions {
    /// Only immediate children instead of every descendant
    pub direct: bool,
    /// Sort order, defaults to bound order
    pub order: Vec<OrderBy>,
    /// Page size, `None` returns every row
    pub limit: Option<u64>,
    /// 1-based page number, only meaningful with `limit`
    pub page: u64,
}

impl ChildrenOptions {
    pub fn direct() -> Self {
        Self {
            direct: true,
            ..Default::default()
        }
    }

    pub fn descendants() -> Self {
        Self::default()
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    pub fn paginate(mut self, limit: u64, page: u64) -> Self {
        self.limit = Some(limit);
        self.page = page;
        self
    }
}

/// Options for [`NestedSet::generate_list`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListOptions {
    /// Restrict the list to this node and its subtree
    pub root: Option<NodeId>,
    /// Extra filter applied on top of the scope
    pub conditions: Predicate,
    /// Repeated once per depth level in front of each label
    pub spacer: String,
    /// Property to label rows with, defaults to the configured display field
    pub label_field: Option<String>,
    /// Omit rows deeper than this, overriding `TreeConfig::max_depth`
    pub max_depth: Option<usize>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            root: None,
            conditions: Predicate::all(),
            spacer: "_".to_string(),
            label_field: None,
            max_depth: None,
        }
    }
}

/// One row of [`NestedSet::generate_list`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeListItem {
    pub id: NodeId,
    /// Depth derived from bound nesting within the listed rows
    pub depth: usize,
    /// Label prefixed with `depth` spacers
    pub label: String,
}

impl NestedSet {
    /// Node's parent, `None` for top-level nodes
    pub async fn parent_node(&self, id: &str) -> Result<Option<TreeNode>, TreeError> {
        let node = self.require_node(id).await?;
        match node.parent_id {
            Some(parent_id) => self.get_node(&parent_id).await,
            None => Ok(None),
        }
    }

    /// Ancestors of a node from the top level down, ending with the node itself
    pub async fn get_path(&self, id: &str) -> Result<Vec<TreeNode>, TreeError> {
        let node = self.require_node(id).await?;
        let predicate = self
            .scope_predicate()
            .le(Field::Left, node.lft)
            .ge(Field::Right, node.rght);
        let query = FindQuery::new(predicate).order_by(OrderBy::asc(Field::Left));
        Ok(self.store.find_all(&query).await?)
    }

    /// Children (or all descendants) of a node
    ///
    /// With `id = None` this lists the top-level nodes when `direct` is set,
    /// or every node of the scope otherwise.
    pub async fn children(
        &self,
        id: Option<&str>,
        options: &ChildrenOptions,
    ) -> Result<Vec<TreeNode>, TreeError> {
        let mut predicate = self.scope_predicate();
        match id {
            None if options.direct => predicate = predicate.is_null(Field::Parent),
            None => {}
            Some(id) => {
                let node = self.require_node(id).await?;
                predicate = if options.direct {
                    predicate.eq(Field::Parent, id)
                } else {
                    predicate
                        .gt(Field::Left, node.lft)
                        .lt(Field::Right, node.rght)
                };
            }
        }

        let mut query = FindQuery::new(predicate);
        if options.order.is_empty() {
            query = query.order_by(OrderBy::asc(Field::Left));
        } else {
            query.order = options.order.clone();
        }
        if let Some(limit) = options.limit {
            let page = options.page.max(1);
            query = query.limit(limit).offset(limit.saturating_mul(page - 1));
        }

        Ok(self.store.find_all(&query).await?)
    }

    /// Number of children (or descendants) of a node
    ///
    /// The descendant count of an existing node comes from its bounds alone.
    /// With `id = None` this counts top-level nodes (`direct`) or the scope.
    pub async fn child_count(&self, id: Option<&str>, direct: bool) -> Result<u64, TreeError> {
        let scope = self.scope_predicate();
        let count = match id {
            None if direct => self.store.count(&scope.is_null(Field::Parent)).await?,
            None => self.store.count(&scope).await?,
            Some(id) => {
                let node = self.require_node(id).await?;
                if direct {
                    self.store.count(&scope.eq(Field::Parent, id)).await?
                } else {
                    node.descendant_count()
                }
            }
        };
        Ok(count)
    }

    /// Flatten the tree into indented labels, in bound order
    pub async fn generate_list(
        &self,
        options: &ListOptions,
    ) -> Result<Vec<TreeListItem>, TreeError> {
        let mut predicate = self.scope_predicate().and_all(&options.conditions);
        if let Some(root) = &options.root {
            let node = self.require_node(root).await?;
            predicate = predicate.between(Field::Left, node.lft, node.rght);
        }
        let query = FindQuery::new(predicate).order_by(OrderBy::asc(Field::Left));
        let rows = self.store.find_all(&query).await?;

        let label_field = options
            .label_field
            .as_deref()
            .unwrap_or(&self.config.display_field);
        let max_depth = options.max_depth.or(self.config.max_depth);

        let mut open_rights: Vec<i64> = Vec::new();
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            while open_rights.last().is_some_and(|&right| right < row.rght) {
                open_rights.pop();
            }
            let depth = open_rights.len();
            open_rights.push(row.rght);

            if max_depth.is_some_and(|max| depth > max) {
                continue;
            }
            items.push(TreeListItem {
                label: format!("{}{}", options.spacer.repeat(depth), row.label(label_field)),
                id: row.id,
                depth,
            });
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::db::MemoryTreeStore;
    use serde_json::json;
    use std::sync::Arc;

    fn row(id: &str, parent: Option<&str>, lft: i64, rght: i64) -> TreeNode {
        TreeNode {
            id: id.to_string(),
            parent_id: parent.map(str::to_string),
            lft,
            rght,
            level: 0,
            properties: json!({ "name": id.to_uppercase() }),
        }
    }

    /// r(1,10) > [a(2,7) > [a1(3,4), a2(5,6)], b(8,9)], s(11,12)
    fn sample() -> NestedSet {
        let store = MemoryTreeStore::with_nodes(vec![
            row("r", None, 1, 10),
            row("a", Some("r"), 2, 7),
            row("a1", Some("a"), 3, 4),
            row("a2", Some("a"), 5, 6),
            row("b", Some("r"), 8, 9),
            row("s", None, 11, 12),
        ]);
        NestedSet::new(Arc::new(store), TreeConfig::default()).unwrap()
    }

    fn ids(nodes: &[TreeNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_get_path_and_parent() {
        let tree = sample();
        let path = tree.get_path("a2").await.unwrap();
        assert_eq!(ids(&path), vec!["r", "a", "a2"]);

        assert_eq!(tree.parent_node("a2").await.unwrap().unwrap().id, "a");
        assert!(tree.parent_node("r").await.unwrap().is_none());
        assert!(matches!(
            tree.get_path("ghost").await,
            Err(TreeError::NodeNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_children_direct_descendants_and_roots() {
        let tree = sample();
        let direct = tree
            .children(Some("r"), &ChildrenOptions::direct())
            .await
            .unwrap();
        assert_eq!(ids(&direct), vec!["a", "b"]);

        let all = tree
            .children(Some("r"), &ChildrenOptions::descendants())
            .await
            .unwrap();
        assert_eq!(ids(&all), vec!["a", "a1", "a2", "b"]);

        let roots = tree.children(None, &ChildrenOptions::direct()).await.unwrap();
        assert_eq!(ids(&roots), vec!["r", "s"]);
    }

    #[tokio::test]
    async fn test_children_ordering_and_pages() {
        let tree = sample();
        let options = ChildrenOptions::descendants()
            .order_by(OrderBy::desc(Field::property("name")))
            .paginate(3, 1);
        let first = tree.children(Some("r"), &options).await.unwrap();
        assert_eq!(ids(&first), vec!["b", "a2", "a1"]);

        let second = tree
            .children(Some("r"), &options.clone().paginate(3, 2))
            .await
            .unwrap();
        assert_eq!(ids(&second), vec!["a"]);
    }

    #[tokio::test]
    async fn test_child_count_variants() {
        let tree = sample();
        assert_eq!(tree.child_count(Some("r"), true).await.unwrap(), 2);
        assert_eq!(tree.child_count(Some("r"), false).await.unwrap(), 4);
        assert_eq!(tree.child_count(Some("a1"), false).await.unwrap(), 0);
        assert_eq!(tree.child_count(None, true).await.unwrap(), 2);
        assert_eq!(tree.child_count(None, false).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_generate_list_indents_by_depth() {
        let tree = sample();
        let list = tree.generate_list(&ListOptions::default()).await.unwrap();
        let labels: Vec<&str> = list.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["R", "_A", "__A1", "__A2", "_B", "S"]);

        let options = ListOptions {
            root: Some("a".to_string()),
            spacer: "--".to_string(),
            ..Default::default()
        };
        let subtree = tree.generate_list(&options).await.unwrap();
        let labels: Vec<&str> = subtree.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "--A1", "--A2"]);

        let shallow = ListOptions {
            max_depth: Some(0),
            ..Default::default()
        };
        let roots = tree.generate_list(&shallow).await.unwrap();
        assert_eq!(roots.len(), 2);
    }
}
