//! In-memory `TreeStore`
//!
//! Keeps rows in a `BTreeMap` behind a mutex and evaluates predicates in
//! Rust. Used by the test suites and by callers that want a tree index over
//! data they already hold in memory.

use crate::db::error::DatabaseError;
use crate::db::predicate::{
    compare_values, Aggregate, AssignValue, Assignment, Condition, Field, FindQuery, Operand,
    Predicate, SortDirection,
};
use crate::db::tree_store::TreeStore;
use crate::models::{Bounds, NewNode, NodeId, TreeNode};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct MemoryTreeStore {
    nodes: Arc<Mutex<BTreeMap<NodeId, TreeNode>>>,
}

impl MemoryTreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with rows as-is (bounds are not checked)
    pub fn with_nodes(nodes: Vec<TreeNode>) -> Self {
        let map = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        Self {
            nodes: Arc::new(Mutex::new(map)),
        }
    }

    /// Copy of every row, ordered by id
    pub fn snapshot(&self) -> Result<Vec<TreeNode>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    /// Overwrite raw columns of one row, bypassing the engine
    ///
    /// Intended for tests that need to simulate corruption.
    pub fn overwrite(&self, node: TreeNode) -> Result<()> {
        self.lock()?.insert(node.id.clone(), node);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<NodeId, TreeNode>>> {
        self.nodes.lock().map_err(|_| DatabaseError::LockPoisoned.into())
    }
}

fn field_value(node: &TreeNode, field: &Field) -> Value {
    match field {
        Field::Id => Value::String(node.id.clone()),
        Field::Parent => node
            .parent_id
            .as_ref()
            .map_or(Value::Null, |p| Value::String(p.clone())),
        Field::Left => Value::from(node.lft),
        Field::Right => Value::from(node.rght),
        Field::Level => Value::from(node.level),
        Field::Properties => node.properties.clone(),
        Field::Property(name) => node.properties.get(name).cloned().unwrap_or(Value::Null),
    }
}

fn eval_condition(node: &TreeNode, condition: &Condition) -> bool {
    match condition {
        Condition::Compare { field, op, operand } => {
            let lhs = field_value(node, field);
            let rhs = match operand {
                Operand::Value(v) => v.clone(),
                Operand::Field(other) => field_value(node, other),
            };
            op.matches(compare_values(&lhs, &rhs))
        }
        Condition::Between { field, low, high } => field_value(node, field)
            .as_i64()
            .is_some_and(|v| *low <= v && v <= *high),
        Condition::IsNull(field) => field_value(node, field).is_null(),
        Condition::NotNull(field) => !field_value(node, field).is_null(),
        Condition::In { field, values } => {
            let v = field_value(node, field);
            values
                .iter()
                .any(|candidate| compare_values(&v, candidate) == Some(Ordering::Equal))
        }
        Condition::Any(conditions) => conditions.iter().any(|c| eval_condition(node, c)),
    }
}

fn matches(node: &TreeNode, predicate: &Predicate) -> bool {
    predicate
        .conditions()
        .iter()
        .all(|c| eval_condition(node, c))
}

/// SQLite ordering: NULL sorts first ascending
fn order_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}

fn as_bound(field: &Field, value: &Value) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| anyhow!("{:?} requires an integer, got {}", field, value))
}

fn apply_assignment(node: &mut TreeNode, assignment: &Assignment) -> Result<()> {
    let field = &assignment.field;
    match (&assignment.value, field) {
        (_, Field::Id) => {
            return Err(DatabaseError::unsupported_field(field, "ids are immutable").into())
        }
        (AssignValue::Set(value), Field::Parent) => {
            node.parent_id = match value {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => return Err(anyhow!("parent must be a string or null, got {}", other)),
            };
        }
        (AssignValue::Set(value), Field::Left) => node.lft = as_bound(field, value)?,
        (AssignValue::Set(value), Field::Right) => node.rght = as_bound(field, value)?,
        (AssignValue::Set(value), Field::Level) => node.level = as_bound(field, value)?,
        (AssignValue::Set(value), Field::Properties) => node.properties = value.clone(),
        (AssignValue::Set(value), Field::Property(name)) => {
            if !node.properties.is_object() {
                node.properties = Value::Object(Map::new());
            }
            if let Some(obj) = node.properties.as_object_mut() {
                obj.insert(name.clone(), value.clone());
            }
        }
        (AssignValue::Shift(delta), Field::Left) => node.lft += delta,
        (AssignValue::Shift(delta), Field::Right) => node.rght += delta,
        (AssignValue::Shift(delta), Field::Level) => node.level += delta,
        (AssignValue::Shift(_), _) => {
            return Err(DatabaseError::unsupported_field(field, "only bounds and level shift").into())
        }
    }
    Ok(())
}

#[async_trait]
impl TreeStore for MemoryTreeStore {
    async fn insert(&self, node: &NewNode, bounds: Bounds, level: i64) -> Result<TreeNode> {
        let mut nodes = self.lock()?;
        let id = node
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if nodes.contains_key(&id) {
            return Err(anyhow!("Node '{}' already exists", id));
        }

        let row = TreeNode {
            id: id.clone(),
            parent_id: node.parent_id.clone(),
            lft: bounds.left,
            rght: bounds.right,
            level,
            properties: node.properties.clone(),
        };
        nodes.insert(id, row.clone());
        Ok(row)
    }

    async fn find_all(&self, query: &FindQuery) -> Result<Vec<TreeNode>> {
        let nodes = self.lock()?;
        let mut rows: Vec<TreeNode> = nodes
            .values()
            .filter(|n| matches(n, &query.predicate))
            .cloned()
            .collect();
        drop(nodes);

        if !query.order.is_empty() {
            rows.sort_by(|a, b| {
                for order in &query.order {
                    let ord = order_values(&field_value(a, &order.field), &field_value(b, &order.field));
                    let ord = match order.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = usize::try_from(query.offset).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64> {
        let nodes = self.lock()?;
        Ok(nodes.values().filter(|n| matches(n, predicate)).count() as u64)
    }

    async fn aggregate(
        &self,
        function: Aggregate,
        field: Field,
        predicate: &Predicate,
    ) -> Result<Option<i64>> {
        let nodes = self.lock()?;
        let values = nodes
            .values()
            .filter(|n| matches(n, predicate))
            .filter_map(|n| field_value(n, &field).as_i64());
        Ok(match function {
            Aggregate::Min => values.min(),
            Aggregate::Max => values.max(),
        })
    }

    async fn bulk_update(&self, assignments: &[Assignment], predicate: &Predicate) -> Result<u64> {
        let mut nodes = self.lock()?;
        let targets: Vec<NodeId> = nodes
            .values()
            .filter(|n| matches(n, predicate))
            .map(|n| n.id.clone())
            .collect();

        // Stage every change first so a failing assignment leaves no partial update.
        let mut staged = Vec::with_capacity(targets.len());
        for id in &targets {
            if let Some(node) = nodes.get(id) {
                let mut updated = node.clone();
                for assignment in assignments {
                    apply_assignment(&mut updated, assignment)?;
                }
                staged.push(updated);
            }
        }
        for node in staged {
            nodes.insert(node.id.clone(), node);
        }
        Ok(targets.len() as u64)
    }

    async fn bulk_delete(&self, predicate: &Predicate) -> Result<u64> {
        let mut nodes = self.lock()?;
        let before = nodes.len();
        nodes.retain(|_, n| !matches(n, predicate));
        Ok((before - nodes.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::predicate::{CompareOp, OrderBy};
    use serde_json::json;

    fn row(id: &str, parent: Option<&str>, lft: i64, rght: i64, props: Value) -> TreeNode {
        TreeNode {
            id: id.to_string(),
            parent_id: parent.map(str::to_string),
            lft,
            rght,
            level: 0,
            properties: props,
        }
    }

    fn sample_store() -> MemoryTreeStore {
        MemoryTreeStore::with_nodes(vec![
            row("r", None, 1, 6, json!({"name": "Root", "owner": "alice"})),
            row("a", Some("r"), 2, 3, json!({"name": "A", "owner": "alice"})),
            row("b", Some("r"), 4, 5, json!({"name": "B", "owner": "alice"})),
            row("x", None, 1, 2, json!({"name": "X", "owner": "bob"})),
        ])
    }

    #[tokio::test]
    async fn test_insert_assigns_id() {
        let store = MemoryTreeStore::new();
        let node = store
            .insert(&NewNode::root(json!({"name": "Root"})), Bounds::new(1, 2), 0)
            .await
            .unwrap();
        assert!(!node.id.is_empty());
        assert_eq!((node.lft, node.rght), (1, 2));
        assert_eq!(store.snapshot().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id() {
        let store = sample_store();
        let result = store
            .insert(&NewNode::root(json!({})).with_id("r"), Bounds::new(7, 8), 0)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_find_all_filters_orders_and_paginates() {
        let store = sample_store();
        let scope = Predicate::all().eq(Field::property("owner"), "alice");

        let all = store
            .find_all(&FindQuery::new(scope.clone()).order_by(OrderBy::desc(Field::Left)))
            .await
            .unwrap();
        let ids: Vec<_> = all.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "r"]);

        let page = store
            .find_all(
                &FindQuery::new(scope)
                    .order_by(OrderBy::asc(Field::Left))
                    .limit(1)
                    .offset(1),
            )
            .await
            .unwrap();
        assert_eq!(page[0].id, "a");
    }

    #[tokio::test]
    async fn test_field_to_field_and_disjunction() {
        let store = sample_store();
        let inverted = Predicate::all().and(Condition::compare_fields(
            Field::Right,
            CompareOp::Lt,
            Field::Left,
        ));
        assert_eq!(store.count(&inverted).await.unwrap(), 0);

        let either = Predicate::all().and(Condition::Any(vec![
            Condition::compare(Field::Left, CompareOp::Eq, 4),
            Condition::compare(Field::Right, CompareOp::Eq, 4),
        ]));
        assert_eq!(store.count(&either).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_aggregate_respects_predicate() {
        let store = sample_store();
        let alice = Predicate::all().eq(Field::property("owner"), "alice");
        let max = store
            .aggregate(Aggregate::Max, Field::Right, &alice)
            .await
            .unwrap();
        assert_eq!(max, Some(6));

        let nobody = Predicate::all().eq(Field::property("owner"), "carol");
        let none = store
            .aggregate(Aggregate::Min, Field::Left, &nobody)
            .await
            .unwrap();
        assert_eq!(none, None);
    }

    #[tokio::test]
    async fn test_bulk_update_evaluates_predicate_before_update() {
        let store = sample_store();
        let scope = Predicate::all().eq(Field::property("owner"), "alice");
        let affected = store
            .bulk_update(
                &[Assignment::shift(Field::Left, 2)],
                &scope.clone().ge(Field::Left, 2),
            )
            .await
            .unwrap();
        assert_eq!(affected, 2);

        let rows = store.snapshot().unwrap();
        let a = rows.iter().find(|n| n.id == "a").unwrap();
        let b = rows.iter().find(|n| n.id == "b").unwrap();
        let x = rows.iter().find(|n| n.id == "x").unwrap();
        assert_eq!((a.lft, b.lft, x.lft), (4, 6, 1));
    }

    #[tokio::test]
    async fn test_bulk_update_sets_parent_and_properties() {
        let store = sample_store();
        store
            .bulk_update(
                &[
                    Assignment::set(Field::Parent, Value::Null),
                    Assignment::set(Field::property("name"), "Renamed"),
                ],
                &Predicate::all().eq(Field::Id, "a"),
            )
            .await
            .unwrap();
        let a = store
            .find_one(&FindQuery::new(Predicate::all().eq(Field::Id, "a")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.parent_id, None);
        assert_eq!(a.properties["name"], json!("Renamed"));
    }

    #[tokio::test]
    async fn test_bulk_update_rejects_id_assignment_without_partial_write() {
        let store = sample_store();
        let result = store
            .bulk_update(
                &[
                    Assignment::shift(Field::Left, 100),
                    Assignment::set(Field::Id, "zzz"),
                ],
                &Predicate::all(),
            )
            .await;
        assert!(result.is_err());
        let min = store
            .aggregate(Aggregate::Min, Field::Left, &Predicate::all())
            .await
            .unwrap();
        assert_eq!(min, Some(1));
    }

    #[tokio::test]
    async fn test_bulk_delete_by_range() {
        let store = sample_store();
        let removed = store
            .bulk_delete(
                &Predicate::all()
                    .eq(Field::property("owner"), "alice")
                    .between(Field::Left, 2, 5),
            )
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count(&Predicate::all()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_in_and_null_conditions() {
        let store = sample_store();
        let roots = store
            .count(&Predicate::all().is_null(Field::Parent))
            .await
            .unwrap();
        assert_eq!(roots, 2);
        let picked = store
            .count(&Predicate::all().is_in(Field::Id, vec![json!("a"), json!("x")]))
            .await
            .unwrap();
        assert_eq!(picked, 2);
    }
}
