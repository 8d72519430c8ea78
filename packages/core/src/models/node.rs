//! Tree node model
//!
//! A `TreeNode` is one row of the hierarchical entity: its identity, its parent
//! pointer, the nested-set bounds (`lft`/`rght`) and an optional depth, plus the
//! entity's own fields stored as a JSON object in `properties`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque primary key of a node
pub type NodeId = String;

/// Left/right pair of a node's nested-set interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i64,
    pub right: i64,
}

impl Bounds {
    pub fn new(left: i64, right: i64) -> Self {
        Self { left, right }
    }

    /// Number of integers covered by the interval (always even on a valid tree)
    pub fn width(&self) -> i64 {
        self.right - self.left + 1
    }

    /// True when `other` lies strictly inside this interval
    pub fn contains(&self, other: &Bounds) -> bool {
        self.left < other.left && other.right < self.right
    }
}

/// One persisted node of a tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Unique identifier (UUID v4 unless the caller supplied one)
    pub id: NodeId,

    /// Parent node ID, `None` for roots
    pub parent_id: Option<NodeId>,

    /// Left bound of the nested-set interval
    pub lft: i64,

    /// Right bound of the nested-set interval
    pub rght: i64,

    /// Depth below the top level (only maintained when a level field is configured)
    #[serde(default)]
    pub level: i64,

    /// Every other field of the entity (JSON object)
    #[serde(default = "empty_object")]
    pub properties: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl TreeNode {
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.lft, self.rght)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.rght == self.lft + 1
    }

    /// Descendant count derived from the bounds alone (no storage read)
    pub fn descendant_count(&self) -> u64 {
        ((self.rght - self.lft - 1) / 2).max(0) as u64
    }

    /// Read a property value, `None` when absent
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Human readable label: the given property rendered as text, or the id
    pub fn label(&self, field: &str) -> String {
        match self.property(field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => self.id.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// A node that has not been inserted yet
///
/// Bounds are never supplied by callers; the engine computes them on insert.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewNode {
    /// Explicit id, or `None` to let storage assign one
    pub id: Option<NodeId>,

    /// Parent to insert under, `None` for a new root
    pub parent_id: Option<NodeId>,

    /// Entity fields (JSON object)
    #[serde(default = "empty_object")]
    pub properties: Value,
}

impl NewNode {
    /// New top-level node
    pub fn root(properties: Value) -> Self {
        Self {
            id: None,
            parent_id: None,
            properties,
        }
    }

    /// New node inserted as the last child of `parent_id`
    pub fn child_of(parent_id: impl Into<NodeId>, properties: Value) -> Self {
        Self {
            id: None,
            parent_id: Some(parent_id.into()),
            properties,
        }
    }

    /// Use a caller-chosen id instead of a generated one
    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Sparse update for `TreeWriter::save`
///
/// `parent_id: Some(None)` detaches the node to the top level,
/// `parent_id: None` leaves the parent untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeChanges {
    pub parent_id: Option<Option<NodeId>>,
    pub properties: Option<Value>,
}
