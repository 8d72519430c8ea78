//! Tree engine error types
//!
//! Precondition violations are reported before any storage write happens.
//! Storage failures are wrapped as-is; because a mutation is several
//! statements, the caller's transaction boundary is what rolls them back.

use crate::models::NodeId;
use thiserror::Error;

/// Errors returned by tree operations
#[derive(Error, Debug)]
pub enum TreeError {
    /// Referenced node does not exist within the scope
    #[error("Node '{id}' does not exist")]
    NodeNotFound { id: NodeId },

    /// Insert with a caller-supplied id that is already taken
    #[error("Node '{id}' already exists")]
    NodeExists { id: NodeId },

    /// Reparenting a node under itself or one of its descendants
    #[error("Circular reference: node '{node_id}' cannot be moved under '{parent_id}'")]
    CircularReference { node_id: NodeId, parent_id: NodeId },

    /// `recover` found nodes whose parent does not exist and the policy is to fail
    #[error("Cannot find the parent for nodes: {}", ids.join(", "))]
    MissingParents { ids: Vec<NodeId> },

    /// Parent pointers form a cycle, so no bounds can be assigned
    #[error("Parent pointers form a cycle through nodes: {}", ids.join(", "))]
    ParentCycle { ids: Vec<NodeId> },

    /// Configuration rejected by `TreeConfig::validate`
    #[error("Invalid tree configuration: {0}")]
    InvalidConfig(String),

    /// Storage layer failure
    #[error("Storage operation failed: {0}")]
    Store(#[from] anyhow::Error),
}

impl TreeError {
    /// Create a NodeNotFound error
    pub fn node_not_found(id: impl Into<NodeId>) -> Self {
        Self::NodeNotFound { id: id.into() }
    }

    pub fn node_exists(id: impl Into<NodeId>) -> Self {
        Self::NodeExists { id: id.into() }
    }

    /// Create a CircularReference error
    pub fn circular_reference(node_id: impl Into<NodeId>, parent_id: impl Into<NodeId>) -> Self {
        Self::CircularReference {
            node_id: node_id.into(),
            parent_id: parent_id.into(),
        }
    }

    pub fn missing_parents(ids: Vec<NodeId>) -> Self {
        Self::MissingParents { ids }
    }

    pub fn parent_cycle(ids: Vec<NodeId>) -> Self {
        Self::ParentCycle { ids }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
