//! Nested-set tree engine
//!
//! [`NestedSet`] binds a [`TreeStore`] to a [`TreeConfig`] and exposes the
//! read side of the tree (paths, children, counts, flattened lists and the
//! `verify` diagnostic). Structural mutations live on [`TreeWriter`], which
//! can only be obtained through [`NestedSet::writer`] and holds the scope's
//! mutation lock while it exists.
//!
//! # Bound arithmetic
//!
//! Every node's `lft`/`rght` interval nests inside its ancestors' intervals
//! and the bounds of a scope with N nodes are exactly `1..=2N`. Mutations
//! read a snapshot of the bounds they need, then issue one to three
//! `sync` shifts (bulk `col = col + delta` updates restricted to a bound
//! range and the scope). No other path moves the bounds of existing rows.
//!
//! # Examples
//!
//! ```rust,no_run
//! use nestedset_core::db::MemoryTreeStore;
//! use nestedset_core::{ChildrenOptions, NestedSet, NewNode, TreeConfig};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let tree = NestedSet::new(Arc::new(MemoryTreeStore::new()), TreeConfig::default())?;
//!
//!     let writer = tree.writer().await;
//!     let root = writer.create(NewNode::root(json!({"name": "Root"}))).await?;
//!     writer.create(NewNode::child_of(&root.id, json!({"name": "A"}))).await?;
//!     drop(writer);
//!
//!     let children = tree.children(Some(root.id.as_str()), &ChildrenOptions::direct()).await?;
//!     assert_eq!(children.len(), 1);
//!     Ok(())
//! }
//! ```

mod error;
mod lock;
mod reads;
mod recover;
mod reorder;
mod sync;
mod verify;
mod writer;

pub use error::TreeError;
pub use lock::ScopeLocks;
pub use reads::{ChildrenOptions, ListOptions, TreeListItem};
pub use recover::{MissingParentAction, RecoverMode, RecoverReport};
pub use reorder::ReorderOptions;
pub use sync::{BoundRange, SyncTarget};
pub use verify::{IssueKind, TreeIssue};
pub use writer::{DeleteSnapshot, MoveCount, RemovalOutcome, TreeWriter};

use crate::config::{Scope, TreeConfig};
use crate::db::{Field, FindQuery, Predicate, TreeStore};
use crate::models::TreeNode;
use std::sync::Arc;

/// Tree index over one scope of a `TreeStore`
#[derive(Clone)]
pub struct NestedSet {
    store: Arc<dyn TreeStore>,
    config: Arc<TreeConfig>,
    locks: Arc<ScopeLocks>,
}

impl std::fmt::Debug for NestedSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NestedSet")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl NestedSet {
    /// Create an engine with its own lock registry
    ///
    /// # Errors
    ///
    /// Returns `TreeError::InvalidConfig` when `config.validate()` fails.
    pub fn new(store: Arc<dyn TreeStore>, config: TreeConfig) -> Result<Self, TreeError> {
        config.validate().map_err(TreeError::invalid_config)?;
        Ok(Self {
            store,
            config: Arc::new(config),
            locks: Arc::new(ScopeLocks::new()),
        })
    }

    /// Share a lock registry with other handles writing to the same storage
    pub fn with_locks(mut self, locks: Arc<ScopeLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Handle on another scope of the same storage, sharing the lock registry
    pub fn scoped(&self, scope: Scope) -> Self {
        Self {
            store: self.store.clone(),
            config: Arc::new(self.config.as_ref().clone().with_scope(scope)),
            locks: self.locks.clone(),
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TreeStore> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<ScopeLocks> {
        &self.locks
    }

    /// Acquire this scope's mutation lock
    ///
    /// Every structural mutation goes through the returned writer. Hold it
    /// across a sequence of mutations that must not interleave with others.
    ///
    /// The lock is not reentrant. A `TreeWriter` derefs to `NestedSet` for
    /// reads, so `writer.writer().await` compiles but never completes; use
    /// [`Self::try_writer`] where the lock may already be held.
    pub async fn writer(&self) -> TreeWriter<'_> {
        let guard = self.locks.acquire(&self.config.scope.key()).await;
        TreeWriter::new(self, guard)
    }

    /// Like [`Self::writer`], but `None` when the scope's lock is taken
    pub fn try_writer(&self) -> Option<TreeWriter<'_>> {
        let guard = self.locks.try_acquire(&self.config.scope.key())?;
        Some(TreeWriter::new(self, guard))
    }

    /// Scope predicate every query starts from
    pub(crate) fn scope_predicate(&self) -> Predicate {
        self.config.scope.predicate().clone()
    }

    /// Node by id within the scope
    pub async fn get_node(&self, id: &str) -> Result<Option<TreeNode>, TreeError> {
        let query = FindQuery::new(self.scope_predicate().eq(Field::Id, id));
        Ok(self.store.find_one(&query).await?)
    }

    pub(crate) async fn require_node(&self, id: &str) -> Result<TreeNode, TreeError> {
        self.get_node(id)
            .await?
            .ok_or_else(|| TreeError::node_not_found(id))
    }
}
