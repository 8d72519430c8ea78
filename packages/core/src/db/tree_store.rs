//! TreeStore Trait - Storage Abstraction Layer
//!
//! The nested-set engine owns no storage. Everything it reads or writes goes
//! through this trait, which is the minimum capability set a relational
//! backend needs to offer:
//!
//! - row lookup (`find_one`, `find_all`) and `count`
//! - `aggregate` (min/max of a numeric column)
//! - `bulk_update` and `bulk_delete` by predicate
//! - `insert` of a new row with engine-computed bounds
//!
//! Every call is a single round-trip. The trait offers no transactions: the
//! engine serializes its own mutations per scope (see `TreeWriter`) and expects
//! cross-process callers to supply their own transaction boundary.
//!
//! # Examples
//!
//! ```rust,no_run
//! use nestedset_core::db::{Field, FindQuery, MemoryTreeStore, Predicate, TreeStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store: Arc<dyn TreeStore> = Arc::new(MemoryTreeStore::new());
//!     let roots = store
//!         .find_all(&FindQuery::new(Predicate::all().is_null(Field::Parent)))
//!         .await?;
//!     assert!(roots.is_empty());
//!     Ok(())
//! }
//! ```

use crate::db::predicate::{Aggregate, Assignment, Field, FindQuery, Predicate};
use crate::models::{Bounds, NewNode, TreeNode};
use anyhow::Result;
use async_trait::async_trait;

/// Abstraction over the relational storage holding tree rows
///
/// Implementations must be `Send + Sync` so a store can be shared behind an
/// `Arc` across tasks.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Insert a new row with the given bounds and depth
    ///
    /// When `node.id` is `None` the store assigns an id. Returns the stored row.
    async fn insert(&self, node: &NewNode, bounds: Bounds, level: i64) -> Result<TreeNode>;

    /// First row matching the query (respecting its order), if any
    async fn find_one(&self, query: &FindQuery) -> Result<Option<TreeNode>> {
        let mut limited = query.clone();
        limited.limit = Some(1);
        Ok(self.find_all(&limited).await?.into_iter().next())
    }

    /// All rows matching the query, ordered and paginated as requested
    async fn find_all(&self, query: &FindQuery) -> Result<Vec<TreeNode>>;

    /// Number of rows matching the predicate
    async fn count(&self, predicate: &Predicate) -> Result<u64>;

    /// Minimum or maximum of a numeric field, `None` when no row matches
    async fn aggregate(
        &self,
        function: Aggregate,
        field: Field,
        predicate: &Predicate,
    ) -> Result<Option<i64>>;

    /// Apply all assignments to every row matching the predicate
    ///
    /// The predicate is evaluated against the values before the update, as a
    /// single SQL `UPDATE ... WHERE` would. Returns the number of affected rows.
    async fn bulk_update(&self, assignments: &[Assignment], predicate: &Predicate) -> Result<u64>;

    /// Delete every row matching the predicate, returning the number removed
    async fn bulk_delete(&self, predicate: &Predicate) -> Result<u64>;
}
