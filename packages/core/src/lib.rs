//! Nested-set tree index
//!
//! This crate maintains a hierarchy stored in a flat table using the nested
//! set model: every node carries a parent pointer plus a `lft`/`rght`
//! interval that strictly contains the intervals of its descendants. Subtree,
//! ancestor-path and descendant-count reads become single range queries,
//! while writes renumber bounds with a handful of bulk shifts.
//!
//! # Architecture
//!
//! - **Storage-agnostic engine**: the tree logic only talks to the
//!   [`db::TreeStore`] trait (predicate reads, aggregates, bulk updates)
//! - **Scoped forests**: a [`Scope`] predicate splits one table into
//!   independent trees; bound arithmetic never crosses scopes
//! - **Serialized writers**: structural mutations run through a
//!   [`TreeWriter`] holding the scope's mutation lock
//! - **libsql**: embedded SQLite-compatible backend behind the default
//!   `libsql` feature, plus an in-memory store
//!
//! # Modules
//!
//! - [`models`] - Node rows and insert/update payloads
//! - [`config`] - Column mapping, scope and read-side hints
//! - [`db`] - Storage trait, predicates and backends
//! - [`tree`] - The engine: reads, mutations, verify, recover, reorder

pub mod config;
pub mod db;
pub mod models;
pub mod tree;

// Re-export commonly used types
pub use config::{Scope, TreeConfig};
pub use models::*;
pub use tree::{
    BoundRange, ChildrenOptions, DeleteSnapshot, IssueKind, ListOptions, MissingParentAction,
    MoveCount, NestedSet, RecoverMode, RecoverReport, RemovalOutcome, ReorderOptions, ScopeLocks,
    SyncTarget, TreeError, TreeIssue, TreeListItem, TreeWriter,
};
