//! Storage Layer
//!
//! The tree engine talks to storage only through the [`TreeStore`] trait:
//!
//! - [`predicate`] - backend-neutral predicates, ordering and bulk assignments
//! - [`MemoryTreeStore`] - in-memory rows, predicates evaluated in Rust
//! - [`LibsqlTreeStore`] - libsql/SQLite table, predicates rendered to SQL
//!   (enabled by the default `libsql` feature)

mod error;
#[cfg(feature = "libsql")]
mod libsql_store;
mod memory_store;
pub mod predicate;
mod tree_store;

pub use error::{is_valid_identifier, DatabaseError};
#[cfg(feature = "libsql")]
pub use libsql_store::LibsqlTreeStore;
pub use memory_store::MemoryTreeStore;
pub use predicate::{
    Aggregate, AssignValue, Assignment, CompareOp, Condition, Field, FindQuery, Operand, OrderBy,
    Predicate, SortDirection,
};
pub use tree_store::TreeStore;
