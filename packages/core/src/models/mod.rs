//! Data Models
//!
//! - `TreeNode` - a persisted row with nested-set bounds
//! - `NewNode` - insert request (bounds are computed by the engine)
//! - `NodeChanges` - sparse update used by `TreeWriter::save`
//!
//! Entity fields live in the JSON `properties` object, so any relational entity
//! can be indexed without schema changes.

mod node;

pub use node::{Bounds, NewNode, NodeChanges, NodeId, TreeNode};
