//! Persistent syntax trees.
//!
//! A [`Subtree`] is an immutable, atomically refcounted node storing
//! lengths rather than positions, so edits are O(depth) path copies and
//! incremental parses share everything outside the edited region. A
//! [`Tree`] pairs a root subtree with its grammar and exposes the
//! [`Node`] view (hidden symbols flattened away), the [`TreeCursor`]
//! walker, and changed-range diffing between snapshots.

mod changed_ranges;
mod cursor;
mod node;
mod subtree;
mod tree;

pub use cursor::{NoMove, TreeCursor};
pub use node::{Children, Node};
pub use subtree::{COST_PER_MISSING_TREE, COST_PER_SKIPPED_TREE, Subtree, SubtreeFlags};
pub use tree::Tree;
