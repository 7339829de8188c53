//! Task compilation
//!
//! Turns a JSON configuration into an immutable [`TaskGraph`]: one
//! [`TopLevelTask`] per configured entry, each holding a single leaf (possibly
//! heading a `then` chain) or a group of sibling leaves.

pub mod compiler;
pub mod lineage;
pub mod types;

pub use compiler::{build_from_config, TaskCompiler};
pub use lineage::{Lineage, LineageError};
pub use types::{ChainIter, Leaf, LeafId, MergeKey, TaskGraph, TaskNode, TopLevelTask};
