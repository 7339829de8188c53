//! Result merging
//!
//! Folds the per-leaf results of one top-level task into the caller-visible
//! [`MergedResponse`].

use crate::error::EngineError;
use crate::result::{AnalysisResponse, AnalysisResult, MergedResponse};
use crate::task::{Leaf, TaskNode};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Result of one executed leaf, tagged with where it merges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafOutput {
    pub merge_key: String,
    pub position: String,
    pub result: AnalysisResult,
}

impl LeafOutput {
    pub fn new(leaf: &Leaf, result: AnalysisResult) -> Self {
        LeafOutput {
            merge_key: leaf.merge_key.as_str().to_string(),
            position: leaf.position.clone(),
            result,
        }
    }
}

/// Results of one chain, head first.
pub type ChainOutput = Vec<LeafOutput>;

/// Merges the chain outputs of `node` into one response.
///
/// A lone leaf keeps its own shape, with any chained descendants placed in the
/// envelope's `chained` map. A group becomes a map from merge key to response,
/// with chained descendants flattened into the same map.
///
/// # Errors
/// `EngineError::MergeKeyCollision` when two results claim the same key in one
/// scope.
pub fn merge(outputs: Vec<ChainOutput>, node: &TaskNode) -> Result<MergedResponse, EngineError> {
    match node {
        TaskNode::Leaf(leaf) => {
            let mut chain = outputs.into_iter().flatten();
            let head = chain.next().ok_or_else(|| {
                EngineError::Aborted(format!("no result produced for {}", leaf.position))
            })?;

            let mut response = AnalysisResponse::from(head.result);
            insert_unique(&mut response.chained, chain)?;
            Ok(MergedResponse::Single(response))
        }
        TaskNode::Group(_) => {
            let mut keyed = BTreeMap::new();
            insert_unique(&mut keyed, outputs.into_iter().flatten())?;
            Ok(MergedResponse::Keyed(keyed))
        }
    }
}

fn insert_unique(
    scope: &mut BTreeMap<String, AnalysisResponse>,
    outputs: impl IntoIterator<Item = LeafOutput>,
) -> Result<(), EngineError> {
    for output in outputs {
        match scope.entry(output.merge_key) {
            Entry::Occupied(entry) => {
                return Err(EngineError::MergeKeyCollision {
                    key: entry.key().clone(),
                    position: output.position,
                })
            }
            Entry::Vacant(entry) => {
                entry.insert(AnalysisResponse::from(output.result));
            }
        }
    }
    Ok(())
}
