//! Leaf lineage
//!
//! Records every compiled leaf and its `then` links in a DAG so that chain
//! structure can be checked (no cycles, no shared children) and queried
//! without walking the task trees.

use crate::task::types::LeafId;
use daggy::{Dag, NodeIndex, Walker};
use std::collections::{HashMap, VecDeque};

/// Error types for lineage operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineageError {
    /// Leaf was never registered
    LeafNotFound(LeafId),
    /// Linking would close a loop
    CycleDetected { parent: LeafId, child: LeafId },
    /// Child already belongs to another chain
    SharedChild { child: LeafId, existing_parent: LeafId },
}

impl std::fmt::Display for LineageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineageError::LeafNotFound(id) => write!(f, "Leaf {:?} not found", id),
            LineageError::CycleDetected { parent, child } => write!(
                f,
                "Linking {:?} -> {:?} would create a cycle",
                parent, child
            ),
            LineageError::SharedChild {
                child,
                existing_parent,
            } => write!(
                f,
                "Leaf {:?} is already chained after {:?}",
                child, existing_parent
            ),
        }
    }
}

impl std::error::Error for LineageError {}

/// DAG of leaves connected by `then` links.
#[derive(Debug)]
pub struct Lineage {
    dag: Dag<LeafId, ()>,
    leaf_to_index: HashMap<LeafId, NodeIndex>,
}

impl Default for Lineage {
    fn default() -> Self {
        Self::new()
    }
}

impl Lineage {
    pub fn new() -> Self {
        Lineage {
            dag: Dag::new(),
            leaf_to_index: HashMap::new(),
        }
    }

    /// Registers a leaf. Registering the same leaf twice is a no-op.
    pub fn add_leaf(&mut self, leaf: LeafId) {
        if !self.leaf_to_index.contains_key(&leaf) {
            let index = self.dag.add_node(leaf);
            self.leaf_to_index.insert(leaf, index);
        }
    }

    fn index_of(&self, leaf: LeafId) -> Result<NodeIndex, LineageError> {
        self.leaf_to_index
            .get(&leaf)
            .copied()
            .ok_or(LineageError::LeafNotFound(leaf))
    }

    /// Chains `child` after `parent`.
    ///
    /// # Errors
    /// Fails if either leaf is unknown, if the child already has a parent, or
    /// if the link would create a cycle.
    pub fn link(&mut self, parent: LeafId, child: LeafId) -> Result<(), LineageError> {
        let parent_index = self.index_of(parent)?;
        let child_index = self.index_of(child)?;

        if let Some(existing_parent) = self.parent(child) {
            return Err(LineageError::SharedChild {
                child,
                existing_parent,
            });
        }

        self.dag
            .add_edge(parent_index, child_index, ())
            .map(|_| ())
            .map_err(|_would_cycle| LineageError::CycleDetected { parent, child })
    }

    pub fn leaf_count(&self) -> usize {
        self.dag.node_count()
    }

    pub fn link_count(&self) -> usize {
        self.dag.edge_count()
    }

    /// Leaf this one is chained after.
    pub fn parent(&self, leaf: LeafId) -> Option<LeafId> {
        let index = self.leaf_to_index.get(&leaf)?;
        self.dag
            .parents(*index)
            .iter(&self.dag)
            .next()
            .and_then(|(_, parent)| self.dag.node_weight(parent).copied())
    }

    /// Leaves chained directly after this one.
    pub fn children(&self, leaf: LeafId) -> Vec<LeafId> {
        match self.leaf_to_index.get(&leaf) {
            Some(index) => self
                .dag
                .children(*index)
                .iter(&self.dag)
                .filter_map(|(_, child)| self.dag.node_weight(child).copied())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Number of ancestors of a leaf (0 for chain heads).
    pub fn depth(&self, leaf: LeafId) -> usize {
        let mut depth = 0;
        let mut current = leaf;
        while let Some(parent) = self.parent(current) {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// Longest chain, counted in leaves. Walks down from the chain heads, so
    /// every leaf is visited once.
    pub fn max_chain_len(&self) -> usize {
        let mut stack: Vec<(NodeIndex, usize)> = self
            .leaf_to_index
            .values()
            .filter(|index| self.dag.parents(**index).iter(&self.dag).next().is_none())
            .map(|index| (*index, 1))
            .collect();

        let mut longest = 0;
        while let Some((index, len)) = stack.pop() {
            longest = longest.max(len);
            stack.extend(
                self.dag
                    .children(index)
                    .iter(&self.dag)
                    .map(|(_, child)| (child, len + 1)),
            );
        }
        longest
    }

    /// Leaves in an order where every parent precedes its children; ties are
    /// broken by leaf id.
    pub fn dispatch_order(&self) -> Vec<LeafId> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .leaf_to_index
            .values()
            .map(|index| (*index, 0))
            .collect();
        for edge in self.dag.raw_edges() {
            *in_degree.entry(edge.target()).or_insert(0) += 1;
        }

        let mut roots: Vec<NodeIndex> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(index, _)| *index)
            .collect();
        roots.sort_by_key(|index| self.dag.node_weight(*index).copied());

        let mut queue: VecDeque<NodeIndex> = roots.into_iter().collect();
        let mut order = Vec::with_capacity(self.dag.node_count());
        while let Some(index) = queue.pop_front() {
            if let Some(leaf) = self.dag.node_weight(index) {
                order.push(*leaf);
            }
            let mut children: Vec<NodeIndex> = self
                .dag
                .children(index)
                .iter(&self.dag)
                .map(|(_, child)| child)
                .collect();
            children.sort_by_key(|child| self.dag.node_weight(*child).copied());
            for child in children {
                if let Some(degree) = in_degree.get_mut(&child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lineage_with(leaves: &[usize]) -> Lineage {
        let mut lineage = Lineage::new();
        for leaf in leaves {
            lineage.add_leaf(LeafId(*leaf));
        }
        lineage
    }

    #[test]
    fn links_build_parent_and_child_queries() {
        let mut lineage = lineage_with(&[0, 1, 2]);
        lineage.link(LeafId(0), LeafId(1)).unwrap();
        lineage.link(LeafId(1), LeafId(2)).unwrap();

        assert_eq!(lineage.parent(LeafId(2)), Some(LeafId(1)));
        assert_eq!(lineage.parent(LeafId(0)), None);
        assert_eq!(lineage.children(LeafId(0)), vec![LeafId(1)]);
        assert_eq!(lineage.depth(LeafId(2)), 2);
        assert_eq!(lineage.max_chain_len(), 3);
        assert_eq!(lineage.link_count(), 2);
    }

    #[test]
    fn cycles_are_rejected() {
        let mut lineage = lineage_with(&[0, 1]);
        lineage.link(LeafId(0), LeafId(1)).unwrap();
        // Leaf 0 has no parent yet, so only the cycle check can stop this.
        let err = lineage.link(LeafId(1), LeafId(0)).unwrap_err();
        assert_eq!(
            err,
            LineageError::CycleDetected {
                parent: LeafId(1),
                child: LeafId(0)
            }
        );
    }

    #[test]
    fn self_links_are_cycles() {
        let mut lineage = lineage_with(&[0]);
        assert!(matches!(
            lineage.link(LeafId(0), LeafId(0)),
            Err(LineageError::CycleDetected { .. })
        ));
    }

    #[test]
    fn shared_children_are_rejected() {
        let mut lineage = lineage_with(&[0, 1, 2]);
        lineage.link(LeafId(0), LeafId(2)).unwrap();
        assert_eq!(
            lineage.link(LeafId(1), LeafId(2)).unwrap_err(),
            LineageError::SharedChild {
                child: LeafId(2),
                existing_parent: LeafId(0)
            }
        );
    }

    #[test]
    fn unknown_leaves_are_reported() {
        let mut lineage = lineage_with(&[0]);
        assert_eq!(
            lineage.link(LeafId(0), LeafId(7)).unwrap_err(),
            LineageError::LeafNotFound(LeafId(7))
        );
    }

    #[test]
    fn dispatch_order_puts_parents_first() {
        let mut lineage = lineage_with(&[0, 1, 2, 3]);
        lineage.link(LeafId(2), LeafId(0)).unwrap();
        lineage.link(LeafId(0), LeafId(3)).unwrap();

        let order = lineage.dispatch_order();
        assert_eq!(order.len(), 4);
        let pos = |id: usize| order.iter().position(|l| *l == LeafId(id)).unwrap();
        assert!(pos(2) < pos(0));
        assert!(pos(0) < pos(3));
        assert_eq!(order[0], LeafId(1));
    }

    #[test]
    fn max_chain_len_follows_the_longest_branch() {
        let mut lineage = lineage_with(&[0, 1, 2, 3, 4, 5]);
        lineage.link(LeafId(0), LeafId(1)).unwrap();
        lineage.link(LeafId(0), LeafId(2)).unwrap();
        lineage.link(LeafId(2), LeafId(3)).unwrap();
        lineage.link(LeafId(3), LeafId(4)).unwrap();
        assert_eq!(lineage.max_chain_len(), 4);
    }

    #[test]
    fn max_chain_len_scales_to_long_chains() {
        let leaves: Vec<usize> = (0..50_000).collect();
        let mut lineage = lineage_with(&leaves);
        for pair in leaves.windows(2) {
            lineage.link(LeafId(pair[0]), LeafId(pair[1])).unwrap();
        }
        assert_eq!(lineage.max_chain_len(), 50_000);
        assert_eq!(lineage.depth(LeafId(49_999)), 49_999);
    }

    #[test]
    fn empty_lineage() {
        let lineage = Lineage::new();
        assert_eq!(lineage.max_chain_len(), 0);
        assert!(lineage.dispatch_order().is_empty());
    }
}
