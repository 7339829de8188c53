use crate::analysis::{AnalysisSpec, AnalysisType};
use crate::task::lineage::Lineage;
use serde::Serialize;
use std::sync::Arc;

/// Leaf identifier, unique within one task graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LeafId(pub usize);

/// Key under which a leaf's result is merged into its scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "source", content = "key", rename_all = "lowercase")]
pub enum MergeKey {
    /// Caller-supplied `name`
    Name(String),
    /// Literal `filter` text
    Filter(String),
    /// Position label, used when neither name nor filter is present
    Position(String),
}

impl MergeKey {
    /// Resolves the key for a spec: name, else filter, else position.
    pub fn resolve(spec: &AnalysisSpec, position: &str) -> Self {
        match (&spec.name, &spec.filter) {
            (Some(name), _) => MergeKey::Name(name.clone()),
            (None, Some(filter)) => MergeKey::Filter(filter.clone()),
            (None, None) => MergeKey::Position(position.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MergeKey::Name(key) | MergeKey::Filter(key) | MergeKey::Position(key) => key,
        }
    }
}

impl std::fmt::Display for MergeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One leaf analysis, optionally followed by a chained child (`then`).
///
/// Chains may be arbitrarily long, so `Clone`, `PartialEq`, `Debug` and `Drop`
/// all walk `next` with loops.
pub struct Leaf {
    pub id: LeafId,
    /// Location in the configuration, e.g. `freqDist[0].then`
    pub position: String,
    pub spec: AnalysisSpec,
    pub merge_key: MergeKey,
    pub next: Option<Box<Leaf>>,
}

impl Leaf {
    /// Builds a leaf, resolving its merge key from `spec` and `position`.
    pub fn new(id: LeafId, position: String, spec: AnalysisSpec, next: Option<Box<Leaf>>) -> Self {
        let merge_key = MergeKey::resolve(&spec, &position);
        Leaf {
            id,
            position,
            spec,
            merge_key,
            next,
        }
    }

    fn fields(&self) -> (LeafId, &str, &AnalysisSpec, &MergeKey) {
        (self.id, &self.position, &self.spec, &self.merge_key)
    }

    /// Copy of this leaf's own fields, followed by `next`.
    fn relinked(&self, next: Option<Box<Leaf>>) -> Leaf {
        Leaf {
            id: self.id,
            position: self.position.clone(),
            spec: self.spec.clone(),
            merge_key: self.merge_key.clone(),
            next,
        }
    }

    /// This leaf followed by every chained descendant, in dispatch order.
    pub fn chain(&self) -> ChainIter<'_> {
        ChainIter { next: Some(self) }
    }

    /// Number of leaves in the chain headed by this leaf.
    pub fn chain_len(&self) -> usize {
        self.chain().count()
    }
}

impl Clone for Leaf {
    fn clone(&self) -> Self {
        let descendants: Vec<&Leaf> = self.chain().skip(1).collect();
        let mut next = None;
        for leaf in descendants.into_iter().rev() {
            next = Some(Box::new(leaf.relinked(next)));
        }
        self.relinked(next)
    }
}

impl PartialEq for Leaf {
    fn eq(&self, other: &Self) -> bool {
        self.chain().map(Leaf::fields).eq(other.chain().map(Leaf::fields))
    }
}

impl Eq for Leaf {}

impl std::fmt::Debug for Leaf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Leaf")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("spec", &self.spec)
            .field("merge_key", &self.merge_key)
            .field("next", &self.next.as_ref().map(|leaf| leaf.id))
            .finish()
    }
}

// Unlinks the chain one leaf at a time instead of recursing through `next`.
impl Drop for Leaf {
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(mut leaf) = next {
            next = leaf.next.take();
        }
    }
}

/// Iterator over a chain, head first.
pub struct ChainIter<'a> {
    next: Option<&'a Leaf>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = &'a Leaf;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.next.as_deref();
        Some(current)
    }
}

/// Compiled unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskNode {
    /// A single leaf, possibly heading a chain
    Leaf(Leaf),
    /// Independent siblings merged into one keyed response
    Group(Vec<Leaf>),
}

impl TaskNode {
    /// Chain heads of this node in configuration order.
    pub fn heads(&self) -> &[Leaf] {
        match self {
            TaskNode::Leaf(leaf) => std::slice::from_ref(leaf),
            TaskNode::Group(members) => members,
        }
    }

    /// Total number of leaves including chained descendants.
    pub fn leaf_count(&self) -> usize {
        self.heads().iter().map(Leaf::chain_len).sum()
    }

    pub fn is_group(&self) -> bool {
        matches!(self, TaskNode::Group(_))
    }
}

/// One entry of the task graph; the engine reports exactly once per entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopLevelTask {
    pub analysis_type: AnalysisType,
    /// Index within the analysis type's sequence
    pub index: usize,
    /// Location in the configuration, e.g. `timeSeries[0]`
    pub position: String,
    pub node: Arc<TaskNode>,
}

/// Compiled configuration: per analysis type, an ordered sequence of task
/// nodes, plus the lineage of every leaf. Immutable once built.
#[derive(Debug)]
pub struct TaskGraph {
    tasks: Vec<TopLevelTask>,
    lineage: Lineage,
}

impl TaskGraph {
    pub(crate) fn new(tasks: Vec<TopLevelTask>, lineage: Lineage) -> Self {
        TaskGraph { tasks, lineage }
    }

    /// All top-level tasks, grouped by analysis type.
    pub fn tasks(&self) -> &[TopLevelTask] {
        &self.tasks
    }

    /// Ordered task sequence for one analysis type.
    pub fn tasks_for(&self, analysis: AnalysisType) -> impl Iterator<Item = &TopLevelTask> {
        self.tasks
            .iter()
            .filter(move |task| task.analysis_type == analysis)
    }

    /// Analysis types present, in graph order.
    pub fn analysis_types(&self) -> Vec<AnalysisType> {
        let mut types: Vec<AnalysisType> = Vec::new();
        for task in &self.tasks {
            if !types.contains(&task.analysis_type) {
                types.push(task.analysis_type);
            }
        }
        types
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Total number of leaves across all tasks.
    pub fn leaf_count(&self) -> usize {
        self.lineage.leaf_count()
    }

    /// Parent/child links between leaves.
    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }
}

impl PartialEq for TaskGraph {
    fn eq(&self, other: &Self) -> bool {
        // Lineage is derived from the task trees.
        self.tasks == other.tasks
    }
}

impl Eq for TaskGraph {}
