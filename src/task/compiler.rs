use crate::analysis::{AnalysisSpec, AnalysisType};
use crate::error::ValidationError;
use crate::registry::{AnalysisDefinition, AnalysisRegistry};
use crate::task::lineage::Lineage;
use crate::task::types::{Leaf, LeafId, TaskGraph, TaskNode, TopLevelTask};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Fields every spec may carry regardless of analysis type.
const COMMON_FIELDS: [&str; 3] = ["name", "filter", "then"];

/// Compiles a JSON configuration into a [`TaskGraph`].
///
/// Compilation is pure: nothing is dispatched and the registry is only read.
#[derive(Debug, Clone)]
pub struct TaskCompiler {
    registry: Arc<AnalysisRegistry>,
}

impl Default for TaskCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskCompiler {
    /// Creates a compiler backed by the built-in analysis definitions.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(AnalysisRegistry::new()))
    }

    pub fn with_registry(registry: Arc<AnalysisRegistry>) -> Self {
        TaskCompiler { registry }
    }

    pub fn registry(&self) -> &AnalysisRegistry {
        &self.registry
    }

    /// Validates `config` and builds the task graph.
    ///
    /// # Errors
    /// Returns the first `ValidationError` found; no partial graph is produced.
    pub fn compile(&self, config: &Value) -> Result<TaskGraph, ValidationError> {
        let entries = config
            .as_object()
            .ok_or_else(|| ValidationError::NotAnObject {
                position: "<root>".to_string(),
            })?;
        if entries.is_empty() {
            return Err(ValidationError::EmptyConfig);
        }

        let mut state = CompileState::default();
        let mut tasks = Vec::new();

        for (key, value) in entries {
            let analysis = AnalysisType::from_config_key(key)
                .ok_or_else(|| ValidationError::UnknownAnalysisType { key: key.clone() })?;
            let definition = self
                .registry
                .definition(analysis)
                .ok_or_else(|| ValidationError::UnknownAnalysisType { key: key.clone() })?;

            let items: Vec<&Value> = match value {
                Value::Array(items) if items.is_empty() => {
                    return Err(ValidationError::EmptyGroup {
                        position: key.clone(),
                    })
                }
                Value::Array(items) => items.iter().collect(),
                single => vec![single],
            };

            for (index, item) in items.into_iter().enumerate() {
                let position = format!("{}[{}]", key, index);
                let node = match item {
                    Value::Array(members) => {
                        self.compile_group(definition, members, &position, &mut state)?
                    }
                    _ => TaskNode::Leaf(self.compile_leaf(definition, item, position.clone(), &mut state)?),
                };
                trace!(
                    position = %position,
                    leaves = node.leaf_count(),
                    "TaskCompiler: compiled entry"
                );
                tasks.push(TopLevelTask {
                    analysis_type: analysis,
                    index,
                    position,
                    node: Arc::new(node),
                });
            }
        }

        debug!(
            tasks = tasks.len(),
            leaves = state.lineage.leaf_count(),
            "TaskCompiler: configuration compiled"
        );
        Ok(TaskGraph::new(tasks, state.lineage))
    }

    fn compile_group(
        &self,
        definition: &dyn AnalysisDefinition,
        members: &[Value],
        position: &str,
        state: &mut CompileState,
    ) -> Result<TaskNode, ValidationError> {
        if members.is_empty() {
            return Err(ValidationError::EmptyGroup {
                position: position.to_string(),
            });
        }

        let mut leaves = Vec::with_capacity(members.len());
        for (slot, member) in members.iter().enumerate() {
            let member_position = format!("{}[{}]", position, slot);
            if member.is_array() {
                return Err(ValidationError::NestedGroup {
                    position: member_position,
                });
            }
            leaves.push(self.compile_leaf(definition, member, member_position, state)?);
        }
        Ok(TaskNode::Group(leaves))
    }

    /// Compiles the spec at `value` and every spec reachable through its
    /// `then` links. Chains are walked with a loop, so any depth compiles.
    fn compile_leaf(
        &self,
        definition: &dyn AnalysisDefinition,
        value: &Value,
        position: String,
        state: &mut CompileState,
    ) -> Result<Leaf, ValidationError> {
        let (head_spec, mut then) = self.compile_spec(definition, value, &position)?;
        let head_id = state.allocate();

        let mut descendants: Vec<(LeafId, String, AnalysisSpec)> = Vec::new();
        let mut parent = head_id;
        while let Some(child) = then {
            let child_position = chain_position(&position, descendants.len() + 1);
            let (spec, grandchild) = self.compile_spec(definition, child, &child_position)?;
            let id = state.allocate();
            state
                .lineage
                .link(parent, id)
                .map_err(|_| ValidationError::Cycle {
                    position: child_position.clone(),
                })?;

            descendants.push((id, child_position, spec));
            parent = id;
            then = grandchild;
        }

        // Assemble tail first so each leaf can own its successor.
        let mut next = None;
        while let Some((id, child_position, spec)) = descendants.pop() {
            next = Some(Box::new(Leaf::new(id, child_position, spec, next)));
        }
        Ok(Leaf::new(head_id, position, head_spec, next))
    }

    /// Parses one spec object, returning it with its `then` child if any.
    fn compile_spec<'v>(
        &self,
        definition: &dyn AnalysisDefinition,
        value: &'v Value,
        position: &str,
    ) -> Result<(AnalysisSpec, Option<&'v Value>), ValidationError> {
        let spec_object = value.as_object().ok_or_else(|| ValidationError::NotAnObject {
            position: position.to_string(),
        })?;

        for field in spec_object.keys() {
            if !COMMON_FIELDS.contains(&field.as_str()) && !definition.accepts_field(field) {
                warn!(position = %position, field = %field, "TaskCompiler: ignoring unknown field");
            }
        }

        let parameters = definition.parse_parameters(spec_object, position)?;
        let mut spec = AnalysisSpec::new(parameters);
        spec.name = optional_text(spec_object, "name", position)?;
        spec.filter = optional_text(spec_object, "filter", position)?;

        let then = match spec_object.get("then") {
            None | Some(Value::Null) => None,
            Some(child) => Some(child),
        };
        Ok((spec, then))
    }
}

#[derive(Default)]
struct CompileState {
    next_leaf: usize,
    lineage: Lineage,
}

impl CompileState {
    /// Leaf ids are handed out in pre-order, so equal inputs get equal ids.
    fn allocate(&mut self) -> LeafId {
        let id = LeafId(self.next_leaf);
        self.next_leaf += 1;
        self.lineage.add_leaf(id);
        id
    }
}

/// Label of the leaf `depth` links below `head`: `x.then`, then `x.then[2]`,
/// `x.then[3]` and so on, so labels stay short in deep chains.
fn chain_position(head: &str, depth: usize) -> String {
    match depth {
        0 => head.to_string(),
        1 => format!("{}.then", head),
        n => format!("{}.then[{}]", head, n),
    }
}

fn optional_text(
    spec: &Map<String, Value>,
    field: &str,
    position: &str,
) -> Result<Option<String>, ValidationError> {
    match spec.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(Some(text.clone())),
        Some(_) => Err(ValidationError::InvalidField {
            position: position.to_string(),
            field: field.to_string(),
            expected: "a non-empty string".to_string(),
        }),
    }
}

/// Compiles a configuration with the built-in analysis definitions.
pub fn build_from_config(config: &Value) -> Result<TaskGraph, ValidationError> {
    TaskCompiler::new().compile(config)
}

impl TaskGraph {
    /// Parses and compiles a configuration given as JSON text.
    pub fn from_json_str(config: &str) -> Result<TaskGraph, ValidationError> {
        let value: Value = serde_json::from_str(config)?;
        build_from_config(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisParameters, Interval};
    use crate::task::types::MergeKey;
    use serde_json::json;

    /// `{"freqDist": {..., "then": {..., "then": ...}}}` with `len` leaves.
    fn chain_config(len: usize) -> Value {
        let mut spec = json!({"target": "fb.content", "threshold": 1});
        for _ in 1..len {
            // Built with `Map::insert`: `json!` would pass `spec` through
            // `serde_json::to_value`, which recurses once per level.
            let mut m = serde_json::Map::new();
            m.insert("target".into(), json!("fb.parent.author.gender"));
            m.insert("threshold".into(), json!(2));
            m.insert("then".into(), spec);
            spec = Value::Object(m);
        }
        let mut root = serde_json::Map::new();
        root.insert("freqDist".into(), spec);
        Value::Object(root)
    }

    fn only_leaf(graph: &TaskGraph) -> &Leaf {
        match graph.tasks()[0].node.as_ref() {
            TaskNode::Leaf(leaf) => leaf,
            TaskNode::Group(_) => panic!("expected a leaf"),
        }
    }

    #[test]
    fn single_spec_object_becomes_one_leaf() {
        let graph = build_from_config(&json!({
            "timeSeries": {"interval": "week", "span": 1}
        }))
        .unwrap();

        assert_eq!(graph.len(), 1);
        let task = &graph.tasks()[0];
        assert_eq!(task.analysis_type, AnalysisType::TimeSeries);
        assert_eq!(task.position, "timeSeries[0]");

        let leaf = only_leaf(&graph);
        assert_eq!(
            leaf.spec.parameters,
            AnalysisParameters::TimeSeries {
                interval: Interval::Week,
                span: 1
            }
        );
        assert_eq!(leaf.merge_key, MergeKey::Position("timeSeries[0]".to_string()));
        assert!(leaf.next.is_none());
    }

    #[test]
    fn array_elements_are_separate_entries_and_inner_arrays_are_groups() {
        let graph = build_from_config(&json!({
            "freqDist": [
                {"target": "fb.author.age", "threshold": 4},
                [
                    {"target": "fb.author.gender", "threshold": 2, "filter": "fb.content contains \"ford\""},
                    {"target": "fb.author.gender", "threshold": 2, "filter": "fb.content contains \"honda\""}
                ]
            ]
        }))
        .unwrap();

        assert_eq!(graph.len(), 2);
        assert!(!graph.tasks()[0].node.is_group());
        let group = graph.tasks()[1].node.heads();
        assert_eq!(group.len(), 2);
        assert_eq!(group[0].position, "freqDist[1][0]");
        assert_eq!(group[1].merge_key.as_str(), "fb.content contains \"honda\"");
        assert_eq!(graph.leaf_count(), 3);
    }

    #[test]
    fn then_builds_a_chain_with_lineage() {
        let graph = build_from_config(&json!({
            "freqDist": {
                "target": "fb.parent.author.gender",
                "threshold": 2,
                "then": {
                    "target": "fb.parent.author.age",
                    "threshold": 4,
                    "then": {"target": "fb.content", "threshold": 1}
                }
            }
        }))
        .unwrap();

        let head = only_leaf(&graph);
        let positions: Vec<_> = head.chain().map(|l| l.position.as_str()).collect();
        assert_eq!(
            positions,
            vec!["freqDist[0]", "freqDist[0].then", "freqDist[0].then[2]"]
        );
        let ids: Vec<_> = head.chain().map(|l| l.id).collect();
        assert_eq!(graph.lineage().parent(ids[2]), Some(ids[1]));
        assert_eq!(graph.lineage().max_chain_len(), 3);
        assert_eq!(graph.lineage().dispatch_order(), ids);
    }

    #[test]
    fn missing_field_names_field_and_position() {
        let err = build_from_config(&json!({
            "timeSeries": [[
                {"interval": "day", "span": 1},
                {"interval": "day"}
            ]]
        }))
        .unwrap_err();

        assert_eq!(
            err,
            ValidationError::MissingField {
                position: "timeSeries[0][1]".to_string(),
                field: "span".to_string()
            }
        );
        assert_eq!(err.to_string(), "Missing required field 'span' at timeSeries[0][1]");
    }

    #[test]
    fn chained_child_is_validated_with_parent_type() {
        let err = build_from_config(&json!({
            "freqDist": {
                "target": "fb.parent.author.gender",
                "threshold": 2,
                "then": {"interval": "day", "span": 1}
            }
        }))
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                position: "freqDist[0].then".to_string(),
                field: "target".to_string()
            }
        );
    }

    #[test]
    fn structural_errors() {
        assert_eq!(build_from_config(&json!({})).unwrap_err(), ValidationError::EmptyConfig);
        assert!(matches!(
            build_from_config(&json!([1, 2])).unwrap_err(),
            ValidationError::NotAnObject { .. }
        ));
        assert_eq!(
            build_from_config(&json!({"sentiment": {}})).unwrap_err(),
            ValidationError::UnknownAnalysisType {
                key: "sentiment".to_string()
            }
        );
        assert_eq!(
            build_from_config(&json!({"timeSeries": [[]]})).unwrap_err(),
            ValidationError::EmptyGroup {
                position: "timeSeries[0]".to_string()
            }
        );
        assert_eq!(
            build_from_config(&json!({"timeSeries": [[[{"interval": "day", "span": 1}]]]}))
                .unwrap_err(),
            ValidationError::NestedGroup {
                position: "timeSeries[0][0]".to_string()
            }
        );
        assert_eq!(
            build_from_config(&json!({"timeSeries": [42]})).unwrap_err(),
            ValidationError::NotAnObject {
                position: "timeSeries[0]".to_string()
            }
        );
    }

    #[test]
    fn name_and_filter_must_be_strings() {
        let err = build_from_config(&json!({
            "timeSeries": {"interval": "day", "span": 1, "name": 7}
        }))
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { ref field, .. } if field == "name"));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let graph = build_from_config(&json!({
            "timeSeries": {"interval": "day", "span": 1, "colour": "blue"}
        }))
        .unwrap();
        assert_eq!(graph.leaf_count(), 1);
    }

    #[test]
    fn compiling_twice_gives_equal_graphs() {
        let config = json!({
            "freqDist": [[
                {"name": "a", "target": "fb.author.age", "threshold": 3,
                 "then": {"target": "fb.author.gender", "threshold": 2}},
                {"name": "b", "target": "fb.author.age", "threshold": 3}
            ]],
            "timeSeries": {"interval": "hour", "span": 6}
        });
        assert_eq!(
            build_from_config(&config).unwrap(),
            build_from_config(&config).unwrap()
        );
    }

    #[test]
    fn from_json_str_reports_syntax_errors() {
        assert!(matches!(
            TaskGraph::from_json_str("{\"timeSeries\": ").unwrap_err(),
            ValidationError::InvalidJson(_)
        ));
        let graph = TaskGraph::from_json_str(r#"{"timeSeries": {"interval": "day", "span": 2}}"#)
            .unwrap();
        assert_eq!(graph.analysis_types(), vec![AnalysisType::TimeSeries]);
    }

    #[test]
    fn very_deep_chains_compile() {
        let config = chain_config(20_000);
        let graph = build_from_config(&config).unwrap();

        assert_eq!(graph.leaf_count(), 20_000);
        assert_eq!(graph.lineage().max_chain_len(), 20_000);
        let head = only_leaf(&graph);
        let tail = head.chain().last().unwrap();
        assert_eq!(tail.position, "freqDist[0].then[19999]");
        assert_eq!(graph.lineage().depth(tail.id), 19_999);

        assert_eq!(build_from_config(&config).unwrap(), graph);
        // serde_json drops nested values recursively.
        std::mem::forget(config);
    }

    #[test]
    fn chain_position_labels() {
        assert_eq!(chain_position("freqDist[0]", 0), "freqDist[0]");
        assert_eq!(chain_position("freqDist[0]", 1), "freqDist[0].then");
        assert_eq!(chain_position("freqDist[0][1]", 7), "freqDist[0][1].then[7]");
    }
}
