use analytics_engine::{
    build_from_config, AnalysisParameters, AnalysisRegistry, AnalysisType, Interval, MergeKey,
    TaskCompiler, TaskGraph, TaskNode, ValidationError,
};
use serde_json::json;
use std::sync::Arc;

#[test]
fn mixed_configuration_compiles_in_input_order() {
    let graph = build_from_config(&json!({
        "timeSeries": [
            {"interval": "week", "span": 1},
            [
                {"name": "cars", "filter": "fb.content contains \"car\"", "interval": "day", "span": 1},
                {"filter": "fb.content exists", "interval": "hour", "span": 12}
            ]
        ],
        "freqDist": {
            "target": "fb.parent.author.gender",
            "threshold": 2,
            "then": {"target": "fb.parent.author.age", "threshold": 4}
        }
    }))
    .unwrap();

    assert_eq!(graph.len(), 3);
    assert_eq!(graph.leaf_count(), 5);
    assert_eq!(graph.lineage().link_count(), 1);

    let series: Vec<_> = graph.tasks_for(AnalysisType::TimeSeries).collect();
    assert_eq!(series.len(), 2);
    match series[1].node.as_ref() {
        TaskNode::Group(members) => {
            let keys: Vec<_> = members.iter().map(|m| m.merge_key.clone()).collect();
            assert_eq!(
                keys,
                vec![
                    MergeKey::Name("cars".to_string()),
                    MergeKey::Filter("fb.content exists".to_string())
                ]
            );
            assert_eq!(
                members[1].spec.parameters,
                AnalysisParameters::TimeSeries {
                    interval: Interval::Hour,
                    span: 12
                }
            );
        }
        TaskNode::Leaf(_) => panic!("expected a group"),
    }

    let freq: Vec<_> = graph.tasks_for(AnalysisType::FreqDist).collect();
    let head = &freq[0].node.heads()[0];
    let child = head.next.as_ref().unwrap();
    assert_eq!(child.spec.analysis_type, AnalysisType::FreqDist);
    assert_eq!(child.position, "freqDist[0].then");
}

#[test]
fn validation_stops_before_any_graph_is_built() {
    let err = build_from_config(&json!({
        "freqDist": [[
            {"target": "fb.parent.author.gender", "threshold": 2},
            {"target": "fb.parent.author.age", "threshold": "four"}
        ]]
    }))
    .unwrap_err();

    assert_eq!(
        err,
        ValidationError::InvalidField {
            position: "freqDist[0][1]".to_string(),
            field: "threshold".to_string(),
            expected: "a positive integer".to_string()
        }
    );
}

#[test]
fn compilation_is_idempotent() {
    let text = r#"{
        "timeSeries": [[{"name": "a", "interval": "day", "span": 1}, {"name": "b", "interval": "day", "span": 7}]],
        "freqDist": {"target": "fb.parent.author.age", "threshold": 4,
                     "then": {"target": "fb.parent.author.gender", "threshold": 2}}
    }"#;
    let first = TaskGraph::from_json_str(text).unwrap();
    let second = TaskGraph::from_json_str(text).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first.lineage().dispatch_order(),
        second.lineage().dispatch_order()
    );
}

#[test]
fn compiler_shares_an_explicit_registry() {
    let registry = Arc::new(AnalysisRegistry::new());
    let compiler = TaskCompiler::with_registry(Arc::clone(&registry));
    let graph = compiler
        .compile(&json!({"timeSeries": {"interval": "month", "span": 3}}))
        .unwrap();
    assert_eq!(graph.analysis_types(), vec![AnalysisType::TimeSeries]);
    assert_eq!(compiler.registry().definitions().len(), 2);
}
