use analytics_engine::{
    build_from_config, sample_corpus, AnalysisBackend, AnalysisResult, BackendError,
    BackendRequest, Engine, EngineConfig, EngineError, InMemoryBackend, MergedResponse,
    TopLevelTask,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

fn sample_engine() -> Engine {
    Engine::new(
        Arc::new(InMemoryBackend::with_corpus(sample_corpus())),
        EngineConfig::default(),
    )
}

async fn run(engine: &Engine, config: Value) -> Vec<(String, Result<MergedResponse, EngineError>)> {
    let graph = build_from_config(&config).unwrap();
    let mut calls = Vec::new();
    engine
        .process(&graph, |result, task: &TopLevelTask| {
            calls.push((task.position.clone(), result))
        })
        .await;
    calls
}

fn object_keys(value: &Value) -> Vec<String> {
    let mut keys: Vec<String> = value.as_object().unwrap().keys().cloned().collect();
    keys.sort();
    keys
}

#[tokio::test]
async fn single_time_series_surfaces_the_analysis_envelope() {
    let calls = run(
        &sample_engine(),
        json!({"timeSeries": {"interval": "week", "span": 1}}),
    )
    .await;
    assert_eq!(calls.len(), 1);

    let data = serde_json::to_value(calls[0].1.as_ref().unwrap()).unwrap();
    let analysis = &data["analysis"];
    assert_eq!(
        object_keys(analysis),
        vec!["analysis_type", "parameters", "redacted", "results"]
    );
    assert_eq!(object_keys(&analysis["parameters"]), vec!["interval", "span"]);
    assert_eq!(analysis["analysis_type"], "timeSeries");
    assert_eq!(analysis["parameters"]["interval"], "week");
}

#[tokio::test]
async fn unnamed_filters_key_the_group() {
    let calls = run(
        &sample_engine(),
        json!({
            "timeSeries": [[
                {"filter": "fb.content contains \"ford\"", "interval": "week", "span": 1},
                {"filter": "fb.content contains \"honda\"", "interval": "week", "span": 1}
            ]]
        }),
    )
    .await;

    let merged = calls[0].1.as_ref().unwrap();
    assert_eq!(
        merged.keys(),
        vec!["fb.content contains \"ford\"", "fb.content contains \"honda\""]
    );
    let ford_total: u64 = merged
        .get("fb.content contains \"ford\"")
        .unwrap()
        .analysis
        .results
        .iter()
        .map(|r| r.interactions())
        .sum();
    assert_eq!(ford_total, 40);
}

#[tokio::test]
async fn named_siblings_key_by_name() {
    let calls = run(
        &sample_engine(),
        json!({
            "timeSeries": [[
                {"name": "foo", "filter": "fb.content contains \"ford\"", "interval": "week", "span": 1},
                {"name": "bar", "filter": "fb.content contains \"honda\"", "interval": "week", "span": 1}
            ]]
        }),
    )
    .await;

    let merged = calls[0].1.as_ref().unwrap();
    assert_eq!(merged.keys(), vec!["bar", "foo"]);
}

#[tokio::test]
async fn mixed_siblings_key_by_name_or_filter() {
    let calls = run(
        &sample_engine(),
        json!({
            "timeSeries": [[
                {"name": "foo", "filter": "fb.content contains \"ford\"", "interval": "week", "span": 1},
                {"filter": "fb.content contains \"honda\"", "interval": "week", "span": 1}
            ]]
        }),
    )
    .await;

    let merged = calls[0].1.as_ref().unwrap();
    assert_eq!(merged.keys(), vec!["fb.content contains \"honda\"", "foo"]);
    let ford_total: u64 = merged
        .get("foo")
        .unwrap()
        .analysis
        .results
        .iter()
        .map(|r| r.interactions())
        .sum();
    assert_eq!(ford_total, 40);
}

#[tokio::test]
async fn gender_then_age_chain() {
    let calls = run(
        &sample_engine(),
        json!({
            "freqDist": {
                "target": "fb.parent.author.gender",
                "threshold": 2,
                "then": {"target": "fb.parent.author.age", "threshold": 4}
            }
        }),
    )
    .await;

    let merged = calls[0].1.as_ref().unwrap();
    let head: Vec<_> = merged.analysis().unwrap().keys().collect();
    assert_eq!(head, vec!["male", "female"]);

    let ages = merged.get("freqDist[0].then").unwrap();
    assert_eq!(ages.analysis.results.len(), 4);

    // Descendants never leak into the surfaced analysis.
    let data = serde_json::to_value(merged).unwrap();
    assert!(data["analysis"].get("chained").is_none());
    assert!(data["chained"]["freqDist[0].then"]["analysis"].is_object());
}

#[tokio::test]
async fn duplicate_merge_keys_fail_the_task() {
    let calls = run(
        &sample_engine(),
        json!({
            "freqDist": [[
                {"name": "dup", "target": "fb.parent.author.gender", "threshold": 2},
                {"name": "dup", "target": "fb.parent.author.age", "threshold": 4}
            ]]
        }),
    )
    .await;

    assert_eq!(calls.len(), 1);
    assert!(matches!(
        calls[0].1,
        Err(EngineError::MergeKeyCollision { ref key, .. }) if key == "dup"
    ));
}

struct SecondSiblingFails;

#[async_trait]
impl AnalysisBackend for SecondSiblingFails {
    async fn analyze(&self, request: BackendRequest<'_>) -> Result<AnalysisResult, BackendError> {
        if request.spec.name.as_deref() == Some("second") {
            return Err(BackendError::Rejected {
                status: 503,
                message: "maintenance".to_string(),
            });
        }
        Ok(AnalysisResult::new(request.spec.parameters.clone(), Vec::new()))
    }

    fn name(&self) -> &str {
        "second-sibling-fails"
    }
}

#[tokio::test]
async fn failing_sibling_yields_a_single_error_callback() {
    let engine = Engine::new(Arc::new(SecondSiblingFails), EngineConfig::default());
    let calls = run(
        &engine,
        json!({
            "timeSeries": [[
                {"name": "first", "interval": "day", "span": 1},
                {"name": "second", "interval": "day", "span": 1},
                {"name": "third", "interval": "day", "span": 1}
            ]]
        }),
    )
    .await;

    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].1,
        Err(EngineError::Backend {
            position: "timeSeries[0][1]".to_string(),
            source: BackendError::Rejected {
                status: 503,
                message: "maintenance".to_string()
            },
        })
    );
}

#[tokio::test]
async fn one_failing_entry_does_not_affect_others() {
    let engine = Engine::new(Arc::new(SecondSiblingFails), EngineConfig::default());
    let graph = build_from_config(&json!({
        "timeSeries": [
            {"name": "second", "interval": "day", "span": 1},
            {"name": "first", "interval": "day", "span": 1}
        ]
    }))
    .unwrap();

    let report = engine.process_all(&graph).await;
    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(report.summary.failed, 1);
    assert!(report.outcomes[0].result.is_err());
    assert!(report.outcomes[1].result.is_ok());
}
