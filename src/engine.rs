//! Execution dispatcher
//!
//! Runs every top-level task of a [`TaskGraph`] against an [`AnalysisBackend`]:
//! group siblings concurrently, chain members in order with the parent's
//! result as context. Each top-level task is reported to the caller exactly
//! once, as soon as it completes.

use crate::analysis::AnalysisType;
use crate::backend::{AnalysisBackend, BackendError, BackendRequest};
use crate::error::EngineError;
use crate::merge::{merge, ChainOutput, LeafOutput};
use crate::result::{AnalysisResult, MergedResponse};
use crate::task::{Leaf, TaskGraph, TaskNode, TopLevelTask};
use futures::future::try_join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of backend calls in flight across all tasks (default: 8)
    pub max_in_flight: usize,
    /// Deadline for a single backend call (default: 60s)
    pub leaf_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_in_flight: 8,
            leaf_timeout: Duration::from_secs(60),
        }
    }
}

/// Terminal report of one `process` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    pub run_id: Uuid,
    pub tasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

/// Result of one top-level task, as collected by [`Engine::process_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub analysis_type: AnalysisType,
    pub index: usize,
    pub position: String,
    pub result: Result<MergedResponse, EngineError>,
}

impl TaskOutcome {
    fn new(task: &TopLevelTask, result: Result<MergedResponse, EngineError>) -> Self {
        TaskOutcome {
            analysis_type: task.analysis_type,
            index: task.index,
            position: task.position.clone(),
            result,
        }
    }
}

/// Summary plus every outcome, in graph order.
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub summary: ProcessSummary,
    pub outcomes: Vec<TaskOutcome>,
}

/// Dispatches compiled task graphs to a backend.
///
/// # Example
/// ```rust,ignore
/// let engine = Engine::new(Arc::new(InMemoryBackend::with_corpus(sample_corpus())), EngineConfig::default());
/// let graph = build_from_config(&config)?;
/// engine.process(&graph, |result, task| println!("{}: {:?}", task.position, result)).await;
/// ```
#[derive(Clone)]
pub struct Engine {
    dispatcher: Dispatcher,
    config: EngineConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("backend", &self.dispatcher.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Engine {
    pub fn new(backend: Arc<dyn AnalysisBackend>, config: EngineConfig) -> Self {
        let dispatcher = Dispatcher {
            backend,
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            leaf_timeout: config.leaf_timeout,
        };
        Engine { dispatcher, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.dispatcher.backend.name()
    }

    /// Executes every task of `graph`, invoking `callback` once per top-level
    /// task in completion order. Returns after the last callback.
    pub async fn process<F>(&self, graph: &TaskGraph, callback: F) -> ProcessSummary
    where
        F: FnMut(Result<MergedResponse, EngineError>, &TopLevelTask),
    {
        self.process_with_cancel(graph, CancellationToken::new(), callback)
            .await
    }

    /// Like [`Engine::process`], but stops dispatching once `cancel` fires.
    ///
    /// Tasks interrupted by cancellation report `EngineError::Cancelled`; tasks
    /// that already finished are reported normally.
    pub async fn process_with_cancel<F>(
        &self,
        graph: &TaskGraph,
        cancel: CancellationToken,
        mut callback: F,
    ) -> ProcessSummary
    where
        F: FnMut(Result<MergedResponse, EngineError>, &TopLevelTask),
    {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(
            run_id = %run_id,
            tasks = graph.len(),
            leaves = graph.leaf_count(),
            longest_chain = graph.lineage().max_chain_len(),
            backend = self.backend_name(),
            "Engine: processing task graph"
        );

        // Dropping the set aborts every worker still running.
        let mut workers = JoinSet::new();
        for (slot, task) in graph.tasks().iter().enumerate() {
            let dispatcher = self.dispatcher.clone();
            let node = Arc::clone(&task.node);
            let cancel = cancel.clone();
            workers.spawn(async move {
                let result = AssertUnwindSafe(dispatcher.run_node(&node, &cancel))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(EngineError::Aborted(format!(
                            "task worker panicked: {}",
                            panic_message(panic.as_ref())
                        )))
                    });
                (slot, result)
            });
        }

        let mut succeeded = 0;
        let mut failed = 0;
        let mut reported = vec![false; graph.len()];
        let mut finish = |slot: usize, result: Result<MergedResponse, EngineError>| {
            let task = &graph.tasks()[slot];
            match &result {
                Ok(_) => {
                    succeeded += 1;
                    debug!(run_id = %run_id, position = %task.position, "Engine: task completed");
                }
                Err(err) => {
                    failed += 1;
                    warn!(run_id = %run_id, position = %task.position, error = %err, "Engine: task failed");
                }
            }
            callback(result, task);
        };

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((slot, result)) => {
                    reported[slot] = true;
                    finish(slot, result);
                }
                Err(err) => warn!(run_id = %run_id, error = %err, "Engine: task worker lost"),
            }
        }

        // A worker lost without a result still owes its task one report.
        let lost: Vec<usize> = (0..graph.len()).filter(|slot| !reported[*slot]).collect();
        for slot in lost {
            finish(
                slot,
                Err(EngineError::Aborted(
                    "task worker ended without a result".to_string(),
                )),
            );
        }

        let summary = ProcessSummary {
            run_id,
            tasks: graph.len(),
            succeeded,
            failed,
            elapsed: started.elapsed(),
        };
        info!(
            run_id = %run_id,
            succeeded,
            failed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Engine: run finished"
        );
        summary
    }

    /// Executes `graph` and collects every outcome.
    pub async fn process_all(&self, graph: &TaskGraph) -> ProcessReport {
        let mut outcomes = Vec::with_capacity(graph.len());
        let summary = self
            .process(graph, |result, task| {
                outcomes.push(TaskOutcome::new(task, result))
            })
            .await;
        outcomes.sort_by(|a, b| {
            (a.analysis_type.config_key(), a.index).cmp(&(b.analysis_type.config_key(), b.index))
        });
        ProcessReport { summary, outcomes }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Per-run execution state shared by all task workers.
#[derive(Clone)]
struct Dispatcher {
    backend: Arc<dyn AnalysisBackend>,
    permits: Arc<Semaphore>,
    leaf_timeout: Duration,
}

impl Dispatcher {
    async fn run_node(
        &self,
        node: &TaskNode,
        cancel: &CancellationToken,
    ) -> Result<MergedResponse, EngineError> {
        // First failing chain drops its in-flight siblings.
        let chains = try_join_all(node.heads().iter().map(|head| self.run_chain(head, cancel))).await?;
        merge(chains, node)
    }

    async fn run_chain(
        &self,
        head: &Leaf,
        cancel: &CancellationToken,
    ) -> Result<ChainOutput, EngineError> {
        let mut outputs: ChainOutput = Vec::with_capacity(head.chain_len());
        for leaf in head.chain() {
            let context = outputs.last().map(|output| &output.result);
            let result = self.run_leaf(leaf, context, cancel).await?;
            outputs.push(LeafOutput::new(leaf, result));
        }
        Ok(outputs)
    }

    async fn run_leaf(
        &self,
        leaf: &Leaf,
        context: Option<&AnalysisResult>,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let _permit = tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            permit = self.permits.acquire() => permit
                .map_err(|e| EngineError::Aborted(format!("dispatcher closed: {}", e)))?,
        };

        let request = match context {
            Some(parent) => BackendRequest::with_context(&leaf.spec, parent),
            None => BackendRequest::new(&leaf.spec),
        };
        trace!(
            leaf = leaf.id.0,
            position = %leaf.position,
            chained = context.is_some(),
            "Engine: dispatching leaf"
        );

        let call = tokio::time::timeout(self.leaf_timeout, self.backend.analyze(request));
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            outcome = call => outcome,
        };

        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(source)) => Err(EngineError::Backend {
                position: leaf.position.clone(),
                source,
            }),
            Err(_elapsed) => Err(EngineError::Backend {
                position: leaf.position.clone(),
                source: BackendError::Timeout(self.leaf_timeout),
            }),
        }
    }
}
