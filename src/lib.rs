//! Analytics task orchestration engine
//!
//! Compiles a JSON analysis configuration into a [`TaskGraph`], executes it
//! against an [`AnalysisBackend`] with group-level concurrency and `then`
//! chaining, and merges per-leaf results into one response per top-level task.
//!
//! ```rust,ignore
//! let graph = build_from_config(&config)?;
//! let engine = Engine::new(Arc::new(InMemoryBackend::with_corpus(sample_corpus())), EngineConfig::default());
//! let summary = engine.process(&graph, |result, task| { /* one call per task */ }).await;
//! ```

pub mod analysis;
pub mod backend;
pub mod engine;
pub mod error;
pub mod merge;
pub mod registry;
pub mod result;
pub mod server;
pub mod task;

pub use analysis::{AnalysisParameters, AnalysisSpec, AnalysisType, Interval};
pub use backend::{
    sample_corpus, AnalysisBackend, BackendError, BackendRequest, Filter, FilterError,
    HttpBackend, HttpBackendConfig, InMemoryBackend, Interaction, MemoryBackendConfig,
};
pub use engine::{Engine, EngineConfig, ProcessReport, ProcessSummary, TaskOutcome};
pub use error::{EngineError, ValidationError};
pub use merge::{merge, ChainOutput, LeafOutput};
pub use registry::{AnalysisDefinition, AnalysisRegistry, ParameterInfo};
pub use result::{AnalysisResponse, AnalysisResult, MergedResponse, ResultRecord};
pub use server::{run_server, ApiError, AppState, ServerConfig};
pub use task::{
    build_from_config, Leaf, LeafId, Lineage, LineageError, MergeKey, TaskCompiler, TaskGraph,
    TaskNode, TopLevelTask,
};
