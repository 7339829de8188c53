//! Analytics backends.
//!
//! The engine never computes an analysis itself: every leaf task is handed to
//! an [`AnalysisBackend`], which returns an [`AnalysisResult`] or fails.
//!
//! Implementations:
//! - [`HttpBackend`]: remote analytics service speaking JSON over HTTP
//! - [`InMemoryBackend`]: reference backend over an in-memory corpus, used for
//!   tests and the demo server

pub mod filter;
pub mod http;
pub mod memory;

pub use filter::{Filter, FilterError};
pub use http::{HttpBackend, HttpBackendConfig};
pub use memory::{sample_corpus, InMemoryBackend, Interaction, MemoryBackendConfig};

use crate::analysis::AnalysisSpec;
use crate::result::AnalysisResult;
use async_trait::async_trait;
use std::time::Duration;

/// Request for one leaf analysis.
#[derive(Debug, Clone, Copy)]
pub struct BackendRequest<'a> {
    pub spec: &'a AnalysisSpec,
    /// Result of the parent leaf when the request is a chained follow-up.
    pub context: Option<&'a AnalysisResult>,
}

impl<'a> BackendRequest<'a> {
    pub fn new(spec: &'a AnalysisSpec) -> Self {
        BackendRequest {
            spec,
            context: None,
        }
    }

    pub fn with_context(spec: &'a AnalysisSpec, context: &'a AnalysisResult) -> Self {
        BackendRequest {
            spec,
            context: Some(context),
        }
    }
}

/// Executes single leaf analyses.
///
/// # Example
/// ```rust,ignore
/// let backend = InMemoryBackend::with_corpus(sample_corpus());
/// let result = backend.analyze(BackendRequest::new(&spec)).await?;
/// ```
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Runs one analysis. Chained requests carry the parent's result in
    /// `request.context`, which the backend may use to narrow the query.
    async fn analyze(&self, request: BackendRequest<'_>) -> Result<AnalysisResult, BackendError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Errors reported by a backend for a single leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Backend could not be reached
    Unavailable(String),
    /// Backend refused the request
    Rejected { status: u16, message: String },
    /// Request is well-formed for the engine but not executable by the backend
    InvalidRequest(String),
    /// Backend answered with something that is not an analysis result
    InvalidResponse(String),
    /// Backend did not answer in time
    Timeout(Duration),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Unavailable(msg) => write!(f, "Backend unavailable: {}", msg),
            BackendError::Rejected { status, message } => {
                write!(f, "Backend rejected request (HTTP {}): {}", status, message)
            }
            BackendError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            BackendError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            BackendError::Timeout(after) => {
                write!(f, "Backend timed out after {}ms", after.as_millis())
            }
        }
    }
}

impl std::error::Error for BackendError {}

impl From<FilterError> for BackendError {
    fn from(err: FilterError) -> Self {
        BackendError::InvalidRequest(err.to_string())
    }
}
