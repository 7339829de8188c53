//! REST API server exposing the analytics engine

mod error;
mod handlers;
mod routes;
mod state;

pub use error::ApiError;
pub use handlers::{AnalysesResponse, AnalysisInfo, OutcomeBody, ProcessResponse};
pub use routes::create_router;
pub use state::AppState;

use crate::backend::{
    sample_corpus, AnalysisBackend, HttpBackend, HttpBackendConfig, InMemoryBackend,
};
use crate::engine::{Engine, EngineConfig};
use crate::task::TaskCompiler;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host address (default: "127.0.0.1")
    pub host: String,
    /// Server port (default: 3000)
    pub port: u16,
    /// Remote analytics service; the in-memory sample backend is used when unset
    pub backend_url: Option<String>,
    /// Dispatcher limits
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            backend_url: None,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Creates a new server configuration
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ServerConfig {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_backend_url(mut self, backend_url: impl Into<String>) -> Self {
        self.backend_url = Some(backend_url.into());
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}

/// Builds the backend selected by `config`.
pub fn build_backend(config: &ServerConfig) -> Result<Arc<dyn AnalysisBackend>, Box<dyn std::error::Error>> {
    match &config.backend_url {
        Some(url) => Ok(Arc::new(HttpBackend::new(HttpBackendConfig::new(url.clone()))?)),
        None => Ok(Arc::new(InMemoryBackend::with_corpus(sample_corpus()))),
    }
}

/// Runs the API server
///
/// # Arguments
/// * `config` - Server configuration
///
/// # Returns
/// Returns an error if the server fails to start or encounters a fatal error
///
/// # Example
/// ```rust,no_run
/// use analytics_engine::server::{run_server, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ServerConfig::default();
///     run_server(config).await?;
///     Ok(())
/// }
/// ```
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=analytics_engine=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let backend = build_backend(&config)?;
    let engine = Engine::new(backend, config.engine.clone());
    let state = Arc::new(AppState::new(engine, TaskCompiler::new()));

    let app = routes::create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        backend = config.backend_url.as_deref().unwrap_or("in-memory"),
        "Server listening on http://{}",
        addr
    );

    axum::serve(listener, app).await?;

    Ok(())
}
