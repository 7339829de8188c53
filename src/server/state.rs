//! Shared application state for the API server

use crate::engine::Engine;
use crate::task::TaskCompiler;

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    /// Dispatches compiled configurations to the backend
    pub engine: Engine,
    /// Validates incoming configurations
    pub compiler: TaskCompiler,
}

impl AppState {
    /// Creates a new application state
    pub fn new(engine: Engine, compiler: TaskCompiler) -> Self {
        AppState { engine, compiler }
    }
}
