//! Analytics Engine API Server Binary
//!
//! Run with: `cargo run --bin analytics-engine-server`

use analytics_engine::{run_server, EngineConfig, ServerConfig};
use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tracing is initialized in run_server(); RUST_LOG controls the level:
    //   RUST_LOG=debug cargo run --bin analytics-engine-server
    //   RUST_LOG=analytics_engine::engine=trace cargo run --bin analytics-engine-server

    let defaults = EngineConfig::default();
    let engine = EngineConfig {
        max_in_flight: env_or("MAX_IN_FLIGHT", defaults.max_in_flight),
        leaf_timeout: Duration::from_secs(env_or(
            "LEAF_TIMEOUT_SECS",
            defaults.leaf_timeout.as_secs(),
        )),
    };

    let mut config = ServerConfig::new(
        std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
        env_or("PORT", 3000),
    )
    .with_engine(engine);
    if let Ok(url) = std::env::var("BACKEND_URL") {
        config = config.with_backend_url(url);
    }

    println!("Starting Analytics Engine API Server...");
    println!("   Host: {}", config.host);
    println!("   Port: {}", config.port);
    println!(
        "   Backend: {}",
        config.backend_url.as_deref().unwrap_or("in-memory sample corpus")
    );
    println!(
        "   Limits: {} in flight, {}s per leaf",
        config.engine.max_in_flight,
        config.engine.leaf_timeout.as_secs()
    );
    println!();
    println!("Available endpoints:");
    println!("  GET  /health     - Health check");
    println!("  GET  /analyses   - List analysis types");
    println!("  POST /process    - Run an analysis configuration");
    println!();

    run_server(config).await?;

    Ok(())
}
