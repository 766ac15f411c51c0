mod handlers;
mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use arbiter_common::config::Config;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    /// Root of the scratch directory; each run gets its own subdirectory.
    pub scratch_root: PathBuf,
}

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Arbiter run API booting...");

    let config = Config::from_env();
    tokio::fs::create_dir_all(&config.scratch_dir)
        .await
        .expect("Failed to create scratch directory");

    let state = Arc::new(AppState {
        scratch_root: config.scratch_dir.clone(),
    });

    // Build router
    let app = Router::new().merge(routes::routes()).with_state(state);

    // Start server
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    info!("HTTP server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
