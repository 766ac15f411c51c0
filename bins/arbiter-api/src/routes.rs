use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/run", post(handlers::run_code))
        .route("/health", get(handlers::health_check))
}
