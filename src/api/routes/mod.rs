//! API route modules, organized by resource.

pub mod health;
pub mod jobs;

use axum::Router;

use crate::api::server::AppState;

/// Builds the full router: health checks are unauthenticated, everything
/// else lives under `/jobs` per spec §6.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest("/jobs", jobs::router())
        .with_state(state)
}
