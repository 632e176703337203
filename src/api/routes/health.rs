//! Liveness/readiness routes, trimmed to what a single-process dispatcher
//! can actually report.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/live", get(liveness)).route("/ready", get(readiness))
}

async fn liveness(State(state): State<AppState>) -> impl IntoResponse {
    let uptime_secs = state.start_time.elapsed().as_secs();
    (StatusCode::OK, Json(serde_json::json!({ "status": "alive", "uptime_secs": uptime_secs })))
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match state.jobs.get_pending_jobs().await {
        Ok(_) => (StatusCode::OK, "ready"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready"),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::database::repositories::{SqliteJobManager, SqliteTokenRepository};
    use crate::database::{init_pool, run_migrations};
    use crate::progress::ProgressBus;

    async fn test_state() -> AppState {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        AppState::new(
            std::sync::Arc::new(SqliteJobManager::new(pool.clone())),
            std::sync::Arc::new(SqliteTokenRepository::new(pool)),
            std::sync::Arc::new(ProgressBus::new()),
        )
    }

    #[tokio::test]
    async fn liveness_reports_ok_and_an_uptime() {
        let router = router().with_state(test_state().await);
        let response = router.oneshot(Request::get("/live").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_reports_ok_against_a_migrated_database() {
        let router = router().with_state(test_state().await);
        let response = router.oneshot(Request::get("/ready").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
