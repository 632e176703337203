//! Job routes (spec §6): the REST/stream contract the core exposes.
//!
//! | Method | Path | Semantics |
//! |---|---|---|
//! | POST | `/` | Create or return the existing active job for the tuple |
//! | GET | `/{id}` | Full job detail, including pages and token summary |
//! | GET | `/` | Paged list (max 100) |
//! | POST | `/{id}/pause` | Pause an active job |
//! | POST | `/{id}/resume` | Resume a paused job |
//! | POST | `/{id}/retry` | Re-open a terminal job into page generation |
//! | DELETE | `/{id}` | Cancellation (not row deletion) |
//! | POST | `/{id}/pages/{pid}/retry` | Reset a failed page to pending |
//! | GET | `/{id}/progress/stream` | NDJSON progress stream |

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{
    CreateJobBody, CreateJobResponse, JobDetailView, JobListQuery, JobListResponse, JobView,
};
use crate::api::server::AppState;
use crate::domain::job::JobStatus;
use crate::progress::{ProgressBus, ProgressEvent};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_job).get(list_jobs))
        .route("/{id}", get(get_job).delete(cancel_job))
        .route("/{id}/pause", post(pause_job))
        .route("/{id}/resume", post(resume_job))
        .route("/{id}/retry", post(retry_job))
        .route("/{id}/pages/{page_id}/retry", post(retry_page))
        .route("/{id}/progress/stream", get(stream_progress))
}

async fn create_job(State(state): State<AppState>, Json(body): Json<CreateJobBody>) -> ApiResult<impl IntoResponse> {
    let request = body.into_request().map_err(|e| ApiError::bad_request(e))?;
    let job_id = state.jobs.create_job(request).await?;
    Ok((StatusCode::CREATED, Json(CreateJobResponse { job_id })))
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<JobDetailView>> {
    let detail = state.jobs.get_job_detail(&id).await?;
    let token_summary = state.tokens.get_job_tokens(&id).await.ok();
    Ok(Json(JobDetailView::from_detail(&detail, token_summary)))
}

async fn list_jobs(State(state): State<AppState>, Query(query): Query<JobListQuery>) -> ApiResult<Json<JobListResponse>> {
    let (filters, pagination) = query.into_filters_and_pagination().map_err(|e| ApiError::bad_request(e))?;
    let jobs = state.jobs.list_jobs(&filters, pagination).await?;
    let total = state.jobs.count_jobs(&filters).await?;
    Ok(Json(JobListResponse {
        jobs: jobs.iter().map(JobView::from).collect(),
        total,
        limit: pagination.limit,
        offset: pagination.offset,
    }))
}

async fn pause_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    let ok = state.jobs.pause_job(&id).await?;
    transition_response(ok, &id, "pause")
}

async fn resume_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    let ok = state.jobs.resume_job(&id).await?;
    transition_response(ok, &id, "resume")
}

async fn retry_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    let ok = state.jobs.retry_job(&id).await?;
    transition_response(ok, &id, "retry")
}

async fn cancel_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    let ok = state.jobs.cancel_job(&id).await?;
    transition_response(ok, &id, "cancel")
}

async fn retry_page(
    State(state): State<AppState>,
    Path((id, page_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let ok = state.jobs.retry_failed_page(&id, &page_id).await?;
    if ok {
        Ok(Json(serde_json::json!({ "retried": true })))
    } else {
        Err(ApiError::conflict(format!("page '{page_id}' on job '{id}' is not in a retryable state")))
    }
}

/// `false` from a test-and-set transition means the job wasn't in a state
/// that allowed it (spec §7 "illegal state"), not a storage failure.
fn transition_response(ok: bool, id: &str, action: &str) -> ApiResult<Json<serde_json::Value>> {
    if ok {
        Ok(Json(serde_json::json!({ action: true })))
    } else {
        Err(ApiError::conflict(format!("job '{id}' cannot be {action}d from its current state")))
    }
}

/// Unregisters the progress callback when the stream is dropped, whether it
/// ran to completion or the client disconnected early.
struct CallbackGuard {
    bus: std::sync::Arc<ProgressBus>,
    job_id: String,
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        self.bus.unregister(&self.job_id);
    }
}

async fn stream_progress(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    // Snapshot first so a client that connects after the job has already
    // finished still gets one frame before the stream closes.
    let snapshot = state.jobs.get_job(&id).await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    state.bus.register_progress_callback(id.clone(), std::sync::Arc::new(move |event| {
        let _ = tx.send(event);
    }));
    let guard = CallbackGuard { bus: state.bus.clone(), job_id: id.clone() };

    let snapshot_event = ProgressEvent {
        job_id: snapshot.id.clone(),
        status: snapshot.status.to_string(),
        phase: snapshot.current_phase,
        progress_percent: snapshot.progress_percent,
        message: "snapshot".to_string(),
        page_id: None,
        page_title: None,
        page_status: None,
        total_pages: snapshot.total_pages,
        completed_pages: snapshot.completed_pages,
        failed_pages: snapshot.failed_pages,
        error: snapshot.error_message.clone(),
        token_summary: None,
    };
    let already_terminal = snapshot.status.is_terminal();

    let body_stream = stream::unfold(
        (Some(snapshot_event), already_terminal, rx, guard, state.jobs, id),
        move |(pending_snapshot, mut done, mut rx, guard, jobs, job_id)| async move {
            if let Some(event) = pending_snapshot {
                let line = to_ndjson_line(&event);
                return Some((Ok::<_, Infallible>(line), (None, done, rx, guard, jobs, job_id)));
            }
            if done {
                return None;
            }

            match timeout(HEARTBEAT_INTERVAL, rx.recv()).await {
                Ok(Some(event)) => {
                    done = event.status.parse::<JobStatus>().map(JobStatus::is_terminal).unwrap_or(false);
                    let line = to_ndjson_line(&event);
                    Some((Ok(line), (None, done, rx, guard, jobs, job_id)))
                }
                Ok(None) => None,
                Err(_elapsed) => {
                    let status = jobs.get_job(&job_id).await.map(|j| j.status.to_string()).unwrap_or_default();
                    let heartbeat = ProgressEvent::heartbeat(job_id.clone(), status, None);
                    let line = to_ndjson_line(&heartbeat);
                    Some((Ok(line), (None, done, rx, guard, jobs, job_id)))
                }
            }
        },
    );

    let body = Body::from_stream(body_stream);
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(body)
        .map_err(|e| ApiError::internal(e.to_string()))?)
}

fn to_ndjson_line(event: &ProgressEvent) -> bytes::Bytes {
    let mut line = serde_json::to_vec(event).unwrap_or_default();
    line.push(b'\n');
    bytes::Bytes::from(line)
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::database::repositories::{SqliteJobManager, SqliteTokenRepository};
    use crate::database::{init_pool, run_migrations};
    use crate::domain::job::{PathFilters, RepoType};
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

    fn sample_body() -> serde_json::Value {
        serde_json::json!({
            "repo_url": "https://github.com/acme/widgets",
            "repo_type": "github",
            "owner": "acme",
            "repo": "widgets",
            "provider": "openai",
            "language": "en",
        })
    }

    #[tokio::test]
    async fn create_job_then_fetch_it_by_id() {
        let state = test_state().await;
        let router = router().with_state(state);

        let create_req = Request::post("/")
            .header("content-type", "application/json")
            .body(Body::from(sample_body().to_string()))
            .unwrap();
        let response = router.clone().oneshot(create_req).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let created: CreateJobResponse = serde_json::from_slice(&body).unwrap();

        let get_req = Request::get(format!("/{}", created.job_id)).body(Body::empty()).unwrap();
        let response = router.oneshot(get_req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_job_rejects_unknown_repo_type() {
        let state = test_state().await;
        let router = router().with_state(state);

        let mut body = sample_body();
        body["repo_type"] = serde_json::json!("perforce");
        let req = Request::post("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_job_returns_404_for_unknown_id() {
        let state = test_state().await;
        let router = router().with_state(state);

        let req = Request::get("/does-not-exist").body(Body::empty()).unwrap();
        let response = router.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn pause_on_a_freshly_created_pending_job_is_a_conflict() {
        let state = test_state().await;
        let jobs = state.jobs.clone();
        let job_id = jobs
            .create_job(crate::database::repositories::CreateJobRequest {
                repo_url: "https://github.com/acme/widgets".into(),
                repo_type: RepoType::Github,
                owner: "acme".into(),
                repo: "widgets".into(),
                access_token: None,
                filters: PathFilters::default(),
                provider: "openai".into(),
                model: None,
                language: "en".into(),
                is_comprehensive: false,
                client_id: None,
            })
            .await
            .unwrap();

        let router = router().with_state(state);
        let req = Request::post(format!("/{job_id}/pause")).body(Body::empty()).unwrap();
        let response = router.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
