//! Dispatcher HTTP surface

use axum::{
    body::Body,
    extract::{Path as AxumPath, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{Json, Redirect, Response},
    routing::{any, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use trainlet_store::ResourceStore;

use crate::cache::HandlerCache;
use crate::request::{backend_path, mount_prefix, redirect_location, BackendRequest, BackendResponse};

/// Application state shared across handlers
pub struct BoardState {
    pub store: Arc<dyn ResourceStore>,
    pub cache: Arc<HandlerCache>,
    /// Path prefix the board itself is served under, empty when at the root
    pub mount_base: String,
}

/// Create the dispatcher router
pub fn create_router(
    store: Arc<dyn ResourceStore>,
    cache: Arc<HandlerCache>,
    mount_base: String,
) -> Router {
    let state = Arc::new(BoardState {
        store,
        cache,
        mount_base,
    });

    Router::new()
        .route("/", get(index))
        .route("/heartbeat", post(heartbeat))
        .route("/embed/:job_id", get(embed))
        .route("/:job_id", any(enter))
        .route("/:job_id/", any(forward_root))
        .route("/:job_id/*rest", any(forward))
        .with_state(state)
}

/// Plain index
async fn index() -> &'static str {
    "trainlet board\n"
}

/// A bare `/{job_id}` does not end with a slash, which breaks the
/// backend's relative links; send the client to `/{job_id}/` keeping the
/// query string
async fn enter(
    State(state): State<Arc<BoardState>>,
    AxumPath(job_id): AxumPath<String>,
    RawQuery(query): RawQuery,
) -> Redirect {
    Redirect::permanent(&redirect_location(
        &state.mount_base,
        &job_id,
        query.as_deref(),
    ))
}

/// Forward the backend root
async fn forward_root(
    State(state): State<Arc<BoardState>>,
    AxumPath(job_id): AxumPath<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, String)> {
    dispatch(&state, &job_id, "", query, &headers).await
}

/// Forward a backend-relative path
async fn forward(
    State(state): State<Arc<BoardState>>,
    AxumPath((job_id, rest)): AxumPath<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, String)> {
    dispatch(&state, &job_id, &rest, query, &headers).await
}

/// Resolve the job, get or build its handler, and relay the request
async fn dispatch(
    state: &BoardState,
    job_id_raw: &str,
    rest: &str,
    query: Option<String>,
    headers: &HeaderMap,
) -> Result<Response, (StatusCode, String)> {
    let job_id = Uuid::parse_str(job_id_raw)
        .map_err(|_| (StatusCode::NOT_FOUND, "Unknown job".to_string()))?;

    let logdir = state
        .store
        .run_log_dir(job_id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, "Unknown job".to_string()))?;

    // No cache entry may be created for a run whose directory is gone
    if !logdir.is_dir() {
        return Err((StatusCode::NOT_FOUND, "Log directory missing".to_string()));
    }

    let prefix = mount_prefix(&state.mount_base, job_id_raw);
    let handler = state
        .cache
        .get_or_build(job_id, &logdir, &prefix)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;

    let request = BackendRequest {
        path: backend_path(rest),
        query,
        headers: flatten_headers(headers),
    };
    debug!(job_id = %job_id, path = %request.path, "Forwarding to backend");

    let response = handler
        .handle(request)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;

    into_response(response)
}

/// Liveness signal body
#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub job_id: Uuid,
}

/// Heartbeat acknowledgement with the current eviction configuration, so
/// clients can pace themselves
#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub ok: bool,
    /// Whether a session was live for this job id
    pub session_active: bool,
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

/// Record liveness for a job's session
async fn heartbeat(
    State(state): State<Arc<BoardState>>,
    Json(req): Json<HeartbeatRequest>,
) -> Json<HeartbeatResponse> {
    let session_active = state.cache.record_heartbeat(req.job_id).await;

    Json(HeartbeatResponse {
        ok: true,
        session_active,
        idle_timeout_secs: state.cache.idle_timeout().as_secs(),
        sweep_interval_secs: state.cache.sweep_interval().as_secs(),
    })
}

/// Embedded URL body
#[derive(Debug, Serialize)]
pub struct EmbedResponse {
    pub url: String,
}

/// Resolve the embeddable URL path for a run, for UI iframes
async fn embed(
    State(state): State<Arc<BoardState>>,
    AxumPath(job_id): AxumPath<Uuid>,
) -> Result<Json<EmbedResponse>, (StatusCode, String)> {
    let run = state
        .store
        .get_run(job_id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    if run.is_none() {
        return Err((StatusCode::NOT_FOUND, "Unknown job".to_string()));
    }

    Ok(Json(EmbedResponse {
        url: format!("{}/{}/", state.mount_base, job_id),
    }))
}

fn flatten_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}

fn into_response(response: BackendResponse) -> Result<Response, (StatusCode, String)> {
    let status = StatusCode::from_u16(response.status).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Bad backend status: {}", e),
        )
    })?;

    let mut builder = axum::http::Response::builder().status(status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder
        .body(Body::from(response.body))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
