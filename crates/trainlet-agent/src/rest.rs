//! Agent HTTP surface

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;

use trainlet_core::AgentStatusReport;

use crate::manager::AgentManager;

/// Application state shared across handlers
pub struct AppState {
    pub manager: Arc<AgentManager>,
}

/// Create the agent API router
pub fn create_router(manager: Arc<AgentManager>) -> Router {
    let state = Arc::new(AppState { manager });

    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/halt", post(halt))
        .route("/finish", post(finish))
        .with_state(state)
}

/// Simple acknowledgement body
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// Liveness probe
async fn health() -> Json<OkResponse> {
    Json(OkResponse { ok: true })
}

/// Current run snapshot with elapsed time and ETA
async fn status(State(state): State<Arc<AppState>>) -> Json<AgentStatusReport> {
    Json(state.manager.status())
}

/// Set the cooperative cancellation flag; the run stops at the next epoch
/// boundary and is recorded as canceled
async fn halt(State(state): State<Arc<AppState>>) -> Json<OkResponse> {
    state.manager.request_halt();
    Json(OkResponse { ok: true })
}

/// Set the early-finish flag; the run stops at the next epoch boundary and
/// is recorded as succeeded
async fn finish(State(state): State<Arc<AppState>>) -> Json<OkResponse> {
    state.manager.request_finish();
    Json(OkResponse { ok: true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use trainlet_core::AgentConfig;
    use trainlet_store::{MemoryStore, ResourceStore};
    use uuid::Uuid;

    struct NoopExecutor;

    impl crate::executor::TrainingExecutor for NoopExecutor {
        fn execute(
            &self,
            _claim: &trainlet_core::RunClaim,
            _on_progress: &(dyn Fn(crate::executor::TrainingProgress) + Send + Sync),
            _should_stop: &(dyn Fn() -> bool + Send + Sync),
        ) -> trainlet_core::TrainletResult<bool> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_create_router() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn ResourceStore>;
        let manager = Arc::new(AgentManager::new(
            Uuid::new_v4(),
            AgentConfig::default(),
            store,
            Arc::new(NoopExecutor),
        ));
        let _router = create_router(manager);
    }
}
