//! HTTP API: health check, relay submission and task lookup

use crate::config::ApiConfig;
use crate::error::{RelayerError, RelayerResult, TxContext};
use crate::relay::{RelayExecutor, RelayPhase, RelayRequest, RelayResult};
use crate::store::RelayTask;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<RelayExecutor>,
}

/// Build the router; CORS is open to any origin
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/send-tx", post(send_tx))
        .route("/tasks/:id", get(get_task))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, executor: Arc<RelayExecutor>) -> RelayerResult<()> {
    let app = router(AppState { executor });

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

/// Relay a permit. The relay runs on its own task so a client hanging up
/// does not cancel it halfway through.
async fn send_tx(
    State(state): State<AppState>,
    payload: Result<Json<RelayRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RelayResult>), RelayerError> {
    let Json(request) =
        payload.map_err(|rejection| RelayerError::InvalidArgument(rejection.body_text()))?;

    let executor = state.executor.clone();
    let result = tokio::spawn(async move { executor.execute_relay(request).await })
        .await
        .map_err(|e| RelayerError::Internal(format!("relay task aborted: {}", e)))??;

    Ok((StatusCode::CREATED, Json(result)))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RelayTask>, RelayerError> {
    let task = state.executor.store().get(id).await?;
    Ok(Json(task))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phase: Option<RelayPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<TxContext>,
}

impl IntoResponse for RelayerError {
    fn into_response(self) -> Response {
        let status = if self.is_validation() {
            StatusCode::BAD_REQUEST
        } else if matches!(self, RelayerError::TaskNotFound { .. }) {
            StatusCode::NOT_FOUND
        } else if self.is_chain_failure() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
        }

        let (task_id, phase) = match &self {
            RelayerError::RelayFailed { task_id, phase, .. } => (Some(*task_id), Some(*phase)),
            _ => (None, None),
        };

        let body = ErrorResponse {
            error: self.kind(),
            message: self.to_string(),
            task_id,
            phase,
            context: self.tx_context().cloned(),
        };

        (status, Json(body)).into_response()
    }
}
