//! REST API server for the reasoning agent
//!
//! Exposes the run entry point and the audit trail over HTTP. Every request
//! runs with its own memory.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::agent::Agent;
use crate::audit::AuditLog;
use crate::config::AgentConfig;
use crate::models::UserPreferences;
use crate::Result;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RunRequest {
    pub task: String,
    pub max_iterations: Option<u32>,
    pub llm_timeout_secs: Option<u64>,
    pub tool_timeout_secs: Option<u64>,
    pub enable_verification: Option<bool>,
    pub enable_fallbacks: Option<bool>,
    pub favorite_color: Option<String>,
    pub preferred_language: Option<String>,
}

impl RunRequest {
    /// Overlay the request's overrides on the server defaults
    fn config(&self, defaults: &AgentConfig) -> AgentConfig {
        AgentConfig {
            max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
            llm_timeout: self
                .llm_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.llm_timeout),
            tool_timeout: self
                .tool_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.tool_timeout),
            enable_verification: self
                .enable_verification
                .unwrap_or(defaults.enable_verification),
            enable_fallbacks: self.enable_fallbacks.unwrap_or(defaults.enable_fallbacks),
            preferences: UserPreferences::new(
                self.favorite_color
                    .as_deref()
                    .unwrap_or(&defaults.preferences.favorite_color),
                self.preferred_language
                    .as_deref()
                    .unwrap_or(&defaults.preferences.preferred_language),
            ),
        }
    }
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<Agent>,
    pub audit_log: Arc<AuditLog>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Run Endpoint
/// =============================

async fn run_agent(
    State(state): State<ApiState>,
    Json(req): Json<RunRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let task = req.task.trim();
    if task.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("task must not be empty".into())),
        );
    }

    let config = req.config(state.agent.config());
    if let Err(e) = config.validate() {
        return (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string())));
    }

    info!(task = %task, max_iterations = config.max_iterations, "Received run request");

    // Dropping this handler (client gone) drops the run with it
    let response = state
        .agent
        .run_with(task, &config, CancellationToken::new())
        .await;

    (StatusCode::OK, Json(ApiResponse::success(response)))
}

/// =============================
/// Audit Endpoints
/// =============================

async fn list_runs(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    match state.audit_log.list().await {
        Ok(ids) => (StatusCode::OK, Json(ApiResponse::success(ids))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

async fn get_run(
    State(state): State<ApiState>,
    Path(run_id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.audit_log.get(run_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(ApiResponse::success(record))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("run {} not found", run_id))),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(agent: Arc<Agent>, audit_log: Arc<AuditLog>) -> Router {
    let state = ApiState { agent, audit_log };

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/agent/run", post(run_agent))
        .route("/api/v1/runs", get(list_runs))
        .route("/api/v1/runs/:run_id", get(get_run))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    agent: Arc<Agent>,
    audit_log: Arc<AuditLog>,
    port: u16,
) -> Result<()> {
    let router = create_router(agent, audit_log);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
