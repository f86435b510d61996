//! HTTP + WebSocket surface: `POST /api/ask`, `GET
//! /api/system-state`, `GET /api/recent-requests`, `WS /ws/request/{id}`.
//!
//! A plain axum router/state pair, since the request/response and
//! streaming shape here needs a real `GET`/`WS` surface rather than a
//! raw socket protocol.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use milton_core::{Agent, RequestStatus};
use milton_router::RouteClient;

use crate::pipeline::RequestGateway;

#[derive(Clone)]
pub struct AppState<C: RouteClient + Send + Sync + 'static> {
    pub gateway: Arc<RequestGateway<C>>,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
    /// Caller-specified agent to hand the request to directly, bypassing
    /// routing classification.
    #[serde(default)]
    pub agent: Option<Agent>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub request_id: Uuid,
    pub status: &'static str,
    pub agent_assigned: Option<Agent>,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComponentHealth {
    Up,
    Down,
    Degraded,
}

#[derive(Debug, Serialize)]
pub struct AgentComponentStatus {
    pub status: ComponentHealth,
    pub last_check: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ExecutorComponentStatus {
    pub status: ComponentHealth,
    pub last_check: DateTime<Utc>,
    pub running_jobs: usize,
    pub queued_jobs: usize,
}

#[derive(Debug, Serialize)]
pub struct MemoryComponentStatus {
    pub status: ComponentHealth,
    pub last_check: DateTime<Utc>,
    pub vector_count: usize,
    pub memory_mb: f64,
}

#[derive(Debug, Serialize)]
pub struct SystemStateResponse {
    pub hub: AgentComponentStatus,
    pub executor: ExecutorComponentStatus,
    pub researcher: AgentComponentStatus,
    pub memory: MemoryComponentStatus,
}

/// Rough per-record memory footprint used to turn a tier's row count into
/// an approximate `memory_mb` figure — there's no real vector index behind
/// these tiers to measure directly.
const APPROX_BYTES_PER_MEMORY_RECORD: f64 = 2048.0;

pub fn router<C: RouteClient + Send + Sync + 'static>(state: AppState<C>) -> Router {
    Router::new()
        .route("/api/ask", post(ask::<C>))
        .route("/api/system-state", get(system_state::<C>))
        .route("/api/recent-requests", get(recent_requests::<C>))
        .route("/ws/request/{id}", get(ws_request::<C>))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ask<C: RouteClient + Send + Sync + 'static>(
    State(state): State<AppState<C>>,
    Json(body): Json<AskRequest>,
) -> Response {
    match state.gateway.submit(body.query, body.agent, None).await {
        Ok(outcome) => Json(AskResponse {
            request_id: outcome.request_id,
            status: "accepted",
            agent_assigned: outcome.agent_assigned,
            confidence: outcome.confidence,
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "ask submission failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
        }
    }
}

/// Derive a component's health from the failure ratio among its recent
/// requests: all-failed is Down, any-failed is Degraded, otherwise Up. An
/// agent with no recent traffic is reported Up — there's nothing indicating
/// it isn't.
fn agent_health(recent: &[milton_core::Request], agent: Agent) -> ComponentHealth {
    let relevant: Vec<_> = recent.iter().filter(|r| r.agent == Some(agent)).collect();
    if relevant.is_empty() {
        return ComponentHealth::Up;
    }
    let failed = relevant.iter().filter(|r| r.status == RequestStatus::Failed).count();
    if failed == relevant.len() {
        ComponentHealth::Down
    } else if failed > 0 {
        ComponentHealth::Degraded
    } else {
        ComponentHealth::Up
    }
}

async fn system_state<C: RouteClient + Send + Sync + 'static>(State(state): State<AppState<C>>) -> impl IntoResponse {
    let recent = state.gateway.recent(200).await;
    let now = Utc::now();

    let running_jobs = recent
        .iter()
        .filter(|r| r.agent == Some(Agent::Executor) && r.status == RequestStatus::Running)
        .count();
    let queued_jobs = recent
        .iter()
        .filter(|r| r.agent == Some(Agent::Executor) && r.status == RequestStatus::Pending)
        .count();

    let memory_stats = state.gateway.memory().stats().await;
    let vector_count = memory_stats.short_term + memory_stats.working + memory_stats.long_term;

    Json(SystemStateResponse {
        hub: AgentComponentStatus { status: agent_health(&recent, Agent::Hub), last_check: now },
        executor: ExecutorComponentStatus {
            status: agent_health(&recent, Agent::Executor),
            last_check: now,
            running_jobs,
            queued_jobs,
        },
        researcher: AgentComponentStatus { status: agent_health(&recent, Agent::Researcher), last_check: now },
        memory: MemoryComponentStatus {
            status: ComponentHealth::Up,
            last_check: now,
            vector_count,
            memory_mb: (vector_count as f64 * APPROX_BYTES_PER_MEMORY_RECORD) / (1024.0 * 1024.0),
        },
    })
}

async fn recent_requests<C: RouteClient + Send + Sync + 'static>(State(state): State<AppState<C>>) -> impl IntoResponse {
    Json(state.gateway.recent(50).await)
}

async fn ws_request<C: RouteClient + Send + Sync + 'static>(
    ws: WebSocketUpgrade,
    Path(id): Path<Uuid>,
    State(state): State<AppState<C>>,
) -> Response {
    ws.on_upgrade(move |socket| stream_request(socket, id, state))
}

async fn stream_request<C: RouteClient + Send + Sync + 'static>(mut socket: WebSocket, id: Uuid, state: AppState<C>) {
    let Some(mut rx) = state.gateway.subscribe(id).await else {
        let _ = socket.send(Message::Text(r#"{"error":"unknown request id"}"#.into())).await;
        return;
    };

    loop {
        match rx.recv().await {
            Ok(event) => {
                let Ok(payload) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    return;
                }
                if event.is_terminal() {
                    return;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
    }
}
