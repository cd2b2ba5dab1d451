//! HTTP Handlers

use std::collections::BTreeMap;
use std::convert::Infallible;

use async_stream::stream;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::json;

use docagent_core::AgentError;

use crate::acp::{
    AgentManifest, AgentsResponse, ErrorResponse, GenericEventPayload, MessagePartPayload, Run,
    RunCreateRequest, RunEventPayload, RunMode, RunStatus,
};
use crate::agents::{find_agent, FragmentStream, OutputFragment, RunContext, AGENTS};
use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model_backend_connected: bool,
    pub session_initialized: bool,
    pub tool_count: usize,
}

fn error_response(e: &AgentError) -> ErrorResponse {
    let code = match e {
        AgentError::UnsupportedRole(_) => "UNSUPPORTED_ROLE",
        AgentError::InvalidInput(_) => "INVALID_INPUT",
        AgentError::Initialization(_) => "INITIALIZATION_ERROR",
        _ => "AGENT_ERROR",
    };
    ErrorResponse {
        error: e.user_message(),
        code: code.into(),
    }
}

fn api_error(e: &AgentError) -> ApiError {
    let status = if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(error_response(e)))
}

fn agent_not_found(name: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Agent '{name}' not found"),
            code: "AGENT_NOT_FOUND".into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Liveness check
pub async fn ping() -> Json<serde_json::Value> {
    Json(json!({}))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ready = state.session.ready().await;
    let model_backend_connected = match &state.backend {
        Some(model) => model.backend_available().await,
        None => false,
    };

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        model_backend_connected,
        session_initialized: ready.is_some(),
        tool_count: ready.map_or(0, |r| r.tool_count()),
    })
}

/// List the served agents
pub async fn list_agents() -> Json<AgentsResponse> {
    Json(AgentsResponse {
        agents: AGENTS.iter().map(|agent| agent.manifest()).collect(),
    })
}

/// Describe one agent
pub async fn get_agent(Path(name): Path<String>) -> Result<Json<AgentManifest>, ApiError> {
    find_agent(&name)
        .map(|agent| Json(agent.manifest()))
        .ok_or_else(|| agent_not_found(&name))
}

/// Start a run, either synchronously or as a server-sent event stream
pub async fn create_run(
    State(state): State<AppState>,
    Json(request): Json<RunCreateRequest>,
) -> Result<Response, ApiError> {
    let agent = find_agent(&request.agent_name).ok_or_else(|| agent_not_found(&request.agent_name))?;

    let run = Run::new(agent.name, request.session_id);
    let context = RunContext {
        run_id: run.run_id,
        session_id: run.session_id,
    };
    tracing::info!(run_id = %run.run_id, agent = agent.name, mode = ?request.mode, "Run created");

    let fragments = (agent.run)(state.session.clone(), request.input, context);

    match request.mode {
        RunMode::Sync => run_sync(run, fragments).await.map(IntoResponse::into_response),
        RunMode::Stream => Ok(Sse::new(run_events(run, fragments))
            .keep_alive(KeepAlive::default())
            .into_response()),
    }
}

async fn run_sync(mut run: Run, mut fragments: FragmentStream) -> Result<Json<Run>, ApiError> {
    run.status = RunStatus::InProgress;
    let mut parts = Vec::new();

    while let Some(fragment) = fragments.next().await {
        match fragment {
            Ok(OutputFragment::Update { key, value }) => {
                tracing::debug!(run_id = %run.run_id, %key, %value, "Run update");
            }
            Ok(OutputFragment::Message(part)) => parts.push(part),
            Err(e) => {
                tracing::error!(run_id = %run.run_id, error = %e, "Run failed");
                return Err(api_error(&e));
            }
        }
    }

    run.complete(parts);
    tracing::info!(run_id = %run.run_id, "Run completed");
    Ok(Json(run))
}

fn sse_event<T: Serialize>(name: &str, payload: &T) -> Event {
    Event::default().event(name).json_data(payload).unwrap_or_else(|e| {
        tracing::error!(event = name, error = %e, "Failed to encode event");
        Event::default().event("error").data(e.to_string())
    })
}

fn run_events(mut run: Run, mut fragments: FragmentStream) -> impl Stream<Item = Result<Event, Infallible>> {
    stream! {
        yield Ok(sse_event("run.created", &RunEventPayload { run: &run }));
        run.status = RunStatus::InProgress;

        let mut parts = Vec::new();
        let mut failure = None;
        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(OutputFragment::Update { key, value }) => {
                    let generic = BTreeMap::from([(key.to_string(), value)]);
                    yield Ok(sse_event("generic", &GenericEventPayload { generic }));
                }
                Ok(OutputFragment::Message(part)) => {
                    yield Ok(sse_event("message.part", &MessagePartPayload { part: &part }));
                    parts.push(part);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failure {
            tracing::error!(run_id = %run.run_id, error = %e, "Run failed");
            run.fail(error_response(&e));
            yield Ok(sse_event("run.failed", &RunEventPayload { run: &run }));
        } else {
            run.complete(parts);
            tracing::info!(run_id = %run.run_id, "Run completed");
            yield Ok(sse_event("run.completed", &RunEventPayload { run: &run }));
        }
    }
}
