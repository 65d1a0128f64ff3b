//! HTTP API server for integration with other systems.
//!
//! Exposes chat turns, run cancellation and stored sessions as REST endpoints.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::MontageError;
use crate::handler::{check_config, ChatHandler, ChatRequest, SessionHandler};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

/// Shared application state.
struct AppState {
    chat: ChatHandler,
    sessions: SessionHandler,
    settings: Settings,
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    let chat = ChatHandler::new(&settings)?;
    let sessions = SessionHandler::new(chat.store());

    let state = Arc::new(AppState {
        chat,
        sessions,
        settings,
    });

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Montage API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET    /health");
    Output::kv("Agents", "GET    /agent");
    Output::kv("Chat", "POST   /chat");
    Output::kv("Stop run", "POST   /session/{session_id}/stop");
    Output::kv("List sessions", "GET    /session");
    Output::kv("Get session", "GET    /session/{session_id}");
    Output::kv("Delete session", "DELETE /session/{session_id}");
    Output::kv("Config check", "GET    /config/check");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/agent", get(list_agents))
        .route("/chat", post(chat))
        .route("/session", get(list_sessions))
        .route("/session/{session_id}", get(get_session).delete(delete_session))
        .route("/session/{session_id}/stop", post(stop_session))
        .route("/config/check", get(config_check))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Serialize)]
struct AgentInfo {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize)]
struct StopResponse {
    session_id: String,
    stopped: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Map a library error to an HTTP error response.
fn error_response(err: MontageError) -> Response {
    let status = match &err {
        MontageError::InvalidInput(_) | MontageError::UnknownCapability(_) => StatusCode::BAD_REQUEST,
        MontageError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn list_agents(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let agents: Vec<AgentInfo> = state
        .chat
        .registry()
        .iter()
        .map(|c| AgentInfo {
            name: c.name().to_string(),
            description: c.description().to_string(),
            parameters: c.parameters(),
        })
        .collect();
    Json(agents)
}

async fn chat(State(state): State<Arc<AppState>>, Json(request): Json<ChatRequest>) -> Response {
    match state.chat.chat(request).await {
        Ok(output) => Json(output).into_response(),
        Err(e) => error_response(e),
    }
}

async fn stop_session(State(state): State<Arc<AppState>>, Path(session_id): Path<String>) -> impl IntoResponse {
    let stopped = state.chat.stop(&session_id);
    Json(StopResponse { session_id, stopped })
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> Response {
    match state.sessions.list().await {
        Ok(records) => Json(records).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_session(State(state): State<Arc<AppState>>, Path(session_id): Path<String>) -> Response {
    match state.sessions.get(&session_id).await {
        Ok(details) => Json(details).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_session(State(state): State<Arc<AppState>>, Path(session_id): Path<String>) -> Response {
    if state.chat.is_running(&session_id) {
        return error_response(MontageError::InvalidInput(format!(
            "Session {} has a run in progress",
            session_id
        )));
    }
    match state.sessions.delete(&session_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

async fn config_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = state.chat.store();
    let check = check_config(&state.settings, store.as_ref()).await;
    let status = if check.ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(check))
}
