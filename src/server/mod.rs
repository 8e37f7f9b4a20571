//! HTTP gateway in front of the MCP tool invoker, the server registry and the
//! notes repository.

use crate::core::config::Config;
use crate::mcp::client::{CallContext, ToolInvoker};
use crate::mcp::error::McpCallError;
use crate::notes::{FileNotes, NotesError, NotesRepository};
use crate::store::{FileStore, NewServer};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared handles behind every route.
#[derive(Clone)]
pub struct AppState {
    invoker: Arc<ToolInvoker>,
    store: Arc<FileStore>,
    notes: Arc<dyn NotesRepository>,
}

impl AppState {
    pub fn new(
        invoker: Arc<ToolInvoker>,
        store: Arc<FileStore>,
        notes: Arc<dyn NotesRepository>,
    ) -> Self {
        Self {
            invoker,
            store,
            notes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(ToolInvoker::new(config.postgres_mcp.clone())),
            Arc::new(FileStore::new(config.servers_path.clone())),
            Arc::new(FileNotes::new(config.notes_path.clone())),
        )
    }

    pub fn invoker(&self) -> &Arc<ToolInvoker> {
        &self.invoker
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/mcp/servers", get(list_servers).post(create_server))
        .route("/mcp/validate", post(validate_server))
        .route("/mcp/call", post(call_tool))
        .route(
            "/learning/english/notes/{word_id}",
            get(get_note).put(put_note),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `config`'s address and serves until Ctrl-C, then closes the live
/// tool session.
pub async fn serve(config: &Config) -> std::io::Result<()> {
    let state = AppState::from_config(config);
    let invoker = state.invoker().clone();
    let addr = config.bind_addr();

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP gateway listening");
    if config.postgres_mcp.database_uri.trim().is_empty() {
        warn!("No database URI configured; postgres_mcp calls will be rejected");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP gateway stopped; closing MCP session");
    invoker.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("ctrl_c received; shutting down"),
        Err(err) => {
            warn!(error = %err, "Unable to listen for ctrl_c; running until killed");
            std::future::pending::<()>().await;
        }
    }
}

fn json_response(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    json_response(status, json!({"error": code, "message": message.into()}))
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Option<T> {
    serde_json::from_slice(body).ok()
}

async fn healthz() -> Response {
    json_response(
        StatusCode::OK,
        json!({
            "ok": true,
            "time": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }),
    )
}

async fn list_servers(State(state): State<AppState>) -> Response {
    match state.store.list().await {
        Ok(servers) => (StatusCode::OK, Json(servers)).into_response(),
        Err(err) => {
            warn!(error = %err, "Listing MCP servers failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "servers_list_failed",
                err.to_string(),
            )
        }
    }
}

async fn create_server(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(server) = parse_body::<NewServer>(&body) else {
        return json_response(StatusCode::BAD_REQUEST, json!({"error": "bad_json"}));
    };
    match state.store.create(server).await {
        Ok(created) => (StatusCode::OK, Json(created)).into_response(),
        Err(err) => error_response(
            StatusCode::BAD_REQUEST,
            "servers_create_failed",
            err.to_string(),
        ),
    }
}

#[derive(Deserialize)]
struct ValidateRequest {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    name: String,
}

#[derive(Serialize, Default)]
struct ValidateResponse {
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
}

impl ValidateResponse {
    fn failed(error: &'static str) -> Response {
        let body = ValidateResponse {
            state: "error",
            error: Some(error),
            ..Default::default()
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// Accepts any non-blank type and name; the type doubles as the publisher.
async fn validate_server(body: Bytes) -> Response {
    let Some(request) = parse_body::<ValidateRequest>(&body) else {
        return ValidateResponse::failed("bad_json");
    };
    let kind = request.kind.trim();
    let name = request.name.trim();
    if kind.is_empty() || name.is_empty() {
        return ValidateResponse::failed("missing_type_or_name");
    }
    let body = ValidateResponse {
        state: "ok",
        name: Some(name.to_string()),
        publisher: Some(kind.to_string()),
        error: None,
    };
    (StatusCode::OK, Json(body)).into_response()
}

#[derive(Deserialize)]
struct CallRequest {
    #[serde(default)]
    tool: String,
    #[serde(default)]
    args: Option<Map<String, Value>>,
}

async fn call_tool(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(request) = parse_body::<CallRequest>(&body) else {
        return json_response(StatusCode::BAD_REQUEST, json!({"error": "bad_json"}));
    };
    let tool = request.tool.trim().to_string();
    if tool.is_empty() {
        return json_response(StatusCode::BAD_REQUEST, json!({"error": "missing_tool"}));
    }
    if !ToolInvoker::handles(&tool) {
        return json_response(
            StatusCode::BAD_REQUEST,
            json!({"error": "unknown_tool", "tool": tool}),
        );
    }

    let args = request.args.unwrap_or_default();
    match run_call(state.invoker.clone(), tool, args).await {
        Ok(value) => json_response(StatusCode::OK, value),
        Err(err) => {
            let status = if err.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            error_response(status, "mcp_call_failed", err.to_string())
        }
    }
}

/// Runs the call on its own task so that a dropped request cancels it
/// through the invoker's failure path instead of abandoning it mid-flight.
async fn run_call(
    invoker: Arc<ToolInvoker>,
    tool: String,
    args: Map<String, Value>,
) -> Result<Value, McpCallError> {
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    let ctx = CallContext::new().with_cancel(cancel);

    tokio::spawn(async move { invoker.call(&ctx, &tool, args).await })
        .await
        .map_err(|err| McpCallError::transport(format!("MCP call task failed: {err}")))?
}

#[derive(Deserialize)]
struct NoteBody {
    #[serde(default)]
    content_md: String,
}

fn notes_error(err: NotesError) -> Response {
    match err {
        NotesError::MissingWordId => {
            json_response(StatusCode::BAD_REQUEST, json!({"error": "word_id_required"}))
        }
        NotesError::Storage(_) => {
            warn!(error = %err, "Notes repository failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "notes_failed",
                err.to_string(),
            )
        }
    }
}

async fn get_note(State(state): State<AppState>, Path(word_id): Path<String>) -> Response {
    match state.notes.get(&word_id).await {
        Ok(Some(note)) => (StatusCode::OK, Json(note)).into_response(),
        Ok(None) => json_response(StatusCode::NOT_FOUND, json!({"error": "not_found"})),
        Err(err) => notes_error(err),
    }
}

async fn put_note(
    State(state): State<AppState>,
    Path(word_id): Path<String>,
    body: Bytes,
) -> Response {
    let Some(note) = parse_body::<NoteBody>(&body) else {
        return json_response(StatusCode::BAD_REQUEST, json!({"error": "bad_json"}));
    };
    match state.notes.upsert(&word_id, note.content_md).await {
        Ok(saved) => (StatusCode::OK, Json(saved)).into_response(),
        Err(err) => notes_error(err),
    }
}
