//! Tool invocation against the postgres MCP server.
//!
//! [`ToolInvoker`] validates the request, borrows the shared session from the
//! [`SessionManager`], runs a single deadline-bounded `tools/call`, and turns
//! the result into JSON. Any failure after the session was handed out
//! invalidates it so the next call starts from a fresh handshake.

use crate::core::config::data::PostgresMcpConfig;
use crate::mcp::content::{chunks_from_blocks, normalize};
use crate::mcp::error::McpCallError;
use rust_mcp_schema::CallToolRequestParams;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub(crate) mod protocol;
mod session;

pub use session::{McpSession, SessionConnector, SessionManager, StdioConnector};

/// Namespace prefix routed to the postgres MCP server.
pub const POSTGRES_MCP_PREFIX: &str = "postgres_mcp.";

/// Upper bound for a single `tools/call` exchange.
pub const MCP_CALL_TIMEOUT: Duration = Duration::from_secs(60);

const CALL_CANCELLED: &str = "MCP call cancelled.";
const DEADLINE_EXCEEDED: &str = "MCP call deadline exceeded.";

/// Cancellation and deadline inherited from whoever issued the call.
#[derive(Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    fn deadline_passed(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Bounds `work` by the caller's deadline alone.
    async fn within_deadline<T, F>(&self, work: F) -> Result<T, McpCallError>
    where
        F: Future<Output = Result<T, McpCallError>>,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, work)
                .await
                .unwrap_or_else(|_| Err(McpCallError::transport(DEADLINE_EXCEEDED))),
            None => work.await,
        }
    }

    /// The sooner of the caller's deadline and `now + bound`.
    fn call_deadline(&self, bound: Duration) -> Instant {
        let bounded = Instant::now() + bound;
        match self.deadline {
            Some(deadline) if deadline < bounded => deadline,
            _ => bounded,
        }
    }
}

pub struct ToolInvoker {
    config: PostgresMcpConfig,
    sessions: SessionManager,
}

impl ToolInvoker {
    pub fn new(config: PostgresMcpConfig) -> Self {
        Self::with_connector(config, Arc::new(StdioConnector::default()))
    }

    pub fn with_connector(config: PostgresMcpConfig, connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            sessions: SessionManager::new(config.clone(), connector),
            config,
        }
    }

    /// True when `tool` belongs to the namespace this invoker serves.
    pub fn handles(tool: &str) -> bool {
        tool.starts_with(POSTGRES_MCP_PREFIX)
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Calls `tool` with `arguments` and returns its normalized result.
    pub async fn call(
        &self,
        ctx: &CallContext,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<Value, McpCallError> {
        if self.config.database_uri.trim().is_empty() {
            return Err(McpCallError::Configuration(
                "missing_database_uri".to_string(),
            ));
        }
        let Some(tool_name) = tool.strip_prefix(POSTGRES_MCP_PREFIX) else {
            return Err(McpCallError::Request("invalid_tool_prefix".to_string()));
        };
        if tool_name.is_empty() {
            return Err(McpCallError::Request("missing_tool_name".to_string()));
        }

        if ctx.deadline_passed() {
            return Err(McpCallError::transport(DEADLINE_EXCEEDED));
        }

        let session = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return Err(McpCallError::transport(CALL_CANCELLED));
            }
            acquired = ctx.within_deadline(self.sessions.acquire()) => acquired?,
        };

        // The handshake may have used up the caller's budget. Such a call is
        // never sent and fails like any other expired call.
        let deadline = ctx.call_deadline(MCP_CALL_TIMEOUT);
        let outcome = if Instant::now() >= deadline {
            debug!(tool = %tool_name, "Caller deadline passed before the MCP call was sent");
            Err(McpCallError::transport(DEADLINE_EXCEEDED))
        } else {
            let params = CallToolRequestParams::new(tool_name).with_arguments(arguments);
            debug!(tool = %tool_name, "Calling MCP tool");
            tokio::select! {
                _ = ctx.cancel.cancelled() => Err(McpCallError::transport(CALL_CANCELLED)),
                result = tokio::time::timeout_at(deadline, session.call_tool(params)) => match result {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(reason)) => Err(McpCallError::Transport(reason)),
                    Err(_) => Err(McpCallError::transport(DEADLINE_EXCEEDED)),
                },
            }
        };

        let failure = match outcome {
            Ok(result) if result.is_error.unwrap_or(false) => McpCallError::Tool {
                tool: tool_name.to_string(),
                detail: protocol::tool_error_detail(&result),
            },
            Ok(result) => return Ok(normalize(&chunks_from_blocks(&result.content))),
            Err(err) => err,
        };

        warn!(
            tool = %tool_name,
            error_kind = failure.kind(),
            error = %failure,
            detail = ?tool_detail(&failure),
            "MCP call failed; dropping session"
        );
        self.sessions.invalidate(&session).await;
        Err(failure)
    }

    /// Closes the live session, if any.
    pub async fn shutdown(&self) {
        self.sessions.drop_session().await;
    }
}

fn tool_detail(err: &McpCallError) -> Option<&str> {
    match err {
        McpCallError::Tool { detail, .. } => detail.as_deref(),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod test_support;
