//! Error taxonomy for tool calls routed through the MCP client.

use thiserror::Error;

/// Failure classes surfaced by [`crate::mcp::client::ToolInvoker::call`].
///
/// Configuration and request errors are detected before any session work and
/// leave the cached session untouched. Transport and tool errors always
/// invalidate the session before they reach the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum McpCallError {
    /// A required connection parameter is absent.
    #[error("bad_request: {0}")]
    Configuration(String),

    /// The inbound request is malformed or not allowed.
    #[error("bad_request: {0}")]
    Request(String),

    /// Launch, channel I/O, handshake, cancellation, or deadline failure.
    #[error("{0}")]
    Transport(String),

    /// The tool ran and reported failure through the protocol's error flag.
    #[error("tool_error: {tool}")]
    Tool { tool: String, detail: Option<String> },
}

impl McpCallError {
    pub fn transport(reason: impl Into<String>) -> Self {
        McpCallError::Transport(reason.into())
    }

    /// Machine-readable class name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            McpCallError::Configuration(_) => "configuration",
            McpCallError::Request(_) => "request",
            McpCallError::Transport(_) => "transport",
            McpCallError::Tool { .. } => "tool",
        }
    }

    /// True for failures caused by the caller's input or the local setup.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            McpCallError::Configuration(_) | McpCallError::Request(_)
        )
    }
}
