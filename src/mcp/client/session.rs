//! Lazily established, invalidate-on-failure MCP session slot.

use super::protocol::{client_details, parse_call_tool};
use crate::core::config::data::PostgresMcpConfig;
use crate::mcp::error::McpCallError;
use crate::mcp::transport::stdio::StdioClient;
use crate::mcp::transport::LaunchSpec;
use async_trait::async_trait;
use rust_mcp_schema::schema_utils::RequestFromClient;
use rust_mcp_schema::{CallToolRequestParams, CallToolResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const STDIO_REQUEST_TIMEOUT_SECONDS: u64 = 60;

/// An established RPC connection able to run tool calls.
#[async_trait]
pub trait McpSession: Send + Sync {
    async fn call_tool(&self, params: CallToolRequestParams) -> Result<CallToolResult, String>;

    async fn close(&self) -> Result<(), String>;
}

/// Launches a server process and completes the protocol handshake.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(
        &self,
        config: &PostgresMcpConfig,
    ) -> Result<Arc<dyn McpSession>, McpCallError>;
}

/// Connector that runs the server in a container and talks over its stdio.
pub struct StdioConnector {
    request_timeout: Duration,
}

impl Default for StdioConnector {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(STDIO_REQUEST_TIMEOUT_SECONDS),
        }
    }
}

#[async_trait]
impl SessionConnector for StdioConnector {
    async fn connect(
        &self,
        config: &PostgresMcpConfig,
    ) -> Result<Arc<dyn McpSession>, McpCallError> {
        let spec = LaunchSpec::postgres_container(config);
        let client =
            StdioClient::spawn(&spec, self.request_timeout).map_err(McpCallError::Transport)?;

        match client.initialize(client_details()).await {
            Ok(details) => {
                info!(
                    server = %details.server_info.name,
                    server_version = %details.server_info.version,
                    protocol_version = %details.protocol_version,
                    "MCP session established"
                );
                Ok(Arc::new(StdioSession { client }))
            }
            Err(err) => {
                let _ = client.close().await;
                Err(McpCallError::transport(format!(
                    "MCP handshake failed: {err}"
                )))
            }
        }
    }
}

struct StdioSession {
    client: Arc<StdioClient>,
}

#[async_trait]
impl McpSession for StdioSession {
    async fn call_tool(&self, params: CallToolRequestParams) -> Result<CallToolResult, String> {
        let response = self
            .client
            .send_request(RequestFromClient::CallToolRequest(params))
            .await?;
        parse_call_tool(response)
    }

    async fn close(&self) -> Result<(), String> {
        self.client.close().await
    }
}

#[derive(Default)]
struct SessionSlot {
    session: Option<Arc<dyn McpSession>>,
    /// Outcome of the most recent failed handshake, tagged with its attempt number.
    last_failure: Option<(u64, McpCallError)>,
}

/// Owns at most one live session and serializes its creation and teardown.
pub struct SessionManager {
    config: PostgresMcpConfig,
    connector: Arc<dyn SessionConnector>,
    slot: Mutex<SessionSlot>,
    finished_attempts: AtomicU64,
}

impl SessionManager {
    pub fn new(config: PostgresMcpConfig, connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            config,
            connector,
            slot: Mutex::new(SessionSlot::default()),
            finished_attempts: AtomicU64::new(0),
        }
    }

    /// Returns the cached session, creating it on first use.
    ///
    /// Callers queued behind an in-flight handshake share its result, failure
    /// included. A failure is never cached for callers arriving afterwards.
    pub async fn acquire(&self) -> Result<Arc<dyn McpSession>, McpCallError> {
        let observed = self.finished_attempts.load(Ordering::SeqCst);
        let mut slot = self.slot.lock().await;

        if let Some(session) = &slot.session {
            return Ok(session.clone());
        }
        if let Some((attempt, err)) = &slot.last_failure {
            if *attempt > observed {
                debug!("Sharing failure of concurrent MCP handshake");
                return Err(err.clone());
            }
        }

        debug!("Establishing MCP session");
        let result = self.connector.connect(&self.config).await;
        let attempt = self.finished_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        match result {
            Ok(session) => {
                slot.session = Some(session.clone());
                slot.last_failure = None;
                Ok(session)
            }
            Err(err) => {
                warn!(error = %err, attempt, "MCP session could not be established");
                slot.last_failure = Some((attempt, err.clone()));
                Err(err)
            }
        }
    }

    /// Drops `session` if it is still the cached one. A session already
    /// replaced by a newer handshake was closed by whoever replaced it.
    pub async fn invalidate(&self, session: &Arc<dyn McpSession>) {
        let mut slot = self.slot.lock().await;
        let is_current = slot
            .session
            .as_ref()
            .is_some_and(|current| std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(session)));
        if !is_current {
            return;
        }
        if let Some(current) = slot.session.take() {
            close_quietly(current).await;
        }
    }

    /// Closes and forgets the cached session. No-op when none exists.
    pub async fn drop_session(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(current) = slot.session.take() {
            close_quietly(current).await;
        }
    }

    pub async fn has_session(&self) -> bool {
        self.slot.lock().await.session.is_some()
    }
}

async fn close_quietly(session: Arc<dyn McpSession>) {
    if let Err(err) = session.close().await {
        debug!(error = %err, "Ignoring MCP session close failure");
    }
}
