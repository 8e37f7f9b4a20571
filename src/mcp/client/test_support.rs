//! In-process stand-ins for the container-backed MCP session.

use super::{McpSession, SessionConnector};
use crate::core::config::data::{AccessMode, PostgresMcpConfig};
use crate::mcp::error::McpCallError;
use async_trait::async_trait;
use rust_mcp_schema::{CallToolRequestParams, CallToolResult};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) fn configured() -> PostgresMcpConfig {
    PostgresMcpConfig {
        database_uri: "postgres://app@localhost:5432/app".to_string(),
        access_mode: AccessMode::Restricted,
        docker_image: "crystaldba/postgres-mcp".to_string(),
    }
}

pub(crate) fn unconfigured() -> PostgresMcpConfig {
    PostgresMcpConfig {
        database_uri: String::new(),
        ..configured()
    }
}

/// Scripted answer for the next `tools/call`.
#[derive(Debug, Clone)]
pub(crate) enum FakeReply {
    Text(String),
    Content(Value),
    ToolError(String),
    Fail(String),
    Hang,
}

#[derive(Default)]
pub(crate) struct FakeState {
    handshakes: AtomicUsize,
    closes: AtomicUsize,
    handshake_delay: Mutex<Duration>,
    handshake_failure: Mutex<Option<String>>,
    replies: Mutex<VecDeque<FakeReply>>,
    calls: Mutex<Vec<(String, Option<Map<String, Value>>)>>,
}

/// Connector counting handshakes and serving scripted replies.
#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
    state: Arc<FakeState>,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn handshakes(&self) -> usize {
        self.state.handshakes.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> Vec<(String, Option<Map<String, Value>>)> {
        self.state.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn push_reply(&self, reply: FakeReply) {
        self.state
            .replies
            .lock()
            .expect("replies lock")
            .push_back(reply);
    }

    pub(crate) fn set_handshake_delay(&self, delay: Duration) {
        *self.state.handshake_delay.lock().expect("delay lock") = delay;
    }

    pub(crate) fn fail_handshakes(&self, reason: Option<&str>) {
        *self.state.handshake_failure.lock().expect("failure lock") = reason.map(str::to_string);
    }
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn connect(
        &self,
        _config: &PostgresMcpConfig,
    ) -> Result<Arc<dyn McpSession>, McpCallError> {
        self.state.handshakes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.handshake_delay.lock().expect("delay lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failure = self
            .state
            .handshake_failure
            .lock()
            .expect("failure lock")
            .clone();
        if let Some(reason) = failure {
            return Err(McpCallError::Transport(reason));
        }
        Ok(Arc::new(FakeSession {
            state: self.state.clone(),
        }))
    }
}

struct FakeSession {
    state: Arc<FakeState>,
}

fn call_result(value: Value) -> CallToolResult {
    serde_json::from_value(value).expect("scripted result should parse")
}

#[async_trait]
impl McpSession for FakeSession {
    async fn call_tool(&self, params: CallToolRequestParams) -> Result<CallToolResult, String> {
        self.state
            .calls
            .lock()
            .expect("calls lock")
            .push((params.name.clone(), params.arguments.clone()));
        let reply = self
            .state
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| FakeReply::Text("{}".to_string()));

        match reply {
            FakeReply::Text(text) => Ok(call_result(json!({
                "content": [{"type": "text", "text": text}]
            }))),
            FakeReply::Content(content) => Ok(call_result(json!({ "content": content }))),
            FakeReply::ToolError(text) => Ok(call_result(json!({
                "content": [{"type": "text", "text": text}],
                "isError": true
            }))),
            FakeReply::Fail(reason) => Err(reason),
            FakeReply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err("hung call finished".to_string())
            }
        }
    }

    async fn close(&self) -> Result<(), String> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
