use super::LaunchSpec;
use crate::mcp::client::protocol::parse_initialize_result;
use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
    ResultFromClient, ServerJsonrpcRequest, ServerMessage,
};
use rust_mcp_schema::{InitializeRequestParams, InitializeResult, RequestId, RpcError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

const STDIO_LOCK_TIMEOUT_SECONDS: u64 = 10;
const STDIO_WRITE_TIMEOUT_SECONDS: u64 = 10;
const STDIO_SHUTDOWN_TIMEOUT_SECONDS: u64 = 5;

#[derive(Default)]
struct PendingRequests {
    waiters: HashMap<RequestId, oneshot::Sender<ServerMessage>>,
    closed: bool,
}

type SharedPending = Arc<Mutex<PendingRequests>>;
type SharedStdin = Arc<Mutex<ChildStdin>>;

/// JSON-RPC client bound to a child process's stdin/stdout.
pub struct StdioClient {
    stdin: SharedStdin,
    child: Mutex<Option<Child>>,
    pending: SharedPending,
    next_request_id: AtomicI64,
    request_timeout: Duration,
}

impl StdioClient {
    /// Spawns the process described by `spec` and starts the reader tasks.
    pub fn spawn(spec: &LaunchSpec, request_timeout: Duration) -> Result<Arc<Self>, String> {
        debug!(program = %spec.program, args = ?spec.args, "Starting MCP stdio server");
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(key, value)| (key, value)))
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| format!("Failed to start {}: {err}", spec.program))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| "Unable to retrieve stdin.".to_string())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "Unable to retrieve stdout.".to_string())?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| "Unable to retrieve stderr.".to_string())?;

        let pending: SharedPending = Arc::new(Mutex::new(PendingRequests::default()));
        let stdin: SharedStdin = Arc::new(Mutex::new(stdin));
        Self::spawn_stdout_reader(pending.clone(), stdin.clone(), stdout);
        Self::spawn_stderr_drain(stderr);

        Ok(Arc::new(Self {
            stdin,
            child: Mutex::new(Some(child)),
            pending,
            next_request_id: AtomicI64::new(0),
            request_timeout,
        }))
    }

    fn spawn_stdout_reader(
        pending: SharedPending,
        stdin: SharedStdin,
        stdout: tokio::process::ChildStdout,
    ) {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                let value = match serde_json::from_str::<serde_json::Value>(&line) {
                    Ok(value) => value,
                    Err(_) => continue,
                };
                if let Some(items) = value.as_array() {
                    for item in items {
                        if let Ok(message) = serde_json::from_value::<ServerMessage>(item.clone()) {
                            Self::dispatch_message(&pending, &stdin, message).await;
                        }
                    }
                } else if let Ok(message) = serde_json::from_value::<ServerMessage>(value) {
                    Self::dispatch_message(&pending, &stdin, message).await;
                }
            }

            debug!("MCP stdio server closed stdout");
            let mut pending = pending.lock().await;
            pending.closed = true;
            pending.waiters.clear();
        });
    }

    fn spawn_stderr_drain(stderr: tokio::process::ChildStderr) {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(_)) = reader.next_line().await {}
        });
    }

    async fn dispatch_message(pending: &SharedPending, stdin: &SharedStdin, message: ServerMessage) {
        match &message {
            ServerMessage::Response(response) => {
                debug!(response_id = ?response.id, "Received MCP stdio response");
                if let Some(tx) = pending.lock().await.waiters.remove(&response.id) {
                    let _ = tx.send(message);
                }
            }
            ServerMessage::Error(error) => {
                debug!(
                    error_id = ?error.id,
                    error_code = error.error.code,
                    "Received MCP stdio error"
                );
                if let Some(id) = error.id.as_ref() {
                    if let Some(tx) = pending.lock().await.waiters.remove(id) {
                        let _ = tx.send(message);
                    }
                }
            }
            ServerMessage::Request(request) => {
                debug!(
                    request_id = ?request.request_id(),
                    method = %request.method(),
                    "Received MCP stdio server request"
                );
                let reply = reply_to_server_request(request);
                let stdin = stdin.clone();
                tokio::spawn(async move {
                    if let Err(err) = reply_to_server(&stdin, reply).await {
                        debug!(error = %err, "Failed to answer MCP stdio server request");
                    }
                });
            }
            ServerMessage::Notification(_) => {
                debug!("Received MCP stdio notification");
            }
        }
    }

    fn next_request_id(&self) -> RequestId {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        RequestId::Integer(id)
    }

    /// Sends one request and waits for the response with the matching id.
    pub async fn send_request(&self, request: RequestFromClient) -> Result<ServerMessage, String> {
        let request_id = self.next_request_id();
        debug!(request_id = ?request_id, "Sending MCP stdio request");
        let message = ClientMessage::from_message(
            MessageFromClient::RequestFromClient(request),
            Some(request_id.clone()),
        )
        .map_err(|err| err.to_string())?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err("MCP stdio server exited.".to_string());
            }
            pending.waiters.insert(request_id.clone(), tx);
        }

        if let Err(err) = self.write_message(&message).await {
            self.pending.lock().await.waiters.remove(&request_id);
            return Err(err);
        }
        debug!(request_id = ?request_id, "MCP stdio request sent");

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(message)) => {
                debug!(request_id = ?request_id, "MCP stdio response received");
                Ok(message)
            }
            Ok(Err(_)) => {
                debug!(request_id = ?request_id, "MCP stdio response channel closed");
                Err("MCP stdio response channel closed.".to_string())
            }
            Err(_) => {
                debug!(
                    request_id = ?request_id,
                    timeout_secs = self.request_timeout.as_secs(),
                    "MCP stdio request timed out"
                );
                self.pending.lock().await.waiters.remove(&request_id);
                Err("MCP stdio request timed out.".to_string())
            }
        }
    }

    pub async fn send_notification(
        &self,
        notification: NotificationFromClient,
    ) -> Result<(), String> {
        let message = ClientMessage::from_message(
            MessageFromClient::NotificationFromClient(notification),
            None,
        )
        .map_err(|err| err.to_string())?;
        self.write_message(&message).await?;
        debug!("MCP stdio notification sent");
        Ok(())
    }

    /// Runs the `initialize` exchange followed by the `initialized` notification.
    pub async fn initialize(
        &self,
        details: InitializeRequestParams,
    ) -> Result<InitializeResult, String> {
        let response = self
            .send_request(RequestFromClient::InitializeRequest(details))
            .await?;
        let result = parse_initialize_result(response)?;
        self.send_notification(NotificationFromClient::InitializedNotification(None))
            .await?;
        Ok(result)
    }

    async fn write_message(&self, message: &ClientMessage) -> Result<(), String> {
        write_line(&self.stdin, message).await
    }

    /// Kills the child and fails any request still waiting for an answer.
    pub async fn close(&self) -> Result<(), String> {
        {
            let mut pending = self.pending.lock().await;
            pending.closed = true;
            pending.waiters.clear();
        }

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        child.start_kill().map_err(|err| err.to_string())?;
        tokio::time::timeout(
            Duration::from_secs(STDIO_SHUTDOWN_TIMEOUT_SECONDS),
            child.wait(),
        )
        .await
        .map_err(|_| "Timed out waiting for MCP stdio server to exit.".to_string())?
        .map_err(|err| err.to_string())?;
        debug!("MCP stdio server stopped");
        Ok(())
    }
}

/// Answers a request the server sent us. Only `ping` is supported; anything
/// else is refused with a JSON-RPC method-not-found error.
fn reply_to_server_request(request: &ServerJsonrpcRequest) -> (RequestId, MessageFromClient) {
    let request_id = request.request_id().clone();
    let reply = match request {
        ServerJsonrpcRequest::PingRequest(_) => MessageFromClient::ResultFromClient(
            ResultFromClient::Result(rust_mcp_schema::Result::default()),
        ),
        other => MessageFromClient::Error(
            RpcError::method_not_found()
                .with_message(format!("Unsupported MCP request from server: {}", other.method())),
        ),
    };
    (request_id, reply)
}

async fn reply_to_server(
    stdin: &Mutex<ChildStdin>,
    (request_id, reply): (RequestId, MessageFromClient),
) -> Result<(), String> {
    let message = ClientMessage::from_message(reply, Some(request_id.clone()))
        .map_err(|err| err.to_string())?;
    write_line(stdin, &message).await?;
    debug!(request_id = ?request_id, "Answered MCP stdio server request");
    Ok(())
}

async fn write_line(stdin: &Mutex<ChildStdin>, message: &ClientMessage) -> Result<(), String> {
    let payload = serde_json::to_string(message).map_err(|err| err.to_string())?;
    let lock_timeout = Duration::from_secs(STDIO_LOCK_TIMEOUT_SECONDS);
    let write_timeout = Duration::from_secs(STDIO_WRITE_TIMEOUT_SECONDS);
    let mut stdin = tokio::time::timeout(lock_timeout, stdin.lock())
        .await
        .map_err(|_| "Timed out waiting for MCP stdio stdin lock.".to_string())?;
    debug!(bytes = payload.len(), "Writing MCP stdio message");
    tokio::time::timeout(write_timeout, stdin.write_all(payload.as_bytes()))
        .await
        .map_err(|_| "Timed out writing MCP stdio message.".to_string())?
        .map_err(|err| err.to_string())?;
    tokio::time::timeout(write_timeout, stdin.write_all(b"\n"))
        .await
        .map_err(|_| "Timed out writing MCP stdio newline.".to_string())?
        .map_err(|err| err.to_string())?;
    tokio::time::timeout(write_timeout, stdin.flush())
        .await
        .map_err(|_| "Timed out flushing MCP stdio message.".to_string())?
        .map_err(|err| err.to_string())?;
    Ok(())
}
