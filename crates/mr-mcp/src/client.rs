//! Owns one MCP server child process: its stdin/stdout/stderr, a reader task
//! that demultiplexes incoming frames, and the pending-response bookkeeping
//! that lets many concurrent callers share one pipe.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use mr_config::Config;
use mr_protocol::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse};
use mr_types::{RouterError, RouterResult};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex as AsyncMutex, Notify};
use uuid::Uuid;

type NotificationHandler = Arc<dyn Fn(Value) + Send + Sync>;
type OnClose = Box<dyn Fn() + Send + Sync>;

/// Monotonic source for [`StdioClient::id`]. A freed `Arc<StdioClient>`'s
/// allocation can be reused by the very next spawn (same size class, back to
/// back), so identity checks elsewhere (e.g. `SseSession::claim_notification_slot`)
/// must not compare `Arc` addresses — mirrors the teacher's
/// `next_handler_id: Arc<AtomicU64>` in `lr-mcp/src/manager.rs`.
static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// One child process speaking line-delimited JSON-RPC 2.0 on stdio.
///
/// `pendingByRewrittenId` and `originalById` (spec §3) are scoped to this
/// instance rather than to the whole process — see the REDESIGN FLAGS
/// entry in SPEC_FULL.md.
pub struct StdioClient {
    id: u64,
    config: Config,
    child: AsyncMutex<Option<Child>>,
    stdin: AsyncMutex<Option<ChildStdin>>,
    pending: Mutex<HashMap<String, oneshot::Sender<Value>>>,
    original_by_id: Mutex<HashMap<String, Value>>,
    notification_handlers: RwLock<Vec<NotificationHandler>>,
    closed: AtomicBool,
    done: Notify,
    error: Mutex<Option<String>>,
    on_close: Mutex<Option<OnClose>>,
}

impl StdioClient {
    /// Spawns `sh -c <cmd>`, pipes its stdio, and launches the reader and
    /// stderr-drainer tasks. `on_close` is the Registry's deregistration
    /// callback (spec §4.2): it runs exactly once, from [`Self::close`],
    /// and removes only this client's own entry.
    pub async fn spawn(config: Config, on_close: impl Fn() + Send + Sync + 'static) -> RouterResult<Arc<Self>> {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&config.cmd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| RouterError::Spawn(format!("{}: {e}", config.cmd)))?;

        let stdin = match child.stdin.take() {
            Some(s) => s,
            None => return Err(Self::abort_partial_spawn(child, "missing stdin pipe").await),
        };
        let stdout = match child.stdout.take() {
            Some(s) => s,
            None => return Err(Self::abort_partial_spawn(child, "missing stdout pipe").await),
        };
        let stderr = match child.stderr.take() {
            Some(s) => s,
            None => return Err(Self::abort_partial_spawn(child, "missing stderr pipe").await),
        };

        let client = Arc::new(Self {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            config,
            child: AsyncMutex::new(Some(child)),
            stdin: AsyncMutex::new(Some(stdin)),
            pending: Mutex::new(HashMap::new()),
            original_by_id: Mutex::new(HashMap::new()),
            notification_handlers: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
            done: Notify::new(),
            error: Mutex::new(None),
            on_close: Mutex::new(Some(Box::new(on_close))),
        });

        let reader = client.clone();
        tokio::spawn(async move { reader.run_reader(stdout).await });

        let drainer = client.clone();
        tokio::spawn(async move { drainer.run_stderr(stderr).await });

        Ok(client)
    }

    async fn abort_partial_spawn(mut child: Child, reason: &str) -> RouterError {
        let _ = child.kill().await;
        let _ = child.wait().await;
        RouterError::Spawn(reason.to_string())
    }

    /// Stable identity for this client, unique for the process's lifetime.
    /// Use this instead of `Arc::as_ptr`/address comparisons: a closed
    /// client's allocation can be reused by the next `spawn` before every
    /// caller has dropped its `Arc`.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Non-blocking poll of the latched fatal error (spec §4.1 `Error()`).
    pub fn error(&self) -> Option<String> {
        self.error.lock().clone()
    }

    /// Appends a notification handler, invoked in registration order on
    /// every server-pushed notification (spec §4.1 `OnNotification`).
    pub fn on_notification(&self, handler: NotificationHandler) {
        self.notification_handlers.write().push(handler);
    }

    /// `SendMessage` per spec §4.1: mints a fresh id for requests, writes
    /// the (possibly rewritten) line to stdin, and waits for the matching
    /// response, client closure, or a fatal transport error.
    pub async fn send_message(&self, raw: Value) -> RouterResult<Option<Value>> {
        if !mr_protocol::is_jsonrpc_2(&raw) {
            return Err(RouterError::InvalidRequest(
                "message is missing a jsonrpc 2.0 envelope".into(),
            ));
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }

        let Some(original_id) = mr_protocol::take_id(&raw) else {
            self.write_line(&raw).await?;
            return Ok(None);
        };

        let new_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(new_id.clone(), tx);
        self.original_by_id
            .lock()
            .insert(new_id.clone(), original_id);

        if self.closed.load(Ordering::Acquire) {
            self.pending.lock().remove(&new_id);
            self.original_by_id.lock().remove(&new_id);
            return Err(self.closed_error());
        }

        let mut rewritten = raw;
        mr_protocol::set_id(&mut rewritten, Value::String(new_id.clone()));

        if let Err(e) = self.write_line(&rewritten).await {
            self.pending.lock().remove(&new_id);
            self.original_by_id.lock().remove(&new_id);
            self.close_internal(Some(format!("stdin write error: {e}")))
                .await;
            return Err(e);
        }

        let result = rx.await.map(Some).map_err(|_| self.closed_error());
        self.pending.lock().remove(&new_id);
        result
    }

    /// `ForwardMessage` per spec §4.1: marshals/unmarshals around
    /// `send_message`.
    pub async fn forward_message(
        &self,
        request: &JsonRpcRequest,
    ) -> RouterResult<Option<JsonRpcResponse>> {
        let raw = serde_json::to_value(request)?;
        match self.send_message(raw).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Idempotent. Closes `done` exactly once, closes stdin, invokes the
    /// on-close callback exactly once, and reaps the child process.
    pub async fn close(&self) {
        self.close_internal(None).await;
    }

    async fn close_internal(&self, fatal_error: Option<String>) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(err) = fatal_error {
            *self.error.lock() = Some(err);
        }
        self.stdin.lock().await.take();
        // Dropping every pending sender resolves any in-flight `send_message`
        // callers with "client closed" instead of leaving them to await
        // forever (spec §4.1's Close() unblocking guarantee).
        self.pending.lock().clear();
        self.original_by_id.lock().clear();
        if let Some(cb) = self.on_close.lock().take() {
            cb();
        }
        self.done.notify_waiters();
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
    }

    fn closed_error(&self) -> RouterError {
        match self.error.lock().clone() {
            Some(msg) => RouterError::Upstream(msg),
            None => RouterError::ClientClosed,
        }
    }

    async fn write_line(&self, value: &Value) -> RouterResult<()> {
        let mut text = serde_json::to_string(value)?;
        text.push('\n');
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or_else(|| self.closed_error())?;
        stdin.write_all(text.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn run_reader(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.handle_line(&line);
                }
                Ok(None) => {
                    tracing::info!(key = %self.config.key, "mcp server stdout closed");
                    self.close_internal(None).await;
                    break;
                }
                Err(e) => {
                    tracing::warn!(key = %self.config.key, error = %e, "mcp server stdout read error");
                    self.close_internal(Some(format!("stdout read error: {e}")))
                        .await;
                    break;
                }
            }
        }
    }

    fn handle_line(&self, line: &str) {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed line from mcp server stdout");
                return;
            }
        };
        if !mr_protocol::is_jsonrpc_2(&value) {
            tracing::warn!("dropping line with unexpected jsonrpc version");
            return;
        }
        match mr_protocol::classify(value) {
            JsonRpcMessage::Notification(v) => self.dispatch_notification(v),
            JsonRpcMessage::Response(v) => self.dispatch_response(v),
            JsonRpcMessage::Request(_) => {
                tracing::warn!("dropping unexpected request read from mcp server stdout");
            }
        }
    }

    fn dispatch_notification(&self, value: Value) {
        for handler in self.notification_handlers.read().iter() {
            handler(value.clone());
        }
    }

    fn dispatch_response(&self, mut value: Value) {
        let Some(id) = mr_protocol::take_id(&value) else {
            return;
        };
        let key = id_key(&id);
        if let Some(original) = self.original_by_id.lock().remove(&key) {
            mr_protocol::set_id(&mut value, original);
        }
        match self.pending.lock().remove(&key) {
            Some(tx) => {
                let _ = tx.send(value);
            }
            None => tracing::warn!(id = %key, "dropping orphan response with no pending caller"),
        }
    }

    async fn run_stderr(self: Arc<Self>, stderr: ChildStderr) {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    tracing::debug!(key = %self.config.key, stderr = %line, "mcp server stderr");
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(key = %self.config.key, error = %e, "stderr scanner error");
                    self.close_internal(Some(format!("stderr scanner error: {e}")))
                        .await;
                    break;
                }
            }
        }
    }
}

fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
