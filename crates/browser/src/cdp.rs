//! Low-level Chrome DevTools Protocol (CDP) client over WebSocket.
//!
//! Commands are matched to responses by id. Once the socket closes every
//! pending and future command fails with `BrowserError::SessionInvalid`.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};

use crate::error::{BrowserError, BrowserResult};

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// A CDP WebSocket client bound to one page target.
pub struct CdpClient {
    /// Sender to write messages to the WebSocket.
    ws_tx: mpsc::Sender<String>,
    /// Pending command responses, keyed by request ID.
    pending: Pending,
    next_id: AtomicU64,
    /// Cleared by the reader task when the socket goes away.
    alive: Arc<AtomicBool>,
    command_timeout: Duration,
    _reader_handle: tokio::task::JoinHandle<()>,
    _writer_handle: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a Chrome CDP WebSocket endpoint.
    pub async fn connect(ws_url: &str) -> BrowserResult<Self> {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::connect_async;
        use tokio_tungstenite::tungstenite::Message;

        let (ws_stream, _) = connect_async(ws_url).await.map_err(|e| {
            BrowserError::Launch(format!("failed to connect to CDP endpoint {}: {}", ws_url, e))
        })?;

        let (mut ws_sink, mut ws_stream_read) = ws_stream.split();

        let (ws_tx, mut ws_rx) = mpsc::channel::<String>(256);

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let pending_clone = pending.clone();

        let alive = Arc::new(AtomicBool::new(true));
        let alive_reader = alive.clone();
        let alive_writer = alive.clone();

        // Writer task: owns the sink, forwards messages from channel
        let writer_handle = tokio::spawn(async move {
            while let Some(msg) = ws_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(msg)).await {
                    error!("CDP WebSocket write error: {}", e);
                    alive_writer.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        // Reader task: dispatches responses by id; events are ignored.
        let reader_handle = tokio::spawn(async move {
            while let Some(msg_result) = ws_stream_read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        let Ok(val) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        if let Some(id) = val.get("id").and_then(|v| v.as_u64()) {
                            let mut pending = pending_clone.lock().await;
                            if let Some(tx) = pending.remove(&id) {
                                let _ = tx.send(val);
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("CDP WebSocket closed by server");
                        break;
                    }
                    Err(e) => {
                        warn!("CDP WebSocket read error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            alive_reader.store(false, Ordering::SeqCst);
            // Dropping the senders wakes every waiter with a closed channel.
            pending_clone.lock().await.clear();
        });

        Ok(Self {
            ws_tx,
            pending,
            next_id: AtomicU64::new(1),
            alive,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            _reader_handle: reader_handle,
            _writer_handle: writer_handle,
        })
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send a CDP command and wait for the response.
    pub async fn send_command(&self, method: &str, params: Value) -> BrowserResult<Value> {
        if !self.is_alive() {
            return Err(BrowserError::SessionInvalid("CDP connection closed".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let msg = json!({
            "id": id,
            "method": method,
            "params": params,
        });

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        if let Err(e) = self.ws_tx.send(msg.to_string()).await {
            self.pending.lock().await.remove(&id);
            return Err(BrowserError::SessionInvalid(format!(
                "failed to send CDP command: {}",
                e
            )));
        }

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(response)) => match response.get("error") {
                Some(error) => Err(classify_error(method, error)),
                None => Ok(response.get("result").cloned().unwrap_or(Value::Null)),
            },
            Ok(Err(_)) => Err(BrowserError::SessionInvalid(
                "CDP response channel closed".to_string(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                // A renderer that stops answering is treated as dead.
                Err(BrowserError::SessionInvalid(format!(
                    "CDP command '{}' timed out after {}s",
                    method,
                    self.command_timeout.as_secs()
                )))
            }
        }
    }

    /// Enable a CDP domain (e.g., "Page", "Runtime", "DOM").
    pub async fn enable_domain(&self, domain: &str) -> BrowserResult<()> {
        self.send_command(&format!("{}.enable", domain), json!({}))
            .await?;
        Ok(())
    }

    pub async fn navigate(&self, url: &str) -> BrowserResult<Value> {
        self.send_command("Page.navigate", json!({"url": url}))
            .await
    }

    /// Evaluate JavaScript in the page context and return the value.
    pub async fn evaluate_js(&self, expression: &str) -> BrowserResult<Value> {
        let result = self
            .send_command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        check_exception(&result)?;
        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Node id of the current document root.
    pub async fn document_root(&self) -> BrowserResult<i64> {
        let result = self
            .send_command("DOM.getDocument", json!({"depth": 0}))
            .await?;
        result
            .get("root")
            .and_then(|r| r.get("nodeId"))
            .and_then(|v| v.as_i64())
            .ok_or_else(|| BrowserError::Protocol("DOM.getDocument returned no root".to_string()))
    }

    /// Query a CSS selector and return node IDs.
    pub async fn query_selector_all(&self, node_id: i64, selector: &str) -> BrowserResult<Vec<i64>> {
        let result = self
            .send_command(
                "DOM.querySelectorAll",
                json!({
                    "nodeId": node_id,
                    "selector": selector,
                }),
            )
            .await?;
        let ids = result
            .get("nodeIds")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_i64()).collect())
            .unwrap_or_default();
        Ok(ids)
    }

    /// First match for `selector`, or `None` (CDP reports a miss as node 0).
    pub async fn query_selector(&self, node_id: i64, selector: &str) -> BrowserResult<Option<i64>> {
        let result = self
            .send_command(
                "DOM.querySelector",
                json!({
                    "nodeId": node_id,
                    "selector": selector,
                }),
            )
            .await?;
        Ok(result
            .get("nodeId")
            .and_then(|v| v.as_i64())
            .filter(|id| *id != 0))
    }

    /// Resolve a DOM node to a Runtime object for JS interaction.
    pub async fn resolve_node(&self, node_id: i64) -> BrowserResult<String> {
        let result = self
            .send_command("DOM.resolveNode", json!({"nodeId": node_id}))
            .await?;
        result
            .get("object")
            .and_then(|o| o.get("objectId"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| BrowserError::NotFound(format!("node {} could not be resolved", node_id)))
    }

    /// Call a function with `this` bound to a remote object. Returns the
    /// `RemoteObject` describing the result.
    pub async fn call_function_on(
        &self,
        object_id: &str,
        function_declaration: &str,
        args: &[Value],
        return_by_value: bool,
    ) -> BrowserResult<Value> {
        let arguments: Vec<Value> = args.iter().map(|v| json!({"value": v})).collect();
        let result = self
            .send_command(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": object_id,
                    "functionDeclaration": function_declaration,
                    "arguments": arguments,
                    "returnByValue": return_by_value,
                }),
            )
            .await?;
        check_exception(&result)?;
        Ok(result.get("result").cloned().unwrap_or(Value::Null))
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self._reader_handle.abort();
        self._writer_handle.abort();
    }
}

fn check_exception(result: &Value) -> BrowserResult<()> {
    match result.get("exceptionDetails") {
        Some(details) => {
            let text = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .or_else(|| details.get("text"))
                .and_then(|v| v.as_str())
                .unwrap_or("script exception");
            Err(BrowserError::Protocol(text.to_string()))
        }
        None => Ok(()),
    }
}

/// Map a CDP error object to the error taxonomy the session manager uses.
pub(crate) fn classify_error(method: &str, error: &Value) -> BrowserError {
    let message = error
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown CDP error");
    let lower = message.to_lowercase();

    if lower.contains("target closed")
        || lower.contains("session with given id not found")
        || lower.contains("inspected target navigated or closed")
    {
        BrowserError::SessionInvalid(format!("{}: {}", method, message))
    } else if lower.contains("could not find node")
        || lower.contains("no node with given id")
        || lower.contains("could not find object")
        || lower.contains("cannot find context")
    {
        BrowserError::NotFound(format!("{}: {}", method, message))
    } else {
        BrowserError::Protocol(format!("{}: {}", method, message))
    }
}
