//! Minimal CDP client over a page target's debugging WebSocket.
//!
//! One writer task owns the sink; one reader task resolves pending
//! requests by id. Events are ignored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashwatch_core::{Error, Result};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

pub struct CdpClient {
    ws_tx: mpsc::Sender<String>,
    pending: Pending,
    next_id: AtomicU64,
    command_timeout: Duration,
    reader_handle: tokio::task::JoinHandle<()>,
    writer_handle: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    pub async fn connect(ws_url: &str, command_timeout: Duration) -> Result<Self> {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::connect_async;
        use tokio_tungstenite::tungstenite::Message;

        let (ws_stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| Error::Host(format!("Failed to connect to {}: {}", ws_url, e)))?;
        let (mut ws_sink, mut ws_read) = ws_stream.split();

        let (ws_tx, mut ws_rx) = mpsc::channel::<String>(32);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let pending_reader = pending.clone();

        let writer_handle = tokio::spawn(async move {
            while let Some(msg) = ws_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(msg)).await {
                    error!(error = %e, "CDP write failed");
                    break;
                }
            }
        });

        let reader_handle = tokio::spawn(async move {
            while let Some(msg) = ws_read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let Ok(val) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        if let Some(id) = val.get("id").and_then(Value::as_u64) {
                            if let Some(tx) = pending_reader.lock().await.remove(&id) {
                                let _ = tx.send(val);
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("CDP socket closed by browser");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "CDP read failed");
                        break;
                    }
                    _ => {}
                }
            }
        });

        Ok(Self {
            ws_tx,
            pending,
            next_id: AtomicU64::new(1),
            command_timeout,
            reader_handle,
            writer_handle,
        })
    }

    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let msg = json!({ "id": id, "method": method, "params": params });

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        self.ws_tx
            .send(msg.to_string())
            .await
            .map_err(|e| Error::Host(format!("Failed to send {}: {}", method, e)))?;

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(response)) => command_result(response),
            Ok(Err(_)) => Err(Error::Host("CDP connection closed".into())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(Error::Timeout(format!(
                    "{} after {}s",
                    method,
                    self.command_timeout.as_secs()
                )))
            }
        }
    }

    /// Evaluate an expression in the page and return its JSON value.
    pub async fn evaluate_value(&self, expression: &str) -> Result<Value> {
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
        evaluation_value(result)
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}

fn command_result(response: Value) -> Result<Value> {
    if let Some(err) = response.get("error") {
        return Err(Error::Host(format!("CDP error: {}", err)));
    }
    Ok(response.get("result").cloned().unwrap_or(Value::Null))
}

fn evaluation_value(result: Value) -> Result<Value> {
    if let Some(details) = result.get("exceptionDetails") {
        let text = details
            .pointer("/exception/description")
            .or_else(|| details.get("text"))
            .and_then(Value::as_str)
            .unwrap_or("script exception");
        return Err(Error::Host(format!("Page script failed: {}", text)));
    }
    Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
}
