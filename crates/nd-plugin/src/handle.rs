//! A running, `Ready` plugin process: the stdin writer, the pending-id
//! waiter map, and the two background tasks (response reader, stderr
//! scanner) that keep it fed. Request serialization over stdin follows
//! the `encoderMu`-guards-writes / single-reader-fans-out-to-waiters
//! shape from spec §5.

use crate::protocol::{Request, Response};
use dashmap::DashMap;
use nd_common::{NotifydError, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

pub struct PluginHandle {
    pub channel_id: i64,
    stdin: Mutex<ChildStdin>,
    pending: DashMap<u64, oneshot::Sender<Response>>,
    next_id: AtomicU64,
}

impl PluginHandle {
    pub fn new(channel_id: i64, stdin: ChildStdin) -> Self {
        Self { channel_id, stdin: Mutex::new(stdin), pending: DashMap::new(), next_id: AtomicU64::new(1) }
    }

    /// Sends `method`/`params` and waits for the correlated response, or a
    /// transport/timeout error. Ids are allocated per call so the child may
    /// answer out of order (spec §4.E).
    pub async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let request = Request { method: method.to_string(), params, id };
        let mut line = serde_json::to_string(&request)
            .map_err(|e| NotifydError::PluginTransport(e.to_string()))?;
        line.push('\n');

        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                self.pending.remove(&id);
                return Err(NotifydError::PluginTransport(e.to_string()));
            }
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => match response.error {
                Some(message) => Err(NotifydError::PluginCall(message)),
                None => Ok(response.result.unwrap_or(Value::Null)),
            },
            Ok(Err(_)) => Err(NotifydError::PluginTransport("response channel closed".into())),
            Err(_) => {
                self.pending.remove(&id);
                Err(NotifydError::PluginTransport(format!("rpc timeout waiting for id {id}")))
            }
        }
    }

    /// Fails every outstanding waiter; called when the reader loop ends
    /// (EOF, decode failure) so callers don't hang past process death.
    /// Dropping each sender closes its receiver with a `RecvError`.
    pub fn fail_all_pending(&self) {
        self.pending.clear();
    }

    fn complete(&self, response: Response) {
        if let Some((_, tx)) = self.pending.remove(&response.id) {
            let _ = tx.send(response);
        }
    }
}

/// Reads newline-framed `Response` objects from the child's stdout and
/// fans each out to its waiter. Returns on EOF or a decode failure, which
/// the supervisor treats as an RPC fatal error (spec §4.E).
pub async fn run_response_reader(handle: Arc<PluginHandle>, stdout: ChildStdout) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Response>(&line) {
                    Ok(response) => handle.complete(response),
                    Err(e) => {
                        warn!(channel_id = handle.channel_id, error = %e, line, "malformed plugin response");
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(channel_id = handle.channel_id, error = %e, "plugin stdout read error");
                break;
            }
        }
    }
    handle.fail_all_pending();
}

/// Line-scans the child's stderr and logs each line at `info` (spec §4.E
/// "Logging").
pub async fn run_stderr_scanner(channel_id: i64, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => info!(channel_id, plugin_stderr = %line),
            Ok(None) => break,
            Err(e) => {
                warn!(channel_id, error = %e, "plugin stderr read error");
                break;
            }
        }
    }
}
