//! Per-channel plugin supervision (spec §4.E "Supervision state machine"):
//! one task owns one channel's plugin process end to end, cycling
//! `Initializing` → `Ready` → `Stopping` → `Initializing` on crash or
//! reload. The "current `Ready` plugin" rendezvous is a `watch` channel,
//! grounded on `fc-standby::leader::LeaderElection`'s
//! `watch::Sender<LeadershipStatus>` status-broadcast shape.

use crate::handle::{run_response_reader, run_stderr_scanner, PluginHandle};
use crate::protocol::METHOD_SET_CONFIG;
use crate::state::PluginState;
use nd_common::{NotifydError, Result};
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command as ChildCommand;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

const STOP_GRACE: Duration = Duration::from_secs(5);
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

pub enum SupervisorCommand {
    Reload(Value),
    Stop,
}

enum CycleOutcome {
    Reload(Value),
    Stop,
    Crashed,
}

/// Validates a channel type against `^[a-zA-Z0-9]+$` (spec §4.E) and joins
/// it to the plugin directory.
pub fn plugin_path(plugin_dir: &std::path::Path, plugin_type: &str) -> Result<PathBuf> {
    let pattern = Regex::new("^[a-zA-Z0-9]+$").expect("static pattern");
    if !pattern.is_match(plugin_type) {
        return Err(NotifydError::Config(format!("invalid channel type name: {plugin_type}")));
    }
    Ok(plugin_dir.join(plugin_type))
}

pub struct PluginSupervisor {
    pub channel_id: i64,
    state: RwLock<PluginState>,
    ready: watch::Sender<Option<Arc<PluginHandle>>>,
}

impl PluginSupervisor {
    pub fn state(&self) -> PluginState {
        *self.state.read()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<PluginHandle>>> {
        self.ready.subscribe()
    }

    /// Blocks until a `Ready` plugin is available, then returns it. This is
    /// the "single-element rendezvous" of spec §4.E: if none is ready the
    /// call waits for the next `Ready` transition.
    pub async fn current_ready(&self) -> Arc<PluginHandle> {
        let mut rx = self.ready.subscribe();
        loop {
            if let Some(handle) = rx.borrow().clone() {
                return handle;
            }
            if rx.changed().await.is_err() {
                // Sender dropped; keep waiting on a fresh subscription once
                // the supervisor restarts its channel on the next spawn.
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }

    fn set_state(&self, state: PluginState) {
        *self.state.write() = state;
    }
}

/// Spawns the supervisor's driving task. Returns the shared supervisor
/// handle (for `current_ready`/`state`), a command sender for reload/stop,
/// and the task's join handle.
pub fn spawn(
    channel_id: i64,
    plugin_path: PathBuf,
    initial_config: Value,
) -> (Arc<PluginSupervisor>, mpsc::Sender<SupervisorCommand>, tokio::task::JoinHandle<()>) {
    let (ready_tx, _ready_rx) = watch::channel(None);
    let supervisor = Arc::new(PluginSupervisor {
        channel_id,
        state: RwLock::new(PluginState::Initializing),
        ready: ready_tx,
    });
    let (cmd_tx, cmd_rx) = mpsc::channel(8);

    let task_supervisor = supervisor.clone();
    let join = tokio::spawn(async move {
        run(task_supervisor, plugin_path, initial_config, cmd_rx).await;
    });

    (supervisor, cmd_tx, join)
}

async fn run(
    supervisor: Arc<PluginSupervisor>,
    plugin_path: PathBuf,
    mut config: Value,
    mut cmd_rx: mpsc::Receiver<SupervisorCommand>,
) {
    loop {
        match run_cycle(&supervisor, &plugin_path, config.clone(), &mut cmd_rx).await {
            CycleOutcome::Reload(new_config) => {
                config = new_config;
                continue;
            }
            CycleOutcome::Crashed => continue,
            CycleOutcome::Stop => {
                supervisor.set_state(PluginState::Initializing);
                let _ = supervisor.ready.send(None);
                break;
            }
        }
    }
}

async fn run_cycle(
    supervisor: &Arc<PluginSupervisor>,
    plugin_path: &PathBuf,
    config: Value,
    cmd_rx: &mut mpsc::Receiver<SupervisorCommand>,
) -> CycleOutcome {
    supervisor.set_state(PluginState::Initializing);

    let mut child = match ChildCommand::new(plugin_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!(channel_id = supervisor.channel_id, error = %e, "failed to spawn plugin");
            tokio::time::sleep(Duration::from_secs(1)).await;
            return CycleOutcome::Crashed;
        }
    };

    let stdin = child.stdin.take().expect("piped stdin");
    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let handle = Arc::new(PluginHandle::new(supervisor.channel_id, stdin));
    let reader_task = tokio::spawn(run_response_reader(handle.clone(), stdout));
    let stderr_task = tokio::spawn(run_stderr_scanner(supervisor.channel_id, stderr));

    if let Err(e) = handle.call(METHOD_SET_CONFIG, config, RPC_TIMEOUT).await {
        warn!(channel_id = supervisor.channel_id, error = %e, "SetConfig failed, stopping plugin");
        return stop_and_recycle(supervisor, &mut child, reader_task, stderr_task, CycleOutcome::Crashed).await;
    }

    supervisor.set_state(PluginState::Ready);
    let _ = supervisor.ready.send(Some(handle.clone()));
    info!(channel_id = supervisor.channel_id, "plugin ready");

    let mut reader_task = reader_task;
    let outcome = tokio::select! {
        cmd = cmd_rx.recv() => match cmd {
            Some(SupervisorCommand::Reload(new_config)) => CycleOutcome::Reload(new_config),
            Some(SupervisorCommand::Stop) | None => CycleOutcome::Stop,
        },
        _ = &mut reader_task => CycleOutcome::Crashed,
    };

    stop_and_recycle(supervisor, &mut child, reader_task, stderr_task, outcome).await
}

async fn stop_and_recycle(
    supervisor: &Arc<PluginSupervisor>,
    child: &mut tokio::process::Child,
    reader_task: tokio::task::JoinHandle<()>,
    stderr_task: tokio::task::JoinHandle<()>,
    outcome: CycleOutcome,
) -> CycleOutcome {
    supervisor.set_state(PluginState::Stopping);
    let _ = supervisor.ready.send(None);

    // Dropping stdin (inside the handle, already consumed by the reader/
    // writer) closes the child's input; request graceful exit, then
    // escalate to SIGKILL after the grace window (spec §4.E).
    match tokio::time::timeout(STOP_GRACE, child.wait()).await {
        Ok(_) => {}
        Err(_) => {
            warn!(channel_id = supervisor.channel_id, "plugin did not exit in time, sending SIGKILL");
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }

    reader_task.abort();
    stderr_task.abort();
    outcome
}
