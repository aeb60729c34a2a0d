//! Plugin directory rescans (spec §4.E "Upsert"): iterate executables in
//! `plugin_dir`, spawn each briefly to call `GetInfo`, and collect the
//! result set callers upsert into `available_channel_type`.

use crate::handle::{run_response_reader, PluginHandle};
use crate::protocol::{ChannelTypeInfo, METHOD_GET_INFO};
use nd_common::{NotifydError, Result};
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command as ChildCommand;
use tracing::warn;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawns every executable directly under `plugin_dir`, probes it with
/// `GetInfo`, and kills it. Entries that fail to spawn or answer are
/// skipped with a warning rather than aborting the whole scan.
pub async fn rescan(plugin_dir: &Path) -> Result<Vec<ChannelTypeInfo>> {
    let mut entries = tokio::fs::read_dir(plugin_dir)
        .await
        .map_err(|e| NotifydError::Config(format!("cannot read plugin dir: {e}")))?;

    let mut discovered = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| NotifydError::Config(format!("cannot read plugin dir entry: {e}")))?
    {
        let path = entry.path();
        if !is_executable_file(&entry).await {
            continue;
        }
        match probe_one(&path).await {
            Ok(info) => discovered.push(info),
            Err(e) => warn!(path = %path.display(), error = %e, "plugin GetInfo probe failed"),
        }
    }
    Ok(discovered)
}

async fn is_executable_file(entry: &tokio::fs::DirEntry) -> bool {
    match entry.file_type().await {
        Ok(ft) => ft.is_file(),
        Err(_) => false,
    }
}

async fn probe_one(path: &Path) -> Result<ChannelTypeInfo> {
    let mut child = ChildCommand::new(path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| NotifydError::PluginTransport(e.to_string()))?;

    let stdin = child.stdin.take().expect("piped stdin");
    let stdout = child.stdout.take().expect("piped stdout");

    let handle = Arc::new(PluginHandle::new(0, stdin));
    let reader_task = tokio::spawn(run_response_reader(handle.clone(), stdout));

    let result = handle.call(METHOD_GET_INFO, Value::Null, PROBE_TIMEOUT).await;

    let _ = child.start_kill();
    let _ = child.wait().await;
    reader_task.abort();

    let value = result?;
    serde_json::from_value(value).map_err(|e| NotifydError::PluginTransport(e.to_string()))
}
