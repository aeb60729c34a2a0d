//! Process bootstrap: load settings, init logging, wire the config store,
//! object store, incident registry, channel plugin supervisors, and the
//! event router, then run until a shutdown signal (spec §5
//! "Cancellation").
//!
//! The inbound HTTP listener, per-source authentication, and the plugin
//! bodies themselves are external collaborators (spec §1); this binary
//! only brings the core up and keeps it alive so they have something to
//! call into.

use nd_common::logging::{init_logging, LogFormat};
use nd_config::loader::ConfigLoader;
use nd_configstore::{ConfigSource, ConfigStore, PgConfigSource};
use nd_incident::IncidentRegistry;
use nd_object::ObjectStore;
use nd_plugin::{plugin_path, spawn as spawn_plugin, SupervisorCommand};
use nd_router::EventRouter;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

const PLUGIN_RESCAN_INTERVAL: Duration = Duration::from_secs(300);
const PLUGIN_STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = ConfigLoader::new().load()?;

    let log_format = match settings.logging.output.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    };
    init_logging(&settings.logging.level, log_format);

    info!("starting notifyd");

    let pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url())
        .await?;

    let config_store = Arc::new(ConfigStore::new(settings.config_backlog()));
    let config_source: Arc<dyn ConfigSource> = Arc::new(PgConfigSource::new(pool.clone()));

    info!("performing initial configuration sync");
    config_store.sync(config_source.as_ref()).await?;

    let objects = Arc::new(ObjectStore::new());

    let incidents = Arc::new(IncidentRegistry::new());
    let open_incidents = nd_router::persistence::load_open_incidents(&pool).await?;
    info!(count = open_incidents.len(), "hydrating already-open incidents");
    incidents.hydrate(open_incidents);

    let router = EventRouter::new(pool.clone(), config_store.graph(), objects, incidents);

    let plugin_dir = PathBuf::from(&settings.channels_dir);
    let mut plugins = Vec::new();
    {
        let graph = config_store.graph();
        let graph = graph.read().await;
        for channel in graph.channels.values() {
            let path = match plugin_path(&plugin_dir, &channel.kind) {
                Ok(path) => path,
                Err(e) => {
                    warn!(channel_id = channel.id, error = %e, "skipping channel with invalid plugin type");
                    continue;
                }
            };
            let (supervisor, cmd_tx, join) = spawn_plugin(channel.id, path, channel.config_blob.clone());
            router.register_plugin(channel.id, supervisor);
            plugins.push((channel.id, cmd_tx, join));
        }
    }
    info!(count = plugins.len(), "channel plugin supervisors started");

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let sync_task = nd_configstore::spawn_sync_task(
        config_store.clone(),
        config_source.clone(),
        settings.config_poll_interval(),
        shutdown_tx.clone(),
    );
    let rescan_task = spawn_rescan_task(plugin_dir, shutdown_tx.clone());

    info!(
        listen = %settings.listen,
        debug_enabled = settings.debug_enabled(),
        "notifyd core ready; event ingest is driven by an external listener"
    );

    shutdown_signal().await;
    info!("shutdown signal received, stopping");

    let _ = shutdown_tx.send(());

    for (channel_id, cmd_tx, join) in plugins {
        let _ = cmd_tx.send(SupervisorCommand::Stop).await;
        if tokio::time::timeout(PLUGIN_STOP_TIMEOUT, join).await.is_err() {
            warn!(channel_id, "plugin supervisor did not shut down within timeout");
        }
    }
    let _ = sync_task.await;
    let _ = rescan_task.await;

    info!("notifyd shutdown complete");
    Ok(())
}

fn spawn_rescan_task(
    plugin_dir: PathBuf,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PLUGIN_RESCAN_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match nd_plugin::registry::rescan(&plugin_dir).await {
                        Ok(found) => info!(count = found.len(), "plugin directory rescanned"),
                        Err(e) => warn!(error = %e, "plugin directory rescan failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("plugin rescan task shutting down");
                    break;
                }
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
