//! Incremental runtime configuration store (spec §4.D): periodically fetch
//! changed rows per table, validate, and 3-way merge them into the live
//! graph that `nd-router`/`nd-incident` read from. Grounded on
//! `fc-router/config_sync.rs`'s periodic-fetch-and-diff shape and
//! `fc-outbox/repository.rs`'s per-table trait split.

pub mod auth;
pub mod graph;
pub mod kinds;
pub mod merge;
pub mod rows;
pub mod source;

pub use auth::SourceAuthenticator;
pub use graph::{ConfigGraph, FetchedBatch};
pub use kinds::EntityKind;
pub use source::{ConfigSource, PgConfigSource};

use chrono::Duration as ChronoDuration;
use nd_common::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub struct ConfigStore {
    graph: Arc<RwLock<ConfigGraph>>,
    backlog: ChronoDuration,
    authenticator: Arc<SourceAuthenticator>,
}

impl ConfigStore {
    pub fn new(backlog: Duration) -> Self {
        Self {
            graph: Arc::new(RwLock::new(ConfigGraph::new())),
            backlog: ChronoDuration::from_std(backlog).unwrap_or(ChronoDuration::seconds(600)),
            authenticator: Arc::new(SourceAuthenticator::new()),
        }
    }

    /// Shared handle to the per-source credential cache (spec §6 "Source
    /// authentication"); the external HTTP listener checks incoming
    /// credentials against this.
    pub fn authenticator(&self) -> Arc<SourceAuthenticator> {
        self.authenticator.clone()
    }

    /// Read access to the live graph; event processing (spec §5) holds this
    /// for the duration of its transaction.
    pub fn graph(&self) -> Arc<RwLock<ConfigGraph>> {
        self.graph.clone()
    }

    /// Fetches and applies every entity table once, in dependency order
    /// (spec §4.D "Apply order"). Fetching happens without the write lock
    /// held; only the merge itself briefly takes it per table.
    pub async fn sync(&self, source: &dyn ConfigSource) -> Result<()> {
        for kind in EntityKind::APPLY_ORDER {
            self.sync_one(kind, source).await?;
        }
        Ok(())
    }

    async fn sync_one(&self, kind: EntityKind, source: &dyn ConfigSource) -> Result<()> {
        let since = {
            let graph = self.graph.read().await;
            graph.since_for(kind, self.backlog)
        };

        let batch = match kind {
            EntityKind::Channel => FetchedBatch::Channel(source.fetch_channels(since).await?),
            EntityKind::Contact => FetchedBatch::Contact(source.fetch_contacts(since).await?),
            EntityKind::ContactAddress => {
                FetchedBatch::ContactAddress(source.fetch_contact_addresses(since).await?)
            }
            EntityKind::ContactGroup => {
                FetchedBatch::ContactGroup(source.fetch_contact_groups(since).await?)
            }
            EntityKind::GroupMember => FetchedBatch::GroupMember(source.fetch_group_members(since).await?),
            EntityKind::TimePeriod => FetchedBatch::TimePeriod(source.fetch_time_periods(since).await?),
            EntityKind::Schedule => FetchedBatch::Schedule(source.fetch_schedules(since).await?),
            EntityKind::Rotation => FetchedBatch::Rotation(source.fetch_rotations(since).await?),
            EntityKind::RotationMember => {
                FetchedBatch::RotationMember(source.fetch_rotation_members(since).await?)
            }
            EntityKind::TimePeriodEntry => {
                FetchedBatch::TimePeriodEntry(source.fetch_time_period_entries(since).await?)
            }
            EntityKind::Source => FetchedBatch::Source(source.fetch_sources(since).await?),
            EntityKind::Rule => FetchedBatch::Rule(source.fetch_rules(since).await?),
            EntityKind::RuleEntry => FetchedBatch::RuleEntry(source.fetch_rule_entries(since).await?),
            EntityKind::RuleEntryRecipient => {
                FetchedBatch::RuleEntryRecipient(source.fetch_rule_entry_recipients(since).await?)
            }
        };

        debug!(table = kind.table_name(), since = %since, "fetched config rows");
        let source_rows_changed = matches!(&batch, FetchedBatch::Source(rows) if !rows.is_empty());
        let mut graph = self.graph.write().await;
        graph.apply_batch(batch)?;
        info!(table = kind.table_name(), "applied config batch");
        if source_rows_changed {
            self.authenticator.invalidate_all();
        }
        Ok(())
    }
}

/// Spawns the periodic sync loop; cancellation follows the process-wide
/// shutdown broadcast (spec §5 "Cancellation"), matching the teacher's
/// `spawn_config_sync_task` shutdown-channel shape.
pub fn spawn_sync_task(
    store: Arc<ConfigStore>,
    source: Arc<dyn ConfigSource>,
    poll_interval: Duration,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = store.sync(source.as_ref()).await {
                        tracing::warn!(error = %e, "config sync failed, keeping previous graph");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("config sync task shutting down");
                    break;
                }
            }
        }
    })
}
