//! Object persistence and the process-wide object cache (spec §4.F).
//! Grounded on `fc-outbox/repository.rs` for the upsert shape and
//! `fc-router::manager`'s `DashMap` in-flight cache for the
//! commit-then-publish ordering.
//!
//! The object upsert shares the caller's transaction rather than opening
//! its own: spec §4.G's pipeline is one transaction per event, and the
//! object upsert is that transaction's step 2, not a side effect that
//! commits ahead of steps 5/6/10. Callers write through
//! [`ObjectStore::apply_event`] and only call [`ObjectStore::publish`]
//! once their own transaction has committed.

use crate::id::compute_object_id;
use dashmap::DashMap;
use nd_common::{Event, EventType, NotifydError, Object, Result};
use sqlx::{Postgres, Transaction};
use std::sync::Arc;
use tracing::debug;

pub struct ObjectStore {
    cache: DashMap<[u8; 32], Arc<Object>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self { cache: DashMap::new() }
    }

    fn db_err(e: sqlx::Error) -> NotifydError {
        NotifydError::TransientDb(e.to_string())
    }

    /// The cached object as of just before this call, used by the router's
    /// ingest pipeline to snapshot mute state ahead of applying an event
    /// (spec §4.G step 1).
    pub fn snapshot(&self, id: &[u8; 32]) -> Option<Arc<Object>> {
        self.cache.get(id).map(|entry| entry.clone())
    }

    /// Upserts the object row, its id-tags, and its extra-tags through
    /// `tx`, the caller's event transaction. Does not touch the cache;
    /// call [`Self::publish`] after `tx` commits.
    pub async fn apply_event(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
    ) -> Result<Object> {
        let id = compute_object_id(event.source_id, &event.id_tags);
        let previous = self.snapshot(&id);

        let mute_reason = if event.kind.is_mute_unmute() {
            let next_reason = mute_reason_for(event);
            let previous_reason = previous.as_ref().and_then(|o| o.mute_reason.clone());
            if previous_reason == next_reason {
                return Err(NotifydError::SuperfluousMuteUnmuteEvent);
            }
            next_reason
        } else {
            previous.as_ref().and_then(|o| o.mute_reason.clone())
        };

        let object = Object {
            id,
            source_id: event.source_id,
            name: event.name.clone(),
            url: event.url.clone(),
            id_tags: event.id_tags.clone(),
            extra_tags: event.extra_tags.clone(),
            mute_reason,
        };

        upsert_object_row(tx, &object).await?;
        upsert_id_tags(tx, &object).await?;
        replace_extra_tags(tx, &object).await?;
        Ok(object)
    }

    /// Publishes `object` into the process-wide cache; call only after the
    /// transaction that wrote it via [`Self::apply_event`] has committed
    /// (spec §4.F, §5: "the object cache is updated only after commit").
    pub fn publish(&self, object: Object) -> Arc<Object> {
        let object = Arc::new(object);
        self.cache.insert(object.id, object.clone());
        debug!(object_id = object.id_hex(), muted = object.is_muted(), "object upserted");
        object
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

fn mute_reason_for(event: &Event) -> Option<String> {
    match event.kind {
        EventType::Mute => Some(event.mute_reason.clone().unwrap_or_else(|| "muted".to_string())),
        EventType::Unmute => None,
        _ => None,
    }
}

async fn upsert_object_row(tx: &mut Transaction<'_, Postgres>, object: &Object) -> Result<()> {
    sqlx::query(
        "INSERT INTO object (id, source_id, name, url, mute_reason) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (id) DO UPDATE SET \
           name = EXCLUDED.name, url = EXCLUDED.url, mute_reason = EXCLUDED.mute_reason",
    )
    .bind(&object.id[..])
    .bind(object.source_id)
    .bind(&object.name)
    .bind(&object.url)
    .bind(&object.mute_reason)
    .execute(&mut **tx)
    .await
    .map_err(ObjectStore::db_err)?;
    Ok(())
}

async fn upsert_id_tags(tx: &mut Transaction<'_, Postgres>, object: &Object) -> Result<()> {
    for (key, value) in &object.id_tags {
        sqlx::query(
            "INSERT INTO object_id_tag (object_id, key, value) VALUES ($1, $2, $3) \
             ON CONFLICT (object_id, key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(&object.id[..])
        .bind(key)
        .bind(value)
        .execute(&mut **tx)
        .await
        .map_err(ObjectStore::db_err)?;
    }
    Ok(())
}

async fn replace_extra_tags(tx: &mut Transaction<'_, Postgres>, object: &Object) -> Result<()> {
    sqlx::query("DELETE FROM object_extra_tag WHERE object_id = $1")
        .bind(&object.id[..])
        .execute(&mut **tx)
        .await
        .map_err(ObjectStore::db_err)?;

    for (key, value) in &object.extra_tags {
        sqlx::query("INSERT INTO object_extra_tag (object_id, key, value) VALUES ($1, $2, $3)")
            .bind(&object.id[..])
            .bind(key)
            .bind(value)
            .execute(&mut **tx)
            .await
            .map_err(ObjectStore::db_err)?;
    }
    Ok(())
}
