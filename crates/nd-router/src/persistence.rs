//! Raw SQL persistence for the ingest pipeline's transactional writes
//! (spec §4.G steps 5, 6, 10), following `nd-configstore::source`'s style
//! of hand-written `sqlx::query` rather than compile-time-checked macros
//! (no database is available in this workspace to verify query shapes
//! against).

use crate::machine_notes::history_kind;
use chrono::{DateTime, Utc};
use nd_common::{Event, Incident, NotifydError, RecipientRef, Result, Severity};
use nd_incident::HistoryNote;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::BTreeMap;

fn db_err(e: sqlx::Error) -> NotifydError {
    NotifydError::TransientDb(e.to_string())
}

/// Loads every incident still open (`recovered_at IS NULL`), for seeding
/// [`nd_incident::IncidentRegistry`] at startup so a restart doesn't open a
/// second incident for an object whose incident is already open (spec §8
/// "Single-incident invariant").
pub async fn load_open_incidents(pool: &PgPool) -> Result<Vec<Incident>> {
    let rows = sqlx::query(
        "SELECT id, object_id, severity, started_at, recovered_at, muted_flag, \
                rule_match_set, escalation_state \
         FROM incident WHERE recovered_at IS NULL",
    )
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    let mut incidents = Vec::with_capacity(rows.len());
    for row in rows {
        let object_id: Vec<u8> = row.try_get("object_id").map_err(db_err)?;
        let object_id: [u8; 32] = object_id
            .try_into()
            .map_err(|_| NotifydError::TransientDb("incident.object_id is not 32 bytes".into()))?;
        let severity_str: String = row.try_get("severity").map_err(db_err)?;
        let severity = Severity::parse(&severity_str)
            .ok_or_else(|| NotifydError::TransientDb(format!("unknown incident severity {severity_str}")))?;
        let rule_match_set: sqlx::types::Json<Vec<i64>> = row.try_get("rule_match_set").map_err(db_err)?;
        let escalation_state: sqlx::types::Json<BTreeMap<i64, DateTime<Utc>>> =
            row.try_get("escalation_state").map_err(db_err)?;

        incidents.push(Incident {
            id: row.try_get("id").map_err(db_err)?,
            object_id,
            severity,
            started_at: row.try_get("started_at").map_err(db_err)?,
            recovered_at: row.try_get("recovered_at").map_err(db_err)?,
            muted_flag: row.try_get("muted_flag").map_err(db_err)?,
            recipients: BTreeMap::new(),
            rule_match_set: rule_match_set.0,
            escalation_state: escalation_state.0,
        });
    }
    Ok(incidents)
}

pub async fn next_event_id(pool: &PgPool) -> Result<i64> {
    sqlx::query_scalar("SELECT nextval('event_id_seq')").fetch_one(pool).await.map_err(db_err)
}

pub async fn next_incident_id(pool: &PgPool) -> Result<i64> {
    sqlx::query_scalar("SELECT nextval('incident_id_seq')").fetch_one(pool).await.map_err(db_err)
}

pub async fn next_notification_id(pool: &PgPool) -> Result<i64> {
    sqlx::query_scalar("SELECT nextval('notification_history_id_seq')")
        .fetch_one(pool)
        .await
        .map_err(db_err)
}

pub async fn persist_event_row(
    tx: &mut Transaction<'_, Postgres>,
    event: &Event,
    object_id: &[u8; 32],
) -> Result<()> {
    sqlx::query(
        "INSERT INTO event \
           (id, object_id, source_id, time, type, severity, name, url, username, message, id_tags, extra_tags) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(event.id)
    .bind(&object_id[..])
    .bind(event.source_id)
    .bind(event.time)
    .bind(event_type_key(&event.kind))
    .bind(event.severity.as_str())
    .bind(&event.name)
    .bind(&event.url)
    .bind(&event.username)
    .bind(&event.message)
    .bind(sqlx::types::Json(&event.id_tags))
    .bind(sqlx::types::Json(&event.extra_tags))
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}

pub async fn upsert_incident_row(tx: &mut Transaction<'_, Postgres>, incident: &Incident) -> Result<()> {
    sqlx::query(
        "INSERT INTO incident \
           (id, object_id, severity, started_at, recovered_at, muted_flag, rule_match_set, escalation_state) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (id) DO UPDATE SET \
           severity = EXCLUDED.severity, recovered_at = EXCLUDED.recovered_at, \
           muted_flag = EXCLUDED.muted_flag, rule_match_set = EXCLUDED.rule_match_set, \
           escalation_state = EXCLUDED.escalation_state",
    )
    .bind(incident.id)
    .bind(&incident.object_id[..])
    .bind(incident.severity.as_str())
    .bind(incident.started_at)
    .bind(incident.recovered_at)
    .bind(incident.muted_flag)
    .bind(sqlx::types::Json(&incident.rule_match_set))
    .bind(sqlx::types::Json(&incident.escalation_state))
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}

pub async fn persist_history_note(
    tx: &mut Transaction<'_, Postgres>,
    incident_id: i64,
    note: &HistoryNote,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("INSERT INTO incident_history (incident_id, at, kind) VALUES ($1, $2, $3)")
        .bind(incident_id)
        .bind(at)
        .bind(history_kind(note))
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
    Ok(())
}

pub async fn persist_notification_row(
    tx: &mut Transaction<'_, Postgres>,
    id: i64,
    incident_id: Option<i64>,
    rule_entry_id: Option<i64>,
    recipient_key: &RecipientRef,
    time: DateTime<Utc>,
    channel_id: i64,
    state: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO notification_history \
           (id, incident_id, rule_entry_id, recipient_key, time, channel_id, state) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(id)
    .bind(incident_id)
    .bind(rule_entry_id)
    .bind(recipient_key.to_string())
    .bind(time)
    .bind(channel_id)
    .bind(state)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}

/// Post-commit row update (spec §4.G "After commit"): outside any
/// transaction, since the notification send itself may take arbitrarily
/// long and must never hold DB locks.
pub async fn mark_notification_result(
    pool: &PgPool,
    id: i64,
    state: &str,
    sent_at: DateTime<Utc>,
    message: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE notification_history SET state = $2, sent_at = $3, message = $4 WHERE id = $1",
    )
    .bind(id)
    .bind(state)
    .bind(sent_at)
    .bind(message)
    .execute(pool)
    .await
    .map_err(db_err)?;
    Ok(())
}

fn event_type_key(kind: &nd_common::EventType) -> &'static str {
    use nd_common::{EventType, Phase};
    match kind {
        EventType::State => "state",
        EventType::Custom => "custom",
        EventType::Mute => "mute",
        EventType::Unmute => "unmute",
        EventType::Internal => "internal",
        EventType::Acknowledgement(Phase::Start) => "acknowledgement-start",
        EventType::Acknowledgement(Phase::End) => "acknowledgement-end",
        EventType::Downtime(Phase::Start) => "downtime-start",
        EventType::Downtime(Phase::End) => "downtime-end",
        EventType::Flapping(Phase::Start) => "flapping-start",
        EventType::Flapping(Phase::End) => "flapping-end",
    }
}

pub use event_type_key as type_key;
