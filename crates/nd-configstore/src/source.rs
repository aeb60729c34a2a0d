//! Abstracts where rows come from, so the merge/apply logic in
//! [`crate::graph`] can be exercised against an in-memory fake in tests
//! without a database (grounded on `fc-outbox/repository.rs`'s trait-per-
//! table shape).

use crate::rows::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nd_common::{NotifydError, Result};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch_channels(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<ChannelRow>>>;
    async fn fetch_contacts(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<ContactRow>>>;
    async fn fetch_contact_addresses(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<ContactAddressRow>>>;
    async fn fetch_contact_groups(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<ContactGroupRow>>>;
    async fn fetch_group_members(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<GroupMemberRow>>>;
    async fn fetch_time_periods(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<TimePeriodRow>>>;
    async fn fetch_schedules(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<ScheduleRow>>>;
    async fn fetch_rotations(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<RotationRow>>>;
    async fn fetch_rotation_members(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<RotationMemberRow>>>;
    async fn fetch_time_period_entries(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<TimePeriodEntryDbRow>>>;
    async fn fetch_sources(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<SourceRow>>>;
    async fn fetch_rules(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<RuleRow>>>;
    async fn fetch_rule_entries(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<RuleEntryRow>>>;
    async fn fetch_rule_entry_recipients(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<RuleEntryRecipientRow>>>;
}

pub struct PgConfigSource {
    pool: PgPool,
}

impl PgConfigSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn db_err(e: sqlx::Error) -> NotifydError {
        NotifydError::TransientDb(e.to_string())
    }

    async fn changed_since(&self, table: &str, since: DateTime<Utc>) -> Result<Vec<PgRow>> {
        let sql = format!("SELECT * FROM {table} WHERE changed_at > $1 ORDER BY changed_at ASC");
        sqlx::query(&sql)
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::db_err)
    }

    fn bookkeeping(row: &PgRow) -> Result<(i64, DateTime<Utc>, bool)> {
        let id: i64 = row.try_get("id").map_err(Self::db_err)?;
        let changed_at: DateTime<Utc> = row.try_get("changed_at").map_err(Self::db_err)?;
        let deleted: bool = row.try_get("deleted").map_err(Self::db_err)?;
        Ok((id, changed_at, deleted))
    }
}

#[async_trait]
impl ConfigSource for PgConfigSource {
    async fn fetch_channels(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<ChannelRow>>> {
        let rows = self.changed_since("channel", since).await?;
        rows.into_iter()
            .map(|row| {
                let (id, changed_at, deleted) = Self::bookkeeping(&row)?;
                let data = ChannelRow {
                    id,
                    name: row.try_get("name").map_err(Self::db_err)?,
                    kind: row.try_get("kind").map_err(Self::db_err)?,
                    config_blob: row.try_get("config_blob").map_err(Self::db_err)?,
                };
                Ok(ChangeRow { id, changed_at, deleted, data })
            })
            .collect()
    }

    async fn fetch_contacts(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<ContactRow>>> {
        let rows = self.changed_since("contact", since).await?;
        rows.into_iter()
            .map(|row| {
                let (id, changed_at, deleted) = Self::bookkeeping(&row)?;
                let data = ContactRow {
                    id,
                    full_name: row.try_get("full_name").map_err(Self::db_err)?,
                    default_channel_id: row.try_get("default_channel_id").map_err(Self::db_err)?,
                };
                Ok(ChangeRow { id, changed_at, deleted, data })
            })
            .collect()
    }

    async fn fetch_contact_addresses(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<ContactAddressRow>>> {
        let rows = self.changed_since("contact_address", since).await?;
        rows.into_iter()
            .map(|row| {
                let (id, changed_at, deleted) = Self::bookkeeping(&row)?;
                let data = ContactAddressRow {
                    id,
                    contact_id: row.try_get("contact_id").map_err(Self::db_err)?,
                    kind: row.try_get("kind").map_err(Self::db_err)?,
                    address: row.try_get("address").map_err(Self::db_err)?,
                };
                Ok(ChangeRow { id, changed_at, deleted, data })
            })
            .collect()
    }

    async fn fetch_contact_groups(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<ContactGroupRow>>> {
        let rows = self.changed_since("contactgroup", since).await?;
        rows.into_iter()
            .map(|row| {
                let (id, changed_at, deleted) = Self::bookkeeping(&row)?;
                let data = ContactGroupRow {
                    id,
                    name: row.try_get("name").map_err(Self::db_err)?,
                };
                Ok(ChangeRow { id, changed_at, deleted, data })
            })
            .collect()
    }

    async fn fetch_group_members(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<GroupMemberRow>>> {
        let rows = self.changed_since("contactgroup_member", since).await?;
        rows.into_iter()
            .map(|row| {
                let (id, changed_at, deleted) = Self::bookkeeping(&row)?;
                let data = GroupMemberRow {
                    id,
                    group_id: row.try_get("group_id").map_err(Self::db_err)?,
                    contact_id: row.try_get("contact_id").map_err(Self::db_err)?,
                };
                Ok(ChangeRow { id, changed_at, deleted, data })
            })
            .collect()
    }

    async fn fetch_time_periods(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<TimePeriodRow>>> {
        let rows = self.changed_since("timeperiod", since).await?;
        rows.into_iter()
            .map(|row| {
                let (id, changed_at, deleted) = Self::bookkeeping(&row)?;
                let data = TimePeriodRow {
                    id,
                    name: row.try_get("name").map_err(Self::db_err)?,
                };
                Ok(ChangeRow { id, changed_at, deleted, data })
            })
            .collect()
    }

    async fn fetch_schedules(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<ScheduleRow>>> {
        let rows = self.changed_since("schedule", since).await?;
        rows.into_iter()
            .map(|row| {
                let (id, changed_at, deleted) = Self::bookkeeping(&row)?;
                let data = ScheduleRow {
                    id,
                    name: row.try_get("name").map_err(Self::db_err)?,
                };
                Ok(ChangeRow { id, changed_at, deleted, data })
            })
            .collect()
    }

    async fn fetch_rotations(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<RotationRow>>> {
        let rows = self.changed_since("rotation", since).await?;
        rows.into_iter()
            .map(|row| {
                let (id, changed_at, deleted) = Self::bookkeeping(&row)?;
                let data = RotationRow {
                    id,
                    schedule_id: row.try_get("schedule_id").map_err(Self::db_err)?,
                    priority: row.try_get("priority").map_err(Self::db_err)?,
                    actual_handoff: row.try_get("actual_handoff").map_err(Self::db_err)?,
                };
                Ok(ChangeRow { id, changed_at, deleted, data })
            })
            .collect()
    }

    async fn fetch_rotation_members(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<RotationMemberRow>>> {
        let rows = self.changed_since("rotation_member", since).await?;
        rows.into_iter()
            .map(|row| {
                let (id, changed_at, deleted) = Self::bookkeeping(&row)?;
                let recipient = decode_recipient(&row)?;
                let data = RotationMemberRow {
                    id,
                    rotation_id: row.try_get("rotation_id").map_err(Self::db_err)?,
                    recipient,
                    time_period_id: row.try_get("time_period_id").map_err(Self::db_err)?,
                };
                Ok(ChangeRow { id, changed_at, deleted, data })
            })
            .collect()
    }

    async fn fetch_time_period_entries(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<TimePeriodEntryDbRow>>> {
        let rows = self.changed_since("timeperiod_entry", since).await?;
        rows.into_iter()
            .map(|row| {
                let (id, changed_at, deleted) = Self::bookkeeping(&row)?;
                let data = TimePeriodEntryDbRow {
                    id,
                    time_period_id: row.try_get("time_period_id").map_err(Self::db_err)?,
                    start: row.try_get("start").map_err(Self::db_err)?,
                    end: row.try_get("end").map_err(Self::db_err)?,
                    timezone: row.try_get("timezone").map_err(Self::db_err)?,
                    rrule: row.try_get("rrule").map_err(Self::db_err)?,
                };
                Ok(ChangeRow { id, changed_at, deleted, data })
            })
            .collect()
    }

    async fn fetch_sources(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<SourceRow>>> {
        let rows = self.changed_since("source", since).await?;
        rows.into_iter()
            .map(|row| {
                let (id, changed_at, deleted) = Self::bookkeeping(&row)?;
                let data = SourceRow {
                    id,
                    kind: row.try_get("kind").map_err(Self::db_err)?,
                    name: row.try_get("name").map_err(Self::db_err)?,
                    listener_password_hash: row.try_get("listener_password_hash").map_err(Self::db_err)?,
                };
                Ok(ChangeRow { id, changed_at, deleted, data })
            })
            .collect()
    }

    async fn fetch_rules(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<RuleRow>>> {
        let rows = self.changed_since("rule", since).await?;
        rows.into_iter()
            .map(|row| {
                let (id, changed_at, deleted) = Self::bookkeeping(&row)?;
                let data = RuleRow {
                    id,
                    name: row.try_get("name").map_err(Self::db_err)?,
                    object_filter_expr: row.try_get("object_filter_expr").map_err(Self::db_err)?,
                    time_period_id: row.try_get("time_period_id").map_err(Self::db_err)?,
                    active: row.try_get("active").map_err(Self::db_err)?,
                };
                Ok(ChangeRow { id, changed_at, deleted, data })
            })
            .collect()
    }

    async fn fetch_rule_entries(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<RuleEntryRow>>> {
        let rows = self.changed_since("rule_entry", since).await?;
        rows.into_iter()
            .map(|row| {
                let (id, changed_at, deleted) = Self::bookkeeping(&row)?;
                let kind_str: String = row.try_get("kind").map_err(Self::db_err)?;
                let kind = match kind_str.as_str() {
                    "escalation" => nd_common::RuleEntryType::Escalation,
                    _ => nd_common::RuleEntryType::Routing,
                };
                let data = RuleEntryRow {
                    id,
                    rule_id: row.try_get("rule_id").map_err(Self::db_err)?,
                    kind,
                    condition_expr: row.try_get("condition_expr").map_err(Self::db_err)?,
                    fallback_for: row.try_get("fallback_for").map_err(Self::db_err)?,
                };
                Ok(ChangeRow { id, changed_at, deleted, data })
            })
            .collect()
    }

    async fn fetch_rule_entry_recipients(&self, since: DateTime<Utc>) -> Result<Vec<ChangeRow<RuleEntryRecipientRow>>> {
        let rows = self.changed_since("rule_entry_recipient", since).await?;
        rows.into_iter()
            .map(|row| {
                let (id, changed_at, deleted) = Self::bookkeeping(&row)?;
                let recipient = decode_recipient(&row)?;
                let data = RuleEntryRecipientRow {
                    id,
                    rule_entry_id: row.try_get("rule_entry_id").map_err(Self::db_err)?,
                    recipient,
                    channel_id: row.try_get("channel_id").map_err(Self::db_err)?,
                };
                Ok(ChangeRow { id, changed_at, deleted, data })
            })
            .collect()
    }
}

/// Recipient rows store the polymorphic reference as a `kind` discriminator
/// plus a single `target_id` column.
fn decode_recipient(row: &PgRow) -> Result<nd_common::RecipientRef> {
    let kind: String = row
        .try_get("recipient_kind")
        .map_err(|e| NotifydError::TransientDb(e.to_string()))?;
    let target_id: i64 = row
        .try_get("recipient_id")
        .map_err(|e| NotifydError::TransientDb(e.to_string()))?;
    Ok(match kind.as_str() {
        "contact" => nd_common::RecipientRef::Contact { contact_id: target_id },
        "group" => nd_common::RecipientRef::Group { group_id: target_id },
        "schedule" => nd_common::RecipientRef::Schedule { schedule_id: target_id },
        other => return Err(NotifydError::Config(format!("unknown recipient kind {other:?}"))),
    })
}
