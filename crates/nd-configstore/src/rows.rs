//! Flat row shapes matching the database schema (spec §6): one struct per
//! table, each with the `changed_at`/`deleted` columns every synced table
//! carries. Domain types in `nd_common` nest children (e.g. `Contact`'s
//! `addresses`); rows never do — nesting is hydrated by the graph from
//! sibling tables after the merge.

use chrono::{DateTime, Utc};
use nd_common::{Channel, Contact, ContactGroup, Rotation, RotationMember, Rule, RuleEntry, RuleEntryType, EntryRecipient, Source, TimePeriod, TimePeriodEntryRow};
use serde_json::Value;

/// Wraps a fetched row with the sync bookkeeping columns every entity
/// table carries.
#[derive(Debug, Clone)]
pub struct ChangeRow<T> {
    pub id: i64,
    pub changed_at: DateTime<Utc>,
    pub deleted: bool,
    pub data: T,
}

#[derive(Debug, Clone)]
pub struct ContactAddressRow {
    pub id: i64,
    pub contact_id: i64,
    pub kind: String,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct GroupMemberRow {
    pub id: i64,
    pub group_id: i64,
    pub contact_id: i64,
}

/// Raw row for `channel`; maps directly onto [`nd_common::Channel`].
#[derive(Debug, Clone)]
pub struct ChannelRow {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub config_blob: Value,
}

impl From<ChannelRow> for Channel {
    fn from(r: ChannelRow) -> Self {
        Channel {
            id: r.id,
            name: r.name,
            kind: r.kind,
            config_blob: r.config_blob,
        }
    }
}

/// Raw row for `contact`, without its `addresses` (a sibling table).
#[derive(Debug, Clone)]
pub struct ContactRow {
    pub id: i64,
    pub full_name: String,
    pub default_channel_id: Option<i64>,
}

impl From<ContactRow> for Contact {
    fn from(r: ContactRow) -> Self {
        Contact {
            id: r.id,
            full_name: r.full_name,
            default_channel_id: r.default_channel_id,
            addresses: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContactGroupRow {
    pub id: i64,
    pub name: String,
}

impl From<ContactGroupRow> for ContactGroup {
    fn from(r: ContactGroupRow) -> Self {
        ContactGroup {
            id: r.id,
            name: r.name,
            members: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimePeriodRow {
    pub id: i64,
    pub name: String,
}

impl From<TimePeriodRow> for TimePeriod {
    fn from(r: TimePeriodRow) -> Self {
        TimePeriod {
            id: r.id,
            name: r.name,
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleRow {
    pub id: i64,
    pub name: String,
}

impl From<ScheduleRow> for nd_common::Schedule {
    fn from(r: ScheduleRow) -> Self {
        nd_common::Schedule {
            id: r.id,
            name: r.name,
            rotations: Vec::new(),
        }
    }
}

/// Raw row for `rotation`, without its `members` (a sibling table).
#[derive(Debug, Clone)]
pub struct RotationRow {
    pub id: i64,
    pub schedule_id: i64,
    pub priority: i32,
    pub actual_handoff: DateTime<Utc>,
}

impl From<RotationRow> for Rotation {
    fn from(r: RotationRow) -> Self {
        Rotation {
            id: r.id,
            schedule_id: r.schedule_id,
            priority: r.priority,
            actual_handoff: r.actual_handoff,
            members: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleRow {
    pub id: i64,
    pub name: String,
    pub object_filter_expr: Option<String>,
    pub time_period_id: Option<i64>,
    pub active: bool,
}

impl From<RuleRow> for Rule {
    fn from(r: RuleRow) -> Self {
        Rule {
            id: r.id,
            name: r.name,
            object_filter_expr: r.object_filter_expr,
            time_period_id: r.time_period_id,
            active: r.active,
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleEntryRow {
    pub id: i64,
    pub rule_id: i64,
    pub kind: RuleEntryType,
    pub condition_expr: Option<String>,
    pub fallback_for: Option<i64>,
}

impl From<RuleEntryRow> for RuleEntry {
    fn from(r: RuleEntryRow) -> Self {
        RuleEntry {
            id: r.id,
            rule_id: r.rule_id,
            kind: r.kind,
            condition_expr: r.condition_expr,
            fallback_for: r.fallback_for,
            recipients: Vec::new(),
        }
    }
}

// RotationMember, EntryRecipient, TimePeriodEntryRow, Source already have
// no nested children, so they double as their own row shapes.
pub type RotationMemberRow = RotationMember;
pub type RuleEntryRecipientRow = EntryRecipient;
pub type TimePeriodEntryDbRow = TimePeriodEntryRow;
pub type SourceRow = Source;
