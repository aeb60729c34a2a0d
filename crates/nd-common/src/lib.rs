//! Shared domain types for the notifications daemon.
//!
//! This crate holds the entities every other crate in the workspace needs
//! to agree on (objects, events, incidents, recipients, ...), plus the
//! cross-cutting error enum and the logging bootstrap. It owns no
//! behavior beyond small helpers on the types themselves.

pub mod logging;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Severity & event type
// ============================================================================

/// Monitoring severity, ordered from least to most severe for escalation
/// filter comparisons (`incident_severity >= crit`, etc).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Ok,
    Debug,
    Info,
    Notice,
    Warning,
    Err,
    Crit,
    Alert,
    Emerg,
}

impl Severity {
    /// Whether this severity opens an incident when there is none yet.
    pub fn is_problem(&self) -> bool {
        !matches!(self, Severity::None | Severity::Ok)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Ok => "ok",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Notice => "notice",
            Severity::Warning => "warning",
            Severity::Err => "err",
            Severity::Crit => "crit",
            Severity::Alert => "alert",
            Severity::Emerg => "emerg",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "none" => Severity::None,
            "ok" => Severity::Ok,
            "debug" => Severity::Debug,
            "info" => Severity::Info,
            "notice" => Severity::Notice,
            "warning" => Severity::Warning,
            "err" => Severity::Err,
            "crit" => Severity::Crit,
            "alert" => Severity::Alert,
            "emerg" => Severity::Emerg,
            _ => return None,
        })
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-phase carried by the `-*` event types in spec §3 (acknowledgement,
/// downtime, flapping each have a start/end pair).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EventType {
    State,
    Acknowledgement(Phase),
    Downtime(Phase),
    Custom,
    Flapping(Phase),
    Mute,
    Unmute,
    Internal,
}

impl EventType {
    pub fn is_mute_unmute(&self) -> bool {
        matches!(self, EventType::Mute | EventType::Unmute)
    }
}

// ============================================================================
// Source
// ============================================================================

/// An origin of events. Never mutated by the event flow; only by config
/// reload (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    /// bcrypt hash of the source's listener password. Never logged.
    pub listener_password_hash: String,
}

// ============================================================================
// Object
// ============================================================================

/// A monitored entity within a source. `id` is a deterministic content hash
/// of `source_id` and the sorted id-tag sequence (spec §3, §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Object {
    pub id: [u8; 32],
    pub source_id: i64,
    pub name: String,
    pub url: Option<String>,
    pub id_tags: BTreeMap<String, String>,
    pub extra_tags: BTreeMap<String, String>,
    pub mute_reason: Option<String>,
}

impl Object {
    pub fn is_muted(&self) -> bool {
        self.mute_reason.is_some()
    }

    pub fn id_hex(&self) -> String {
        hex_encode(&self.id)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// Event
// ============================================================================

/// An immutable monitoring event, as received from a source (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub source_id: i64,
    pub time: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventType,
    pub severity: Severity,
    pub name: String,
    pub url: Option<String>,
    pub username: Option<String>,
    pub message: Option<String>,
    pub id_tags: BTreeMap<String, String>,
    pub extra_tags: BTreeMap<String, String>,
    pub mute: Option<bool>,
    pub mute_reason: Option<String>,
}

// ============================================================================
// Incident
// ============================================================================

/// One non-recovered lifecycle for an object (spec §3). The timer and
/// escalation-evaluation behavior live in `nd-incident`; this struct is the
/// persisted/replicated shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub object_id: [u8; 32],
    pub severity: Severity,
    pub started_at: DateTime<Utc>,
    pub recovered_at: Option<DateTime<Utc>>,
    pub muted_flag: bool,
    /// recipient key -> role (e.g. "notified", "manager") it was added under.
    pub recipients: BTreeMap<String, String>,
    /// Rule ids already evaluated-and-matched for this incident (memoized,
    /// spec §4.G step 7 — never re-evaluated once matched).
    pub rule_match_set: Vec<i64>,
    /// Rule entry id -> time it first triggered (spec §4.G escalation state).
    pub escalation_state: BTreeMap<i64, DateTime<Utc>>,
}

impl Incident {
    pub fn is_open(&self) -> bool {
        self.recovered_at.is_none()
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.started_at
    }
}

// ============================================================================
// Channel
// ============================================================================

/// A notification delivery method realized by an external plugin process
/// (spec §3, §4.E). `config_blob` must never be logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub config_blob: serde_json::Value,
}

// ============================================================================
// Recipients: Contact / Group / Schedule
// ============================================================================

/// Exactly one of {contact, group, schedule} identifies a Recipient
/// (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RecipientRef {
    Contact { contact_id: i64 },
    Group { group_id: i64 },
    Schedule { schedule_id: i64 },
}

impl fmt::Display for RecipientRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipientRef::Contact { contact_id } => write!(f, "contact:{contact_id}"),
            RecipientRef::Group { group_id } => write!(f, "group:{group_id}"),
            RecipientRef::Schedule { schedule_id } => write!(f, "schedule:{schedule_id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub full_name: String,
    pub default_channel_id: Option<i64>,
    pub addresses: Vec<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactGroup {
    pub id: i64,
    pub name: String,
    /// Ordered contact ids (spec §3: "an ordered set of contact references").
    pub members: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: i64,
    pub name: String,
    /// Ordered rotation ids, oldest-defined first; `nd-rotation` re-sorts by
    /// priority/handoff for resolution.
    pub rotations: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rotation {
    pub id: i64,
    pub schedule_id: i64,
    pub priority: i32,
    pub actual_handoff: DateTime<Utc>,
    pub members: Vec<RotationMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationMember {
    pub id: i64,
    pub rotation_id: i64,
    /// Either a contact or a group (spec §3); never a schedule.
    pub recipient: RecipientRef,
    pub time_period_id: i64,
}

// ============================================================================
// Time periods
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimePeriod {
    pub id: i64,
    pub name: String,
    pub entries: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimePeriodEntryRow {
    pub id: i64,
    pub time_period_id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub timezone: String,
    pub rrule: Option<String>,
}

// ============================================================================
// Rules
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub name: String,
    pub object_filter_expr: Option<String>,
    pub time_period_id: Option<i64>,
    pub active: bool,
    pub entries: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleEntryType {
    Escalation,
    Routing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEntry {
    pub id: i64,
    pub rule_id: i64,
    pub kind: RuleEntryType,
    pub condition_expr: Option<String>,
    pub fallback_for: Option<i64>,
    pub recipients: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRecipient {
    pub id: i64,
    pub rule_entry_id: i64,
    pub recipient: RecipientRef,
    pub channel_id: Option<i64>,
}

// ============================================================================
// Notification history
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationState {
    Pending,
    Sent,
    Failed,
    Suppressed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationHistory {
    pub id: i64,
    pub incident_id: Option<i64>,
    pub rule_entry_id: Option<i64>,
    pub recipient_key: RecipientRef,
    pub time: DateTime<Utc>,
    pub channel_id: i64,
    pub state: NotificationState,
    pub sent_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

// ============================================================================
// Errors (spec §7)
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum NotifydError {
    #[error("parse error at {line}:{col} (offset {offset}): {message}")]
    Parse {
        line: usize,
        col: usize,
        offset: usize,
        message: String,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("transient database error: {0}")]
    TransientDb(String),

    #[error("fatal database error: {0}")]
    FatalDb(String),

    #[error("superfluous state change")]
    SuperfluousStateChange,

    #[error("superfluous mute/unmute event")]
    SuperfluousMuteUnmuteEvent,

    #[error("plugin transport error: {0}")]
    PluginTransport(String),

    #[error("plugin call error: {0}")]
    PluginCall(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("unknown source: {0}")]
    UnknownSource(i64),

    #[error("event is missing id-tags")]
    MissingIdTags,
}

pub type Result<T> = std::result::Result<T, NotifydError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_matches_monitoring_convention() {
        assert!(Severity::Ok < Severity::Warning);
        assert!(Severity::Warning < Severity::Crit);
        assert!(Severity::Crit < Severity::Emerg);
    }

    #[test]
    fn severity_is_problem() {
        assert!(!Severity::None.is_problem());
        assert!(!Severity::Ok.is_problem());
        assert!(Severity::Warning.is_problem());
        assert!(Severity::Crit.is_problem());
    }

    #[test]
    fn severity_round_trips_through_str() {
        for s in [
            Severity::None,
            Severity::Ok,
            Severity::Debug,
            Severity::Info,
            Severity::Notice,
            Severity::Warning,
            Severity::Err,
            Severity::Crit,
            Severity::Alert,
            Severity::Emerg,
        ] {
            assert_eq!(Severity::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn object_muted_reflects_mute_reason() {
        let mut obj = Object {
            id: [0u8; 32],
            source_id: 1,
            name: "host1".into(),
            url: None,
            id_tags: BTreeMap::new(),
            extra_tags: BTreeMap::new(),
            mute_reason: None,
        };
        assert!(!obj.is_muted());
        obj.mute_reason = Some("maintenance".into());
        assert!(obj.is_muted());
    }

    #[test]
    fn recipient_ref_display() {
        assert_eq!(
            RecipientRef::Contact { contact_id: 42 }.to_string(),
            "contact:42"
        );
        assert_eq!(
            RecipientRef::Schedule { schedule_id: 7 }.to_string(),
            "schedule:7"
        );
    }
}
