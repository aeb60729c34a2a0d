//! Per-incident lifecycle logic (spec §4.G step 6-8): severity updates,
//! the matched-rule and escalation memoization, and the history notes the
//! caller's transaction needs to persist. Held behind the registry's
//! per-object mutex (spec §5 "per-incident mutex").

use chrono::{DateTime, Utc};
use nd_common::{EventType, Incident, Phase, Severity};

/// A sub-event the caller must turn into a history row. `Incident` itself
/// only tracks severity/timing/memoization; the row shapes live in
/// `nd-router`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryNote {
    Acknowledgement(Phase),
    Downtime(Phase),
    Flapping(Phase),
    Mute,
    Unmute,
}

#[derive(Debug, Clone)]
pub struct EventOutcome {
    pub severity_changed: bool,
    pub closed: bool,
    pub history_note: Option<HistoryNote>,
}

/// Owns at most one open incident for an object. `nd-router` looks this up
/// through `IncidentRegistry`, locks it, and drives the pipeline.
pub struct IncidentActor {
    pub incident: Option<Incident>,
}

impl IncidentActor {
    pub fn new() -> Self {
        Self { incident: None }
    }

    /// Seeds an actor from an incident already open in the database
    /// (`recovered_at IS NULL`), so a daemon restart picks up where it
    /// left off instead of opening a second incident for the same object.
    pub fn from_incident(incident: Incident) -> Self {
        Self { incident: Some(incident) }
    }

    pub fn is_open(&self) -> bool {
        self.incident.as_ref().is_some_and(Incident::is_open)
    }

    /// Opens a fresh incident (spec §4.G step 3: non-none/non-ok severity,
    /// no open incident yet).
    pub fn open(&mut self, next_id: i64, object_id: [u8; 32], severity: Severity, now: DateTime<Utc>) {
        self.incident = Some(Incident {
            id: next_id,
            object_id,
            severity,
            started_at: now,
            recovered_at: None,
            muted_flag: false,
            recipients: Default::default(),
            rule_match_set: Vec::new(),
            escalation_state: Default::default(),
        });
    }

    /// Folds one event into the open incident (spec §4.G step 6): takes
    /// the event severity when it's non-none/non-ok, records `recovered_at`
    /// on OK, and surfaces the history note the caller should persist.
    pub fn process_event(
        &mut self,
        event_kind: EventType,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> EventOutcome {
        let Some(incident) = self.incident.as_mut() else {
            return EventOutcome { severity_changed: false, closed: false, history_note: None };
        };

        let mut severity_changed = false;
        let mut closed = false;

        if severity.is_problem() {
            if incident.severity != severity {
                incident.severity = severity;
                severity_changed = true;
            }
        } else if severity == Severity::Ok {
            incident.recovered_at = Some(now);
            closed = true;
        }

        let history_note = match event_kind {
            EventType::Acknowledgement(phase) => Some(HistoryNote::Acknowledgement(phase)),
            EventType::Downtime(phase) => Some(HistoryNote::Downtime(phase)),
            EventType::Flapping(phase) => Some(HistoryNote::Flapping(phase)),
            EventType::Mute => {
                incident.muted_flag = true;
                Some(HistoryNote::Mute)
            }
            EventType::Unmute => {
                incident.muted_flag = false;
                Some(HistoryNote::Unmute)
            }
            _ => None,
        };

        EventOutcome { severity_changed, closed, history_note }
    }

    /// Spec §4.G step 7: a rule is evaluated against the object once per
    /// incident and, on match, memoized forever after.
    pub fn has_matched_rule(&self, rule_id: i64) -> bool {
        self.incident.as_ref().is_some_and(|i| i.rule_match_set.contains(&rule_id))
    }

    pub fn record_rule_match(&mut self, rule_id: i64) {
        if let Some(incident) = self.incident.as_mut() {
            if !incident.rule_match_set.contains(&rule_id) {
                incident.rule_match_set.push(rule_id);
            }
        }
    }

    /// Spec §4.G step 8: the first time an escalation entry's condition
    /// matches is recorded so later evaluations see it as already
    /// triggered.
    pub fn has_triggered_entry(&self, entry_id: i64) -> bool {
        self.incident.as_ref().is_some_and(|i| i.escalation_state.contains_key(&entry_id))
    }

    pub fn record_entry_trigger(&mut self, entry_id: i64, at: DateTime<Utc>) {
        if let Some(incident) = self.incident.as_mut() {
            incident.escalation_state.entry(entry_id).or_insert(at);
        }
    }
}

impl Default for IncidentActor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(s: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(s, 0).unwrap()
    }

    #[test]
    fn opening_and_escalating_severity() {
        let mut actor = IncidentActor::new();
        actor.open(1, [0u8; 32], Severity::Warning, at(0));
        let outcome = actor.process_event(EventType::State, Severity::Crit, at(10));
        assert!(outcome.severity_changed);
        assert!(!outcome.closed);
        assert_eq!(actor.incident.as_ref().unwrap().severity, Severity::Crit);
    }

    #[test]
    fn ok_event_closes_the_incident() {
        let mut actor = IncidentActor::new();
        actor.open(1, [0u8; 32], Severity::Warning, at(0));
        let outcome = actor.process_event(EventType::State, Severity::Ok, at(10));
        assert!(outcome.closed);
        assert_eq!(actor.incident.as_ref().unwrap().recovered_at, Some(at(10)));
        assert!(!actor.is_open());
    }

    #[test]
    fn mute_event_sets_flag_and_emits_history_note() {
        let mut actor = IncidentActor::new();
        actor.open(1, [0u8; 32], Severity::Warning, at(0));
        let outcome = actor.process_event(EventType::Mute, Severity::Warning, at(5));
        assert_eq!(outcome.history_note, Some(HistoryNote::Mute));
        assert!(actor.incident.as_ref().unwrap().muted_flag);
    }

    #[test]
    fn rule_match_is_memoized_once() {
        let mut actor = IncidentActor::new();
        actor.open(1, [0u8; 32], Severity::Warning, at(0));
        assert!(!actor.has_matched_rule(7));
        actor.record_rule_match(7);
        actor.record_rule_match(7);
        assert!(actor.has_matched_rule(7));
        assert_eq!(actor.incident.as_ref().unwrap().rule_match_set, vec![7]);
    }

    #[test]
    fn escalation_trigger_keeps_first_recorded_time() {
        let mut actor = IncidentActor::new();
        actor.open(1, [0u8; 32], Severity::Warning, at(0));
        actor.record_entry_trigger(3, at(10));
        actor.record_entry_trigger(3, at(99));
        assert_eq!(actor.incident.as_ref().unwrap().escalation_state.get(&3), Some(&at(10)));
    }
}
