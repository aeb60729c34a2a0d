//! Recurrence and time-period membership engine (spec §4.B). A
//! [`TimePeriodEntry`] pairs a `(start, end)` window with an optional RFC
//! 5545 `RRULE`; a [`TimePeriod`] ORs a set of entries together and bounds
//! its aggregate `NextTransition` to a 24-hour lookahead so incidents are
//! never left without a re-evaluation deadline.

use chrono::{DateTime, Duration, SubsecRound, TimeZone, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum TimePeriodError {
    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),
    #[error("invalid RRULE: {0}")]
    InvalidRule(String),
}

#[derive(Clone)]
pub struct TimePeriodEntry {
    start: DateTime<Tz>,
    end: DateTime<Tz>,
    rrule: Option<RRuleSet>,
}

impl TimePeriodEntry {
    pub fn new(
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        rrule_src: Option<&str>,
    ) -> Result<Self, TimePeriodError> {
        let start = start.trunc_subsecs(0);
        let end = end.trunc_subsecs(0);
        let rrule = match rrule_src {
            None => None,
            Some(raw) => Some(Self::parse_rrule(raw, start)?),
        };
        Ok(Self { start, end, rrule })
    }

    /// Builds from a persisted row, resolving its IANA timezone name and
    /// anchoring a `Dtstart`-less RRULE at the entry's own `start`.
    pub fn from_row(row: &nd_common::TimePeriodEntryRow) -> Result<Self, TimePeriodError> {
        let tz: Tz = Tz::from_str(&row.timezone)
            .map_err(|_| TimePeriodError::UnknownTimezone(row.timezone.clone()))?;
        let start = row.start.with_timezone(&tz);
        let end = row.end.with_timezone(&tz);
        Self::new(start, end, row.rrule.as_deref())
    }

    fn parse_rrule(raw: &str, start: DateTime<Tz>) -> Result<RRuleSet, TimePeriodError> {
        let text = if raw.to_uppercase().contains("DTSTART") {
            raw.to_string()
        } else {
            format!("DTSTART:{}\n{}", start.format("%Y%m%dT%H%M%S"), raw)
        };
        text.parse::<RRuleSet>()
            .map_err(|e| TimePeriodError::InvalidRule(e.to_string()))
    }

    fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// `t ∈ [start, end)`, or with a recurrence rule, inside the window
    /// that follows the most recent occurrence on or before `t`.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        let t = t.with_timezone(&self.start.timezone());
        match &self.rrule {
            None => t >= self.start && t < self.end,
            Some(set) => match last_occurrence_start(set, t) {
                Some(last_start) => t < last_start + self.duration(),
                None => false,
            },
        }
    }

    /// The smallest boundary at-or-after `t`, or `None` if the entry never
    /// transitions again (no rrule and `t` already past `end`).
    pub fn next_transition(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = t.with_timezone(&self.start.timezone());
        if local < self.start {
            return Some(self.start.with_timezone(&Utc));
        }
        if local < self.end {
            return Some(self.end.with_timezone(&Utc));
        }
        let set = self.rrule.as_ref()?;
        if let Some(last_start) = last_occurrence_start(set, local) {
            if local < last_start + self.duration() {
                return Some((last_start + self.duration()).with_timezone(&Utc));
            }
        }
        next_occurrence_start(set, local).map(|s| s.with_timezone(&Utc))
    }
}

fn last_occurrence_start(set: &RRuleSet, t: DateTime<Tz>) -> Option<DateTime<Tz>> {
    set.just_before(t, true).ok().flatten()
}

fn next_occurrence_start(set: &RRuleSet, t: DateTime<Tz>) -> Option<DateTime<Tz>> {
    set.just_after(t, false).ok().flatten()
}

/// An OR of entries, matching spec §4.B's TimePeriod aggregate semantics.
#[derive(Clone)]
pub struct TimePeriod {
    pub entries: Vec<TimePeriodEntry>,
}

const LOOKAHEAD: i64 = 24;

impl TimePeriod {
    pub fn new(entries: Vec<TimePeriodEntry>) -> Self {
        Self { entries }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.entries.iter().any(|e| e.contains(t))
    }

    /// Never returns a time further than 24h out, so a matched rule's
    /// escalation timer always has a deadline to re-arm against.
    pub fn next_transition(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let bound = t + Duration::hours(LOOKAHEAD);
        let earliest = self.entries.iter().filter_map(|e| e.next_transition(t)).min();
        match earliest {
            Some(nt) if nt < bound => nt,
            _ => bound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn tz_dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        utc(y, mo, d, h, mi).with_timezone(&chrono_tz::UTC)
    }

    #[test]
    fn plain_window_contains_and_transitions() {
        let entry = TimePeriodEntry::new(tz_dt(2026, 1, 1, 9, 0), tz_dt(2026, 1, 1, 17, 0), None).unwrap();
        assert!(!entry.contains(utc(2026, 1, 1, 8, 0)));
        assert!(entry.contains(utc(2026, 1, 1, 12, 0)));
        assert!(!entry.contains(utc(2026, 1, 1, 17, 0)));

        assert_eq!(entry.next_transition(utc(2026, 1, 1, 8, 0)), Some(utc(2026, 1, 1, 9, 0)));
        assert_eq!(entry.next_transition(utc(2026, 1, 1, 12, 0)), Some(utc(2026, 1, 1, 17, 0)));
        assert_eq!(entry.next_transition(utc(2026, 1, 1, 18, 0)), None);
    }

    #[test]
    fn aggregate_next_transition_is_bounded_by_24h() {
        let far_entry =
            TimePeriodEntry::new(tz_dt(2030, 1, 1, 9, 0), tz_dt(2030, 1, 1, 17, 0), None).unwrap();
        let period = TimePeriod::new(vec![far_entry]);
        let now = utc(2026, 1, 1, 0, 0);
        assert_eq!(period.next_transition(now), now + Duration::hours(24));
    }

    #[test]
    fn aggregate_membership_is_or_of_entries() {
        let morning = TimePeriodEntry::new(tz_dt(2026, 1, 1, 6, 0), tz_dt(2026, 1, 1, 9, 0), None).unwrap();
        let evening = TimePeriodEntry::new(tz_dt(2026, 1, 1, 18, 0), tz_dt(2026, 1, 1, 22, 0), None).unwrap();
        let period = TimePeriod::new(vec![morning, evening]);
        assert!(period.contains(utc(2026, 1, 1, 7, 0)));
        assert!(period.contains(utc(2026, 1, 1, 19, 0)));
        assert!(!period.contains(utc(2026, 1, 1, 12, 0)));
    }
}
