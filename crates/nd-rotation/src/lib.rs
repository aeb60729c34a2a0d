//! Rotation resolver (spec §4.C): given a schedule's rotations, answers
//! "who is on call at time `t`". Rotations are grouped by priority (index 0
//! is highest precedence) and, within a group, sorted ascending by
//! `actual_handoff` so the active version at `t` is a binary search away.
//! Rebuilt by the config store whenever a rotation or its members change.

use chrono::{DateTime, Utc};
use nd_common::{RecipientRef, Rotation};
use nd_timeperiod::TimePeriod;
use std::collections::{BTreeMap, HashMap};

pub struct RotationResolver {
    /// Ascending precedence: `priority_groups[0]` is evaluated first.
    priority_groups: Vec<Vec<Rotation>>,
}

impl RotationResolver {
    pub fn build(rotations: &[Rotation]) -> Self {
        let mut by_priority: BTreeMap<i32, Vec<Rotation>> = BTreeMap::new();
        for rotation in rotations {
            by_priority
                .entry(rotation.priority)
                .or_default()
                .push(rotation.clone());
        }
        let priority_groups = by_priority
            .into_values()
            .map(|mut versions| {
                versions.sort_by_key(|r| r.actual_handoff);
                versions
            })
            .collect();
        Self { priority_groups }
    }

    /// Returns the recipient contributed by the highest-precedence group
    /// with an active version at `t` whose members include one covered by
    /// its time period. `time_periods` must contain every time period a
    /// rotation member references; a missing id is treated as never
    /// containing `t`.
    pub fn resolve(
        &self,
        t: DateTime<Utc>,
        time_periods: &HashMap<i64, TimePeriod>,
    ) -> Option<RecipientRef> {
        for group in &self.priority_groups {
            // Greatest version with actual_handoff <= t.
            let idx = group.partition_point(|r| r.actual_handoff <= t);
            if idx == 0 {
                // This group's first handoff is still in the future.
                continue;
            }
            let active = &group[idx - 1];
            if let Some(recipient) = active
                .members
                .iter()
                .find(|m| time_periods.get(&m.time_period_id).is_some_and(|tp| tp.contains(t)))
                .map(|m| m.recipient.clone())
            {
                return Some(recipient);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use nd_common::RotationMember;
    use nd_timeperiod::TimePeriodEntry;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, h, 0, 0).unwrap()
    }

    fn always_on() -> TimePeriod {
        TimePeriod::new(vec![TimePeriodEntry::new(
            at(0).with_timezone(&chrono_tz::UTC),
            at(0).with_timezone(&chrono_tz::UTC) + chrono::Duration::days(3650),
            None,
        )
        .unwrap()])
    }

    fn rotation(id: i64, priority: i32, handoff_h: u32, member_recipient: RecipientRef, tp_id: i64) -> Rotation {
        Rotation {
            id,
            schedule_id: 1,
            priority,
            actual_handoff: at(handoff_h),
            members: vec![RotationMember {
                id,
                rotation_id: id,
                recipient: member_recipient,
                time_period_id: tp_id,
            }],
        }
    }

    #[test]
    fn higher_precedence_group_wins_when_active() {
        let rotations = vec![
            rotation(1, 0, 0, RecipientRef::Contact { contact_id: 1 }, 1),
            rotation(2, 1, 0, RecipientRef::Contact { contact_id: 2 }, 1),
        ];
        let resolver = RotationResolver::build(&rotations);
        let mut tps = HashMap::new();
        tps.insert(1, always_on());
        assert_eq!(resolver.resolve(at(5), &tps), Some(RecipientRef::Contact { contact_id: 1 }));
    }

    #[test]
    fn group_yields_nothing_before_first_handoff() {
        let rotations = vec![rotation(1, 0, 10, RecipientRef::Contact { contact_id: 1 }, 1)];
        let resolver = RotationResolver::build(&rotations);
        let mut tps = HashMap::new();
        tps.insert(1, always_on());
        assert_eq!(resolver.resolve(at(5), &tps), None);
    }

    #[test]
    fn binary_search_picks_latest_handoff_not_exceeding_t() {
        let rotations = vec![
            rotation(1, 0, 0, RecipientRef::Contact { contact_id: 1 }, 1),
            rotation(2, 0, 10, RecipientRef::Contact { contact_id: 2 }, 1),
            rotation(3, 0, 20, RecipientRef::Contact { contact_id: 3 }, 1),
        ];
        let resolver = RotationResolver::build(&rotations);
        let mut tps = HashMap::new();
        tps.insert(1, always_on());
        assert_eq!(resolver.resolve(at(15), &tps), Some(RecipientRef::Contact { contact_id: 2 }));
    }

    #[test]
    fn falls_through_to_lower_priority_group_when_time_period_excludes_t() {
        let rotations = vec![
            rotation(1, 0, 0, RecipientRef::Contact { contact_id: 1 }, 99),
            rotation(2, 1, 0, RecipientRef::Contact { contact_id: 2 }, 1),
        ];
        let resolver = RotationResolver::build(&rotations);
        let mut tps = HashMap::new();
        tps.insert(1, always_on());
        assert_eq!(resolver.resolve(at(5), &tps), Some(RecipientRef::Contact { contact_id: 2 }));
    }
}
