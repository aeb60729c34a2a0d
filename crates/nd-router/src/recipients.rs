//! Recipient expansion (spec §4.G step 10): contact → itself, group →
//! members, schedule → rotation resolver result, itself expanded one more
//! level since a resolved recipient is always a contact or a group.

use chrono::{DateTime, Utc};
use nd_common::RecipientRef;
use nd_configstore::ConfigGraph;
use nd_timeperiod::TimePeriod;
use std::collections::HashMap;

/// Every `(id, time_period_id)` a schedule's rotations might resolve
/// against, pre-cloned so `RotationResolver::resolve` can borrow a plain
/// map instead of reaching back into the graph's derived caches.
pub fn time_period_map(config: &ConfigGraph) -> HashMap<i64, TimePeriod> {
    let mut map = HashMap::new();
    for member in config.rotation_members.values() {
        map.entry(member.time_period_id).or_insert_with(|| {
            config
                .time_period(member.time_period_id)
                .map(|tp| (*tp).clone())
                .unwrap_or_else(|| TimePeriod::new(Vec::new()))
        });
    }
    map
}

/// Expands a recipient reference into the contact ids it denotes at `at`.
pub fn expand_recipient(
    recipient: &RecipientRef,
    config: &ConfigGraph,
    time_periods: &HashMap<i64, TimePeriod>,
    at: DateTime<Utc>,
) -> Vec<i64> {
    match recipient {
        RecipientRef::Contact { contact_id } => vec![*contact_id],
        RecipientRef::Group { group_id } => config.group_member_ids(*group_id),
        RecipientRef::Schedule { schedule_id } => {
            let Some(resolver) = config.resolver_for_schedule(*schedule_id) else {
                return Vec::new();
            };
            match resolver.resolve(at, time_periods) {
                Some(RecipientRef::Contact { contact_id }) => vec![contact_id],
                Some(RecipientRef::Group { group_id }) => config.group_member_ids(group_id),
                // A rotation member never names a schedule (nd-common's
                // `RotationMember` doc comment); treat it as empty rather
                // than recursing indefinitely.
                Some(RecipientRef::Schedule { .. }) | None => Vec::new(),
            }
        }
    }
}

/// The channel a (contact, entry-recipient) pair notifies on: the entry
/// recipient's explicit channel, else the contact's default (spec §4.G
/// step 10 "Channel selection order").
pub fn select_channel(entry_channel: Option<i64>, contact_default_channel: Option<i64>) -> Option<i64> {
    entry_channel.or(contact_default_channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_selection_prefers_entry_override() {
        assert_eq!(select_channel(Some(5), Some(1)), Some(5));
        assert_eq!(select_channel(None, Some(1)), Some(1));
        assert_eq!(select_channel(None, None), None);
    }
}
