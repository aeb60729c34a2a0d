//! The currently-applied configuration graph: flat per-table maps plus the
//! derived views ([`nd_rotation::RotationResolver`] per schedule,
//! [`nd_timeperiod::TimePeriod`] per time period) that `nd-router` and
//! `nd-incident` actually query against.

use crate::kinds::EntityKind;
use crate::merge::{apply_changes, Applied};
use crate::rows::*;
use chrono::{DateTime, Utc};
use nd_common::{
    Channel, Contact, ContactGroup, Result as NdResult, Rotation, RotationMember, Rule, RuleEntry,
    Schedule, Source, TimePeriod as TimePeriodMeta, TimePeriodEntryRow, EntryRecipient,
};
use nd_rotation::RotationResolver;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// One fetched-and-validated batch, tagged by which table it came from.
/// `ConfigStore::sync` constructs these from [`crate::source::ConfigSource`]
/// fetches and hands them to [`ConfigGraph::apply_batch`].
pub enum FetchedBatch {
    Channel(Vec<ChangeRow<ChannelRow>>),
    Contact(Vec<ChangeRow<ContactRow>>),
    ContactAddress(Vec<ChangeRow<ContactAddressRow>>),
    ContactGroup(Vec<ChangeRow<ContactGroupRow>>),
    GroupMember(Vec<ChangeRow<GroupMemberRow>>),
    TimePeriod(Vec<ChangeRow<TimePeriodRow>>),
    Schedule(Vec<ChangeRow<ScheduleRow>>),
    Rotation(Vec<ChangeRow<RotationRow>>),
    RotationMember(Vec<ChangeRow<RotationMemberRow>>),
    TimePeriodEntry(Vec<ChangeRow<TimePeriodEntryDbRow>>),
    Source(Vec<ChangeRow<SourceRow>>),
    Rule(Vec<ChangeRow<RuleRow>>),
    RuleEntry(Vec<ChangeRow<RuleEntryRow>>),
    RuleEntryRecipient(Vec<ChangeRow<RuleEntryRecipientRow>>),
}

impl FetchedBatch {
    pub fn kind(&self) -> EntityKind {
        match self {
            FetchedBatch::Channel(_) => EntityKind::Channel,
            FetchedBatch::Contact(_) => EntityKind::Contact,
            FetchedBatch::ContactAddress(_) => EntityKind::ContactAddress,
            FetchedBatch::ContactGroup(_) => EntityKind::ContactGroup,
            FetchedBatch::GroupMember(_) => EntityKind::GroupMember,
            FetchedBatch::TimePeriod(_) => EntityKind::TimePeriod,
            FetchedBatch::Schedule(_) => EntityKind::Schedule,
            FetchedBatch::Rotation(_) => EntityKind::Rotation,
            FetchedBatch::RotationMember(_) => EntityKind::RotationMember,
            FetchedBatch::TimePeriodEntry(_) => EntityKind::TimePeriodEntry,
            FetchedBatch::Source(_) => EntityKind::Source,
            FetchedBatch::Rule(_) => EntityKind::Rule,
            FetchedBatch::RuleEntry(_) => EntityKind::RuleEntry,
            FetchedBatch::RuleEntryRecipient(_) => EntityKind::RuleEntryRecipient,
        }
    }

    pub fn max_changed_at(&self) -> Option<DateTime<Utc>> {
        fn max_of<T>(rows: &[ChangeRow<T>]) -> Option<DateTime<Utc>> {
            rows.iter().map(|r| r.changed_at).max()
        }
        match self {
            FetchedBatch::Channel(r) => max_of(r),
            FetchedBatch::Contact(r) => max_of(r),
            FetchedBatch::ContactAddress(r) => max_of(r),
            FetchedBatch::ContactGroup(r) => max_of(r),
            FetchedBatch::GroupMember(r) => max_of(r),
            FetchedBatch::TimePeriod(r) => max_of(r),
            FetchedBatch::Schedule(r) => max_of(r),
            FetchedBatch::Rotation(r) => max_of(r),
            FetchedBatch::RotationMember(r) => max_of(r),
            FetchedBatch::TimePeriodEntry(r) => max_of(r),
            FetchedBatch::Source(r) => max_of(r),
            FetchedBatch::Rule(r) => max_of(r),
            FetchedBatch::RuleEntry(r) => max_of(r),
            FetchedBatch::RuleEntryRecipient(r) => max_of(r),
        }
    }
}

#[derive(Default)]
pub struct ConfigGraph {
    pub channels: BTreeMap<i64, Channel>,
    pub contacts: BTreeMap<i64, Contact>,
    pub contact_addresses: BTreeMap<i64, ContactAddressRow>,
    pub contact_groups: BTreeMap<i64, ContactGroup>,
    pub group_members: BTreeMap<i64, GroupMemberRow>,
    pub time_periods: BTreeMap<i64, TimePeriodMeta>,
    pub schedules: BTreeMap<i64, Schedule>,
    pub rotations: BTreeMap<i64, Rotation>,
    pub rotation_members: BTreeMap<i64, RotationMember>,
    pub time_period_entries: BTreeMap<i64, TimePeriodEntryRow>,
    pub sources: BTreeMap<i64, Source>,
    pub rules: BTreeMap<i64, Rule>,
    pub rule_entries: BTreeMap<i64, RuleEntry>,
    pub rule_entry_recipients: BTreeMap<i64, EntryRecipient>,

    /// Rebuilt whenever a rotation or rotation member in that schedule
    /// changes (spec §4.D "After rotation/member changes...").
    pub resolvers: HashMap<i64, Arc<RotationResolver>>,
    /// Rebuilt whenever one of its entries changes.
    pub time_period_cache: HashMap<i64, Arc<nd_timeperiod::TimePeriod>>,

    changed_at: HashMap<EntityKind, BTreeMap<i64, DateTime<Utc>>>,
    high_watermark: HashMap<EntityKind, DateTime<Utc>>,
}

impl ConfigGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn since_for(&self, kind: EntityKind, backlog: chrono::Duration) -> DateTime<Utc> {
        self.high_watermark
            .get(&kind)
            .copied()
            .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC)
            .checked_sub_signed(backlog)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn apply_batch(&mut self, batch: FetchedBatch) -> NdResult<()> {
        let kind = batch.kind();
        if let Some(max_changed) = batch.max_changed_at() {
            let entry = self.high_watermark.entry(kind).or_insert(max_changed);
            if max_changed > *entry {
                *entry = max_changed;
            }
        }

        match batch {
            FetchedBatch::Channel(rows) => {
                let mut wm = self.watermark(EntityKind::Channel);
                apply_changes(
                    &mut self.channels,
                    &mut wm,
                    rows,
                    |live, id, data| {
                        live.insert(id, data.into());
                    },
                    |live, id, data| {
                        live.insert(id, data.into());
                        Applied::Updated
                    },
                    |_, _| {},
                );
                self.set_watermark(EntityKind::Channel, wm);
            }
            FetchedBatch::Contact(rows) => {
                let mut wm = self.watermark(EntityKind::Contact);
                apply_changes(
                    &mut self.contacts,
                    &mut wm,
                    rows,
                    |live, id, data| {
                        live.insert(id, data.into());
                    },
                    |live, id, data| {
                        // Preserve addresses hydrated from the sibling table.
                        let addresses = live.get(&id).map(|c| c.addresses.clone()).unwrap_or_default();
                        let mut contact: Contact = data.into();
                        contact.addresses = addresses;
                        live.insert(id, contact);
                        Applied::Updated
                    },
                    |_, _| {},
                );
                self.set_watermark(EntityKind::Contact, wm);
            }
            FetchedBatch::ContactAddress(rows) => {
                let mut wm = self.watermark(EntityKind::ContactAddress);
                apply_changes(
                    &mut self.contact_addresses,
                    &mut wm,
                    rows,
                    |live, id, data| {
                        live.insert(id, data);
                    },
                    |live, id, data| {
                        live.insert(id, data);
                        Applied::Updated
                    },
                    |_, _| {},
                );
                self.set_watermark(EntityKind::ContactAddress, wm);
            }
            FetchedBatch::ContactGroup(rows) => {
                let mut wm = self.watermark(EntityKind::ContactGroup);
                apply_changes(
                    &mut self.contact_groups,
                    &mut wm,
                    rows,
                    |live, id, data| {
                        live.insert(id, data.into());
                    },
                    |live, id, data| {
                        live.insert(id, data.into());
                        Applied::Updated
                    },
                    |_, _| {},
                );
                self.set_watermark(EntityKind::ContactGroup, wm);
            }
            FetchedBatch::GroupMember(rows) => {
                let mut wm = self.watermark(EntityKind::GroupMember);
                apply_changes(
                    &mut self.group_members,
                    &mut wm,
                    rows,
                    |live, id, data| {
                        live.insert(id, data);
                    },
                    |live, id, data| {
                        live.insert(id, data);
                        Applied::Updated
                    },
                    |_, _| {},
                );
                self.set_watermark(EntityKind::GroupMember, wm);
            }
            FetchedBatch::TimePeriod(rows) => {
                let mut wm = self.watermark(EntityKind::TimePeriod);
                apply_changes(
                    &mut self.time_periods,
                    &mut wm,
                    rows,
                    |live, id, data| {
                        live.insert(id, data.into());
                    },
                    |live, id, data| {
                        live.insert(id, data.into());
                        Applied::Updated
                    },
                    |_, _| {},
                );
                self.set_watermark(EntityKind::TimePeriod, wm);
            }
            FetchedBatch::Schedule(rows) => {
                let mut wm = self.watermark(EntityKind::Schedule);
                apply_changes(
                    &mut self.schedules,
                    &mut wm,
                    rows,
                    |live, id, data| {
                        live.insert(id, data.into());
                    },
                    |live, id, data| {
                        live.insert(id, data.into());
                        Applied::Updated
                    },
                    |_, _| {},
                );
                self.set_watermark(EntityKind::Schedule, wm);
            }
            FetchedBatch::Rotation(rows) => {
                let affected: BTreeSet<i64> = rows.iter().map(|r| r.data.schedule_id).collect();
                let mut wm = self.watermark(EntityKind::Rotation);
                apply_changes(
                    &mut self.rotations,
                    &mut wm,
                    rows,
                    |live, id, data| {
                        live.insert(id, data.into());
                    },
                    |live, id, data| {
                        live.insert(id, data.into());
                        Applied::Updated
                    },
                    |_, _| {},
                );
                self.set_watermark(EntityKind::Rotation, wm);
                for schedule_id in affected {
                    self.rebuild_resolver(schedule_id);
                }
            }
            FetchedBatch::RotationMember(rows) => {
                // A member reassigned to a different rotation needs ReAdd:
                // its old rotation's resolver must also be rebuilt, or that
                // schedule keeps resolving a departed member as on-call.
                let previous_rotation_ids: BTreeMap<i64, i64> = rows
                    .iter()
                    .filter_map(|r| self.rotation_members.get(&r.id).map(|m| (r.id, m.rotation_id)))
                    .collect();
                let mut affected_rotations: BTreeSet<i64> = rows.iter().map(|r| r.data.rotation_id).collect();
                affected_rotations.extend(previous_rotation_ids.values().copied());
                let mut wm = self.watermark(EntityKind::RotationMember);
                apply_changes(
                    &mut self.rotation_members,
                    &mut wm,
                    rows,
                    |live, id, data| {
                        live.insert(id, data);
                    },
                    |live, id, data| {
                        let moved = previous_rotation_ids
                            .get(&id)
                            .is_some_and(|&prev| prev != data.rotation_id);
                        live.insert(id, data);
                        if moved { Applied::ReAdd } else { Applied::Updated }
                    },
                    |_, _| {},
                );
                self.set_watermark(EntityKind::RotationMember, wm);
                let schedules: BTreeSet<i64> = affected_rotations
                    .into_iter()
                    .filter_map(|rid| self.rotations.get(&rid).map(|r| r.schedule_id))
                    .collect();
                for schedule_id in schedules {
                    self.rebuild_resolver(schedule_id);
                }
            }
            FetchedBatch::TimePeriodEntry(rows) => {
                let affected: BTreeSet<i64> = rows.iter().map(|r| r.data.time_period_id).collect();
                let mut wm = self.watermark(EntityKind::TimePeriodEntry);
                apply_changes(
                    &mut self.time_period_entries,
                    &mut wm,
                    rows,
                    |live, id, data| {
                        live.insert(id, data);
                    },
                    |live, id, data| {
                        live.insert(id, data);
                        Applied::Updated
                    },
                    |_, _| {},
                );
                self.set_watermark(EntityKind::TimePeriodEntry, wm);
                for tp_id in affected {
                    self.rebuild_time_period(tp_id)?;
                }
            }
            FetchedBatch::Source(rows) => {
                let mut wm = self.watermark(EntityKind::Source);
                apply_changes(
                    &mut self.sources,
                    &mut wm,
                    rows,
                    |live, id, data| {
                        live.insert(id, data);
                    },
                    |live, id, data| {
                        live.insert(id, data);
                        Applied::Updated
                    },
                    |_, _| {},
                );
                self.set_watermark(EntityKind::Source, wm);
            }
            FetchedBatch::Rule(rows) => {
                let mut wm = self.watermark(EntityKind::Rule);
                apply_changes(
                    &mut self.rules,
                    &mut wm,
                    rows,
                    |live, id, data| {
                        live.insert(id, data.into());
                    },
                    |live, id, data| {
                        live.insert(id, data.into());
                        Applied::Updated
                    },
                    |_, _| {},
                );
                self.set_watermark(EntityKind::Rule, wm);
            }
            FetchedBatch::RuleEntry(rows) => {
                let mut wm = self.watermark(EntityKind::RuleEntry);
                apply_changes(
                    &mut self.rule_entries,
                    &mut wm,
                    rows,
                    |live, id, data| {
                        live.insert(id, data.into());
                    },
                    |live, id, data| {
                        live.insert(id, data.into());
                        Applied::Updated
                    },
                    |_, _| {},
                );
                self.set_watermark(EntityKind::RuleEntry, wm);
            }
            FetchedBatch::RuleEntryRecipient(rows) => {
                let mut wm = self.watermark(EntityKind::RuleEntryRecipient);
                apply_changes(
                    &mut self.rule_entry_recipients,
                    &mut wm,
                    rows,
                    |live, id, data| {
                        live.insert(id, data);
                    },
                    |live, id, data| {
                        live.insert(id, data);
                        Applied::Updated
                    },
                    |_, _| {},
                );
                self.set_watermark(EntityKind::RuleEntryRecipient, wm);
            }
        }
        Ok(())
    }

    fn watermark(&mut self, kind: EntityKind) -> BTreeMap<i64, DateTime<Utc>> {
        self.changed_at.remove(&kind).unwrap_or_default()
    }

    fn set_watermark(&mut self, kind: EntityKind, wm: BTreeMap<i64, DateTime<Utc>>) {
        self.changed_at.insert(kind, wm);
    }

    fn rebuild_resolver(&mut self, schedule_id: i64) {
        let rotations = self.hydrated_rotations_for_schedule(schedule_id);
        self.resolvers.insert(schedule_id, Arc::new(RotationResolver::build(&rotations)));
    }

    fn hydrated_rotations_for_schedule(&self, schedule_id: i64) -> Vec<Rotation> {
        self.rotations
            .values()
            .filter(|r| r.schedule_id == schedule_id)
            .cloned()
            .map(|mut r| {
                r.members = self
                    .rotation_members
                    .values()
                    .filter(|m| m.rotation_id == r.id)
                    .cloned()
                    .collect();
                r
            })
            .collect()
    }

    fn rebuild_time_period(&mut self, time_period_id: i64) -> NdResult<()> {
        let entries = self
            .time_period_entries
            .values()
            .filter(|e| e.time_period_id == time_period_id)
            .map(nd_timeperiod::TimePeriodEntry::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| nd_common::NotifydError::Config(e.to_string()))?;
        self.time_period_cache
            .insert(time_period_id, Arc::new(nd_timeperiod::TimePeriod::new(entries)));
        Ok(())
    }

    pub fn hydrated_contact(&self, id: i64) -> Option<Contact> {
        let mut contact = self.contacts.get(&id)?.clone();
        contact.addresses = self
            .contact_addresses
            .values()
            .filter(|a| a.contact_id == id)
            .map(|a| nd_common::Address { kind: a.kind.clone(), address: a.address.clone() })
            .collect();
        Some(contact)
    }

    pub fn group_member_ids(&self, group_id: i64) -> Vec<i64> {
        self.group_members
            .values()
            .filter(|m| m.group_id == group_id)
            .map(|m| m.contact_id)
            .collect()
    }

    pub fn resolver_for_schedule(&self, schedule_id: i64) -> Option<Arc<RotationResolver>> {
        self.resolvers.get(&schedule_id).cloned()
    }

    pub fn time_period(&self, id: i64) -> Option<Arc<nd_timeperiod::TimePeriod>> {
        self.time_period_cache.get(&id).cloned()
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
    fn applying_channel_batch_upserts_live_map() {
        let mut graph = ConfigGraph::new();
        let batch = FetchedBatch::Channel(vec![ChangeRow {
            id: 1,
            changed_at: at(5),
            deleted: false,
            data: ChannelRow {
                id: 1,
                name: "email".into(),
                kind: "email".into(),
                config_blob: serde_json::json!({}),
            },
        }]);
        graph.apply_batch(batch).unwrap();
        assert_eq!(graph.channels.len(), 1);
        assert_eq!(graph.channels[&1].name, "email");
    }

    #[test]
    fn rotation_and_member_changes_rebuild_resolver() {
        let mut graph = ConfigGraph::new();
        graph
            .apply_batch(FetchedBatch::Rotation(vec![ChangeRow {
                id: 10,
                changed_at: at(1),
                deleted: false,
                data: RotationRow { id: 10, schedule_id: 1, priority: 0, actual_handoff: at(0) },
            }]))
            .unwrap();
        assert!(graph.resolver_for_schedule(1).is_some());

        graph
            .apply_batch(FetchedBatch::RotationMember(vec![ChangeRow {
                id: 100,
                changed_at: at(2),
                deleted: false,
                data: RotationMember {
                    id: 100,
                    rotation_id: 10,
                    recipient: nd_common::RecipientRef::Contact { contact_id: 1 },
                    time_period_id: 1,
                },
            }]))
            .unwrap();
        let resolver = graph.resolver_for_schedule(1).unwrap();
        // Resolver rebuilt with the new member attached (no time period loaded,
        // so resolve() finds nothing, but the rebuild itself must not panic).
        let empty_periods = HashMap::new();
        assert_eq!(resolver.resolve(at(10), &empty_periods), None);
    }

    #[test]
    fn deleting_a_channel_removes_it() {
        let mut graph = ConfigGraph::new();
        graph
            .apply_batch(FetchedBatch::Channel(vec![ChangeRow {
                id: 1,
                changed_at: at(1),
                deleted: false,
                data: ChannelRow { id: 1, name: "x".into(), kind: "x".into(), config_blob: serde_json::json!({}) },
            }]))
            .unwrap();
        graph
            .apply_batch(FetchedBatch::Channel(vec![ChangeRow {
                id: 1,
                changed_at: at(2),
                deleted: true,
                data: ChannelRow { id: 1, name: "x".into(), kind: "x".into(), config_blob: serde_json::json!({}) },
            }]))
            .unwrap();
        assert!(graph.channels.is_empty());
    }
}
