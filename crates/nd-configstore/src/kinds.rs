//! Entity registry replacing reflection-based dispatch: every table the
//! store syncs is named once here, in the dependency order the apply pass
//! must follow (spec §4.D "Apply order").

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Channel,
    Contact,
    ContactAddress,
    ContactGroup,
    GroupMember,
    TimePeriod,
    Schedule,
    Rotation,
    RotationMember,
    TimePeriodEntry,
    Source,
    Rule,
    RuleEntry,
    RuleEntryRecipient,
}

impl EntityKind {
    /// Leaves first: later kinds may reference ids introduced by earlier
    /// ones, never the other way around.
    pub const APPLY_ORDER: [EntityKind; 14] = [
        EntityKind::Channel,
        EntityKind::Contact,
        EntityKind::ContactAddress,
        EntityKind::ContactGroup,
        EntityKind::GroupMember,
        EntityKind::TimePeriod,
        EntityKind::Schedule,
        EntityKind::Rotation,
        EntityKind::RotationMember,
        EntityKind::TimePeriodEntry,
        EntityKind::Source,
        EntityKind::Rule,
        EntityKind::RuleEntry,
        EntityKind::RuleEntryRecipient,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            EntityKind::Channel => "channel",
            EntityKind::Contact => "contact",
            EntityKind::ContactAddress => "contact_address",
            EntityKind::ContactGroup => "contactgroup",
            EntityKind::GroupMember => "contactgroup_member",
            EntityKind::TimePeriod => "timeperiod",
            EntityKind::Schedule => "schedule",
            EntityKind::Rotation => "rotation",
            EntityKind::RotationMember => "rotation_member",
            EntityKind::TimePeriodEntry => "timeperiod_entry",
            EntityKind::Source => "source",
            EntityKind::Rule => "rule",
            EntityKind::RuleEntry => "rule_entry",
            EntityKind::RuleEntryRecipient => "rule_entry_recipient",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_order_has_no_duplicates() {
        let mut seen = std::collections::HashSet::new();
        for kind in EntityKind::APPLY_ORDER {
            assert!(seen.insert(kind), "{kind:?} listed twice");
        }
        assert_eq!(seen.len(), EntityKind::APPLY_ORDER.len());
    }

    #[test]
    fn time_periods_precede_schedules_precede_rotations() {
        let pos = |k: EntityKind| EntityKind::APPLY_ORDER.iter().position(|&x| x == k).unwrap();
        assert!(pos(EntityKind::TimePeriod) < pos(EntityKind::Schedule));
        assert!(pos(EntityKind::Schedule) < pos(EntityKind::Rotation));
        assert!(pos(EntityKind::Rotation) < pos(EntityKind::RotationMember));
        assert!(pos(EntityKind::RotationMember) < pos(EntityKind::TimePeriodEntry));
    }
}
