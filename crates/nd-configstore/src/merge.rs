//! Generic 3-way merge (spec §4.D "Apply"): every entity table is folded
//! into its live map the same way, parameterized only by what `create`/
//! `update`/`delete` need to do for that table.

use crate::rows::ChangeRow;
use chrono::{DateTime, Utc};
use nd_common::Result;
use std::collections::BTreeMap;
use tracing::warn;

/// Returned by an `update` hook to force a delete-then-create instead of an
/// in-place update, for changes that move a row's effective primary key
/// (e.g. a rotation member reassigned to a different rotation).
pub enum Applied {
    Updated,
    ReAdd,
}

pub struct MergeStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub readded: usize,
    pub skipped_unchanged: usize,
}

impl MergeStats {
    fn new() -> Self {
        Self { created: 0, updated: 0, deleted: 0, readded: 0, skipped_unchanged: 0 }
    }
}

/// Applies a batch of changed rows to `live`, tracking each row's
/// `changed_at` in `known_changed_at` so unchanged re-fetches (within the
/// backlog window) are skipped cheaply.
pub fn apply_changes<T, C, U, D>(
    live: &mut BTreeMap<i64, T>,
    known_changed_at: &mut BTreeMap<i64, DateTime<Utc>>,
    rows: Vec<ChangeRow<T>>,
    mut create: C,
    mut update: U,
    mut delete: D,
) -> MergeStats
where
    T: Clone,
    C: FnMut(&mut BTreeMap<i64, T>, i64, T),
    U: FnMut(&mut BTreeMap<i64, T>, i64, T) -> Applied,
    D: FnMut(&mut BTreeMap<i64, T>, i64),
{
    let mut stats = MergeStats::new();
    for row in rows {
        let ChangeRow { id, changed_at, deleted, data } = row;

        if deleted {
            if live.remove(&id).is_some() {
                delete(live, id);
                stats.deleted += 1;
            }
            known_changed_at.remove(&id);
            continue;
        }

        match known_changed_at.get(&id) {
            Some(prev) if *prev == changed_at => {
                stats.skipped_unchanged += 1;
                continue;
            }
            Some(_) => {
                let data_for_readd = data.clone();
                match update(live, id, data) {
                    Applied::Updated => stats.updated += 1,
                    Applied::ReAdd => {
                        live.remove(&id);
                        delete(live, id);
                        create(live, id, data_for_readd);
                        stats.readded += 1;
                    }
                }
            }
            None => {
                create(live, id, data);
                stats.created += 1;
            }
        }
        known_changed_at.insert(id, changed_at);
    }
    stats
}

/// Rows whose init/validate hook rejects them are dropped with a warning
/// rather than aborting the whole apply pass (spec §4.D "Validate").
pub fn validate_rows<T>(
    table: &'static str,
    rows: Vec<ChangeRow<T>>,
    validate: impl Fn(&T) -> Result<()>,
) -> Vec<ChangeRow<T>> {
    rows.into_iter()
        .filter(|row| match validate(&row.data) {
            Ok(()) => true,
            Err(e) => {
                warn!(table, id = row.id, error = %e, "dropping row that failed validation");
                false
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(s: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(s, 0).unwrap()
    }

    #[test]
    fn creates_updates_and_deletes() {
        let mut live: BTreeMap<i64, String> = BTreeMap::new();
        let mut watermarks = BTreeMap::new();

        let rows = vec![
            ChangeRow { id: 1, changed_at: at(10), deleted: false, data: "a".to_string() },
            ChangeRow { id: 2, changed_at: at(10), deleted: false, data: "b".to_string() },
        ];
        let stats = apply_changes(
            &mut live,
            &mut watermarks,
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
        assert_eq!(stats.created, 2);
        assert_eq!(live.len(), 2);

        let rows = vec![ChangeRow { id: 1, changed_at: at(20), deleted: false, data: "a2".to_string() }];
        let stats = apply_changes(
            &mut live,
            &mut watermarks,
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
        assert_eq!(stats.updated, 1);
        assert_eq!(live.get(&1), Some(&"a2".to_string()));

        let rows = vec![ChangeRow { id: 2, changed_at: at(30), deleted: true, data: "b".to_string() }];
        let stats = apply_changes(
            &mut live,
            &mut watermarks,
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
        assert_eq!(stats.deleted, 1);
        assert!(!live.contains_key(&2));
    }

    #[test]
    fn skips_rows_whose_changed_at_is_unchanged() {
        let mut live: BTreeMap<i64, String> = BTreeMap::new();
        let mut watermarks = BTreeMap::new();
        live.insert(1, "a".to_string());
        watermarks.insert(1, at(10));

        let rows = vec![ChangeRow { id: 1, changed_at: at(10), deleted: false, data: "a".to_string() }];
        let stats = apply_changes(
            &mut live,
            &mut watermarks,
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
        assert_eq!(stats.skipped_unchanged, 1);
        assert_eq!(stats.updated, 0);
    }

    #[test]
    fn readd_deletes_then_recreates() {
        let mut live: BTreeMap<i64, String> = BTreeMap::new();
        let mut watermarks = BTreeMap::new();
        live.insert(1, "old".to_string());
        watermarks.insert(1, at(10));

        let rows = vec![ChangeRow { id: 1, changed_at: at(20), deleted: false, data: "moved".to_string() }];
        let stats = apply_changes(
            &mut live,
            &mut watermarks,
            rows,
            |live, id, data| {
                live.insert(id, data);
            },
            |_live, _id, _data| Applied::ReAdd,
            |_, _| {},
        );
        assert_eq!(stats.readded, 1);
        assert_eq!(live.get(&1), Some(&"moved".to_string()));
    }
}
