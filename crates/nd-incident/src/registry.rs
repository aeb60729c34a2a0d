//! Process-wide incident actor registry (spec §5 "the per-incident
//! mutex"), grounded on `fc-router::manager`'s `DashMap`-keyed per-entity
//! state.
//!
//! The lock is `tokio::sync::Mutex` rather than `parking_lot`: the
//! router holds it across its event's DB transaction (spec §4.G), and a
//! tokio mutex guard is safe to hold across `.await` points without
//! losing `Send` on the enclosing future.

use crate::machine::IncidentActor;
use dashmap::DashMap;
use nd_common::Incident;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct IncidentRegistry {
    actors: DashMap<[u8; 32], Arc<Mutex<IncidentActor>>>,
}

impl IncidentRegistry {
    pub fn new() -> Self {
        Self { actors: DashMap::new() }
    }

    /// Seeds the registry with incidents already open in the database
    /// (spec §8 "Single-incident invariant"), one actor per `object_id`.
    /// Call once at startup, before the router accepts events, so a
    /// restart doesn't race a freshly-created empty actor into
    /// [`Self::actor_for`].
    pub fn hydrate(&self, open_incidents: Vec<Incident>) {
        for incident in open_incidents {
            self.actors.insert(incident.object_id, Arc::new(Mutex::new(IncidentActor::from_incident(incident))));
        }
    }

    /// Returns the actor for `object_id`, creating an empty one on first
    /// use. The caller locks it for the duration of one event's processing
    /// (spec §5: "no suspension ... beyond the owning event's own work").
    pub fn actor_for(&self, object_id: [u8; 32]) -> Arc<Mutex<IncidentActor>> {
        self.actors.entry(object_id).or_insert_with(|| Arc::new(Mutex::new(IncidentActor::new()))).clone()
    }
}

impl Default for IncidentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_object_id_returns_the_same_actor() {
        let registry = IncidentRegistry::new();
        let a = registry.actor_for([1u8; 32]);
        let b = registry.actor_for([1u8; 32]);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn hydrate_seeds_an_already_open_actor() {
        use chrono::TimeZone;
        use nd_common::Severity;

        let registry = IncidentRegistry::new();
        let incident = Incident {
            id: 42,
            object_id: [9u8; 32],
            severity: Severity::Crit,
            started_at: chrono::Utc.timestamp_opt(0, 0).unwrap(),
            recovered_at: None,
            muted_flag: false,
            recipients: Default::default(),
            rule_match_set: vec![7],
            escalation_state: Default::default(),
        };
        registry.hydrate(vec![incident]);

        let actor = registry.actor_for([9u8; 32]);
        let actor = actor.lock().await;
        assert!(actor.is_open());
        assert_eq!(actor.incident.as_ref().unwrap().id, 42);
    }

    #[tokio::test]
    async fn distinct_object_ids_get_distinct_actors() {
        let registry = IncidentRegistry::new();
        let a = registry.actor_for([1u8; 32]);
        let b = registry.actor_for([2u8; 32]);
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
