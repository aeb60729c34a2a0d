//! Object identity, persistence, and cache (spec §4.F): computes the
//! content-hash identity of a monitored entity, upserts it and its tags in
//! one transaction, and keeps a process-wide cache used by the router's
//! mute-gate checks.

pub mod id;
pub mod store;

pub use id::compute_object_id;
pub use store::ObjectStore;

#[cfg(test)]
mod tests {
    use super::*;
    use nd_common::{Event, EventType};
    use std::collections::BTreeMap;

    fn base_event(kind: EventType) -> Event {
        let mut id_tags = BTreeMap::new();
        id_tags.insert("host".to_string(), "db01".to_string());
        Event {
            id: 1,
            source_id: 10,
            time: chrono::Utc::now(),
            kind,
            severity: nd_common::Severity::Warning,
            name: "db01".to_string(),
            url: None,
            username: None,
            message: None,
            id_tags,
            extra_tags: BTreeMap::new(),
            mute: None,
            mute_reason: None,
        }
    }

    #[test]
    fn object_id_is_a_pure_function_of_source_and_tags() {
        let event = base_event(EventType::State);
        let id = compute_object_id(event.source_id, &event.id_tags);
        assert_eq!(id, compute_object_id(10, &event.id_tags));
    }
}
