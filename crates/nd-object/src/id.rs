//! Deterministic object identity (spec §4.F): a content hash of the
//! source id and the sorted id-tag sequence, so the same monitored entity
//! always maps to the same object row regardless of which event named it.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// `sha256(be64(source_id) ∥ Σ(key ∥ 0 ∥ value ∥ 0 sorted))`. `id_tags`
/// is a `BTreeMap`, so iteration order is already the required sort order.
pub fn compute_object_id(source_id: i64, id_tags: &BTreeMap<String, String>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(source_id.to_be_bytes());
    for (key, value) in id_tags {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_source_and_tags_produce_same_id() {
        let mut tags = BTreeMap::new();
        tags.insert("host".to_string(), "db01".to_string());
        tags.insert("service".to_string(), "postgres".to_string());

        assert_eq!(compute_object_id(1, &tags), compute_object_id(1, &tags));
    }

    #[test]
    fn tag_insertion_order_does_not_affect_id() {
        let mut a = BTreeMap::new();
        a.insert("b".to_string(), "2".to_string());
        a.insert("a".to_string(), "1".to_string());

        let mut b = BTreeMap::new();
        b.insert("a".to_string(), "1".to_string());
        b.insert("b".to_string(), "2".to_string());

        assert_eq!(compute_object_id(1, &a), compute_object_id(1, &b));
    }

    #[test]
    fn different_source_id_changes_the_hash() {
        let tags = BTreeMap::new();
        assert_ne!(compute_object_id(1, &tags), compute_object_id(2, &tags));
    }

    #[test]
    fn different_tag_values_change_the_hash() {
        let mut a = BTreeMap::new();
        a.insert("host".to_string(), "db01".to_string());
        let mut b = BTreeMap::new();
        b.insert("host".to_string(), "db02".to_string());
        assert_ne!(compute_object_id(1, &a), compute_object_id(1, &b));
    }
}
