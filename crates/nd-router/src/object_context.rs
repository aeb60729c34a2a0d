//! Object-filter evaluation context (spec §4.A "string-ordered for
//! objects", §4.G step 7). Keys resolve against the object's id-tags and
//! extra-tags, plus the `name`/`url` fields.

use nd_common::Object;
use nd_filter::eval::{EvalExists, FilterContext};
use nd_filter::glob::glob_is_match;

pub struct ObjectFilterContext<'a> {
    pub object: &'a Object,
}

impl<'a> ObjectFilterContext<'a> {
    pub fn new(object: &'a Object) -> Self {
        Self { object }
    }

    fn get(&self, key: &str) -> Option<&str> {
        match key {
            "name" => Some(self.object.name.as_str()),
            "url" => self.object.url.as_deref(),
            _ => self
                .object
                .id_tags
                .get(key)
                .or_else(|| self.object.extra_tags.get(key))
                .map(String::as_str),
        }
    }
}

impl<'a> EvalExists for ObjectFilterContext<'a> {
    fn eval_exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

impl<'a> FilterContext for ObjectFilterContext<'a> {
    fn equal(&self, key: &str, value: &str) -> bool {
        self.get(key).is_some_and(|v| v == value)
    }

    fn like(&self, key: &str, pattern: &str) -> bool {
        self.get(key).is_some_and(|v| glob_is_match(v, pattern))
    }

    fn less(&self, key: &str, value: &str) -> bool {
        self.get(key).is_some_and(|v| v < value)
    }

    fn less_or_equal(&self, key: &str, value: &str) -> bool {
        self.get(key).is_some_and(|v| v <= value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_filter::{eval::eval, parser::parse};
    use std::collections::BTreeMap;

    fn object() -> Object {
        let mut id_tags = BTreeMap::new();
        id_tags.insert("host".to_string(), "db01".to_string());
        Object {
            id: [0u8; 32],
            source_id: 1,
            name: "db01".to_string(),
            url: None,
            id_tags,
            extra_tags: BTreeMap::new(),
            mute_reason: None,
        }
    }

    #[test]
    fn matches_id_tag_by_glob() {
        let object = object();
        let ctx = ObjectFilterContext::new(&object);
        assert!(eval(&parse("host~db*").unwrap(), &ctx));
        assert!(!eval(&parse("host~web*").unwrap(), &ctx));
    }

    #[test]
    fn string_ordering_for_less_than() {
        let object = object();
        let ctx = ObjectFilterContext::new(&object);
        assert!(eval(&parse("host<db02").unwrap(), &ctx));
        assert!(!eval(&parse("host<db00").unwrap(), &ctx));
    }

    #[test]
    fn missing_key_fails_exists() {
        let object = object();
        let ctx = ObjectFilterContext::new(&object);
        assert!(!eval(&parse("region").unwrap(), &ctx));
    }
}
