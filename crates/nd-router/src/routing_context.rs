//! Routing-filter evaluation context (spec §4.G step 9): carries only the
//! event's `type`.

use nd_filter::eval::{EvalExists, FilterContext};

pub struct RoutingFilterContext {
    pub event_type: String,
}

impl EvalExists for RoutingFilterContext {
    fn eval_exists(&self, key: &str) -> bool {
        key == "type"
    }
}

impl FilterContext for RoutingFilterContext {
    fn equal(&self, key: &str, value: &str) -> bool {
        key == "type" && self.event_type == value
    }

    fn like(&self, key: &str, pattern: &str) -> bool {
        key == "type" && nd_filter::glob::glob_is_match(&self.event_type, pattern)
    }

    fn less(&self, _key: &str, _value: &str) -> bool {
        false
    }

    fn less_or_equal(&self, _key: &str, _value: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_filter::{eval::eval, parser::parse};

    #[test]
    fn matches_event_type_by_equality() {
        let ctx = RoutingFilterContext { event_type: "state".to_string() };
        assert!(eval(&parse("type=state").unwrap(), &ctx));
        assert!(!eval(&parse("type=custom").unwrap(), &ctx));
    }
}
