//! Evaluation against a capability set (spec §4.A). A context type opts into
//! whichever comparisons it can support; operators that need a capability
//! the context doesn't implement simply evaluate to `false` rather than
//! failing the whole filter.

use crate::ast::{CompareOp, Filter};

pub trait EvalExists {
    fn eval_exists(&self, key: &str) -> bool;
}

pub trait EvalEqual {
    fn eval_equal(&self, key: &str, value: &str) -> bool;
}

pub trait EvalLike {
    fn eval_like(&self, key: &str, pattern: &str) -> bool;
}

pub trait EvalLess {
    fn eval_less(&self, key: &str, value: &str) -> bool;
}

pub trait EvalLessOrEqual {
    fn eval_less_or_equal(&self, key: &str, value: &str) -> bool;
}

/// Umbrella trait a concrete filter context implements some subset of.
/// Capabilities not implemented by a context default to "not supported"
/// (operator evaluates to `false`), matching spec §4.A's resolution rule
/// for the negated operators requiring key existence.
pub trait FilterContext: EvalExists {
    fn equal(&self, key: &str, value: &str) -> bool;
    fn like(&self, key: &str, pattern: &str) -> bool;
    fn less(&self, key: &str, value: &str) -> bool;
    fn less_or_equal(&self, key: &str, value: &str) -> bool;
}

pub fn eval(filter: &Filter, ctx: &dyn FilterContext) -> bool {
    match filter {
        Filter::Or(terms) => terms.iter().any(|t| eval(t, ctx)),
        Filter::And(terms) => terms.iter().all(|t| eval(t, ctx)),
        Filter::Not(inner) => !eval(inner, ctx),
        Filter::Exists(key) => ctx.eval_exists(key),
        Filter::Compare(key, op, value) => match op {
            CompareOp::Eq => ctx.equal(key, value),
            CompareOp::Ne => ctx.eval_exists(key) && !ctx.equal(key, value),
            CompareOp::Like => ctx.like(key, value),
            CompareOp::NotLike => ctx.eval_exists(key) && !ctx.like(key, value),
            CompareOp::Lt => ctx.less(key, value),
            CompareOp::Le => ctx.less_or_equal(key, value),
            CompareOp::Gt => ctx.eval_exists(key) && !ctx.less_or_equal(key, value),
            CompareOp::Ge => ctx.eval_exists(key) && !ctx.less(key, value),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glob::glob_is_match;
    use std::collections::BTreeMap;

    struct MapContext(BTreeMap<String, String>);

    impl EvalExists for MapContext {
        fn eval_exists(&self, key: &str) -> bool {
            self.0.contains_key(key)
        }
    }

    impl FilterContext for MapContext {
        fn equal(&self, key: &str, value: &str) -> bool {
            self.0.get(key).map(|v| v == value).unwrap_or(false)
        }
        fn like(&self, key: &str, pattern: &str) -> bool {
            self.0
                .get(key)
                .map(|v| glob_is_match(v, pattern))
                .unwrap_or(false)
        }
        fn less(&self, key: &str, value: &str) -> bool {
            match (self.0.get(key).and_then(|v| v.parse::<f64>().ok()), value.parse::<f64>()) {
                (Some(a), Ok(b)) => a < b,
                _ => false,
            }
        }
        fn less_or_equal(&self, key: &str, value: &str) -> bool {
            match (self.0.get(key).and_then(|v| v.parse::<f64>().ok()), value.parse::<f64>()) {
                (Some(a), Ok(b)) => a <= b,
                _ => false,
            }
        }
    }

    fn ctx(pairs: &[(&str, &str)]) -> MapContext {
        MapContext(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn equal_matches_value() {
        let c = ctx(&[("state", "ok")]);
        assert!(eval(&crate::parser::parse("state=ok").unwrap(), &c));
        assert!(!eval(&crate::parser::parse("state=bad").unwrap(), &c));
    }

    #[test]
    fn not_equal_requires_key_presence() {
        let c = ctx(&[("state", "ok")]);
        assert!(!eval(&crate::parser::parse("state!=ok").unwrap(), &c));
        assert!(eval(&crate::parser::parse("state!=bad").unwrap(), &c));
        let empty = ctx(&[]);
        assert!(!eval(&crate::parser::parse("state!=ok").unwrap(), &empty));
    }

    #[test]
    fn greater_than_requires_existence_and_negated_le() {
        let c = ctx(&[("count", "5")]);
        assert!(eval(&crate::parser::parse("count>3").unwrap(), &c));
        assert!(!eval(&crate::parser::parse("count>10").unwrap(), &c));
        let empty = ctx(&[]);
        assert!(!eval(&crate::parser::parse("count>3").unwrap(), &empty));
    }

    #[test]
    fn or_short_circuits_and_and_short_circuits() {
        let c = ctx(&[("a", "1")]);
        assert!(eval(&crate::parser::parse("a=1|b=2").unwrap(), &c));
        assert!(!eval(&crate::parser::parse("a=1&b=2").unwrap(), &c));
    }

    #[test]
    fn like_uses_glob_semantics() {
        let c = ctx(&[("host", "host01.example.com")]);
        assert!(eval(&crate::parser::parse("host~host*").unwrap(), &c));
        assert!(!eval(&crate::parser::parse("host!~host*").unwrap(), &c));
    }
}
