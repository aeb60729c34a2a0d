//! URL-safe boolean/comparison filter DSL used for object filters, rule
//! conditions, and escalation conditions. Grammar, percent-decoding, glob
//! matching, and evaluation semantics are described in spec §4.A.

pub mod ast;
pub mod eval;
pub mod glob;
pub mod lexer;
pub mod parser;
pub mod percent;

pub use ast::{CompareOp, Filter};
pub use eval::{eval as eval_filter, EvalEqual, EvalExists, EvalLess, EvalLessOrEqual, EvalLike, FilterContext};
pub use parser::{parse, ParseError};

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Parse and evaluate in one step; callers that parse once and evaluate
/// repeatedly (rule matching against many objects) should call
/// [`parse`]/[`eval_filter`] directly instead.
pub fn matches(expr: &str, ctx: &dyn FilterContext) -> Result<bool, FilterError> {
    let filter = parse(expr)?;
    Ok(eval_filter(&filter, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
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
                .map(|v| glob::glob_is_match(v, pattern))
                .unwrap_or(false)
        }
        fn less(&self, _key: &str, _value: &str) -> bool {
            false
        }
        fn less_or_equal(&self, _key: &str, _value: &str) -> bool {
            false
        }
    }

    #[test]
    fn matches_end_to_end_with_percent_encoding() {
        let mut map = BTreeMap::new();
        map.insert("col|umn".to_string(), "val|ue".to_string());
        let ctx = MapContext(map);
        assert!(matches("col%7Cumn=val%7Cue", &ctx).unwrap());
    }

    #[test]
    fn propagates_parse_errors() {
        let ctx = MapContext(BTreeMap::new());
        assert!(matches("(unclosed", &ctx).is_err());
    }
}
