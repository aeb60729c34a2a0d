//! Escalation-filter evaluation context (spec §4.A "duration- or
//! severity-ordered for the escalation context", §4.G step 8): carries
//! `(incident_age, incident_severity)` and compares against `D`-style
//! duration literals or severity names.

use crate::duration::parse_duration;
use chrono::Duration;
use nd_common::Severity;
use nd_filter::eval::{EvalExists, FilterContext};

pub struct EscalationFilterContext {
    pub incident_age: Duration,
    pub incident_severity: Severity,
}

impl EvalExists for EscalationFilterContext {
    fn eval_exists(&self, key: &str) -> bool {
        matches!(key, "incident_age" | "incident_severity")
    }
}

impl FilterContext for EscalationFilterContext {
    fn equal(&self, key: &str, value: &str) -> bool {
        match key {
            "incident_age" => parse_duration(value).is_some_and(|v| v == self.incident_age),
            "incident_severity" => Severity::parse(value).is_some_and(|v| v == self.incident_severity),
            _ => false,
        }
    }

    // Glob matching has no meaning for duration/severity values.
    fn like(&self, _key: &str, _pattern: &str) -> bool {
        false
    }

    fn less(&self, key: &str, value: &str) -> bool {
        match key {
            "incident_age" => parse_duration(value).is_some_and(|v| self.incident_age < v),
            "incident_severity" => Severity::parse(value).is_some_and(|v| self.incident_severity < v),
            _ => false,
        }
    }

    fn less_or_equal(&self, key: &str, value: &str) -> bool {
        match key {
            "incident_age" => parse_duration(value).is_some_and(|v| self.incident_age <= v),
            "incident_severity" => Severity::parse(value).is_some_and(|v| self.incident_severity <= v),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_filter::{eval::eval, parser::parse};

    fn ctx(age_minutes: i64, severity: Severity) -> EscalationFilterContext {
        EscalationFilterContext { incident_age: Duration::minutes(age_minutes), incident_severity: severity }
    }

    #[test]
    fn age_threshold_matches_once_reached() {
        let c = ctx(10, Severity::Crit);
        assert!(eval(&parse("incident_age>=10m").unwrap(), &c));
        assert!(!eval(&parse("incident_age>=11m").unwrap(), &c));
    }

    #[test]
    fn severity_ordering_follows_monitoring_scale() {
        let c = ctx(0, Severity::Crit);
        assert!(eval(&parse("incident_severity>=warning").unwrap(), &c));
        assert!(!eval(&parse("incident_severity>=emerg").unwrap(), &c));
    }

    #[test]
    fn unconditioned_entry_always_matches() {
        let c = ctx(0, Severity::Ok);
        assert!(eval(&parse("incident_age").unwrap(), &c));
    }
}
