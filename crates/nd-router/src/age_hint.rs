//! Extracts `incident_age >= D` thresholds from an escalation entry's
//! condition (spec §4.G step 8: "Entries whose condition evaluates false
//! but contains an `incident_age >= D` term contribute a next-evaluation
//! hint `D - current_age`").

use crate::duration::parse_duration;
use chrono::Duration;
use nd_filter::ast::{CompareOp, Filter};

/// Every `incident_age >= D` threshold named anywhere in the filter tree,
/// regardless of how it's nested under AND/OR/NOT.
fn age_thresholds(filter: &Filter, out: &mut Vec<Duration>) {
    match filter {
        Filter::Or(terms) | Filter::And(terms) => {
            for term in terms {
                age_thresholds(term, out);
            }
        }
        Filter::Not(inner) => age_thresholds(inner, out),
        Filter::Exists(_) => {}
        Filter::Compare(key, CompareOp::Ge, value) if key == "incident_age" => {
            if let Some(d) = parse_duration(value) {
                out.push(d);
            }
        }
        Filter::Compare(_, _, _) => {}
    }
}

/// The next-evaluation hint for one entry whose condition currently
/// evaluates to `false`: the smallest `D - current_age` over every
/// not-yet-reached threshold in its condition, or `None` if it names no
/// `incident_age` threshold (and so will never start matching on its own).
pub fn next_evaluation_hint(filter: &Filter, current_age: Duration) -> Option<Duration> {
    let mut thresholds = Vec::new();
    age_thresholds(filter, &mut thresholds);
    thresholds
        .into_iter()
        .filter(|d| *d > current_age)
        .map(|d| d - current_age)
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_filter::parser::parse;

    #[test]
    fn hint_is_remaining_time_to_threshold() {
        let filter = parse("incident_age>=10m").unwrap();
        let hint = next_evaluation_hint(&filter, Duration::minutes(5));
        assert_eq!(hint, Some(Duration::minutes(5)));
    }

    #[test]
    fn already_reached_threshold_has_no_hint() {
        let filter = parse("incident_age>=10m").unwrap();
        assert_eq!(next_evaluation_hint(&filter, Duration::minutes(15)), None);
    }

    #[test]
    fn picks_the_nearest_of_multiple_thresholds() {
        let filter = parse("incident_age>=10m|incident_age>=20m").unwrap();
        let hint = next_evaluation_hint(&filter, Duration::minutes(1));
        assert_eq!(hint, Some(Duration::minutes(9)));
    }

    #[test]
    fn condition_without_age_term_has_no_hint() {
        let filter = parse("incident_severity>=crit").unwrap();
        assert_eq!(next_evaluation_hint(&filter, Duration::minutes(1)), None);
    }
}
