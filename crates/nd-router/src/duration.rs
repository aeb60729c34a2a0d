//! Parses the short duration literals the escalation filter context
//! compares `incident_age` against (e.g. `10m`, `1h30m`, `45s`).

use chrono::Duration;

pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let mut total = Duration::zero();
    let mut digits = String::new();
    let mut saw_any = false;

    for ch in input.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let amount: i64 = digits.parse().ok()?;
        digits.clear();
        let unit = match ch {
            's' => Duration::seconds(amount),
            'm' => Duration::minutes(amount),
            'h' => Duration::hours(amount),
            'd' => Duration::days(amount),
            _ => return None,
        };
        total = total + unit;
        saw_any = true;
    }

    if !digits.is_empty() || !saw_any {
        return None;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_unit() {
        assert_eq!(parse_duration("10m"), Some(Duration::minutes(10)));
        assert_eq!(parse_duration("45s"), Some(Duration::seconds(45)));
    }

    #[test]
    fn parses_compound_duration() {
        assert_eq!(parse_duration("1h30m"), Some(Duration::minutes(90)));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("abc"), None);
    }
}
