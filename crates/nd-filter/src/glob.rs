//! Glob-style matching for the `~`/`!~` operators (spec §4.A): `*` becomes
//! `.*` after regex-quoting the rest of the pattern, anchored at both ends.

use regex::Regex;

pub fn glob_to_regex(pattern: &str) -> Regex {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    for part in pattern.split('*') {
        out.push_str(&regex::escape(part));
        out.push_str(".*");
    }
    // split('*') produces N+1 parts for N asterisks; we appended one ".*"
    // too many, strip the trailing one.
    out.truncate(out.len() - 2);
    out.push('$');
    Regex::new(&out).unwrap_or_else(|_| Regex::new("$^").expect("empty-match fallback"))
}

pub fn glob_is_match(value: &str, pattern: &str) -> bool {
    glob_to_regex(pattern).is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_prefix_star() {
        assert!(glob_is_match("host01.example.com", "host*"));
        assert!(!glob_is_match("other.example.com", "host*"));
    }

    #[test]
    fn matches_exact_without_star() {
        assert!(glob_is_match("exact", "exact"));
        assert!(!glob_is_match("exactly", "exact"));
    }

    #[test]
    fn quotes_regex_metacharacters() {
        assert!(glob_is_match("a.b", "a.b"));
        assert!(!glob_is_match("axb", "a.b"));
    }

    #[test]
    fn star_in_middle() {
        assert!(glob_is_match("foo-bar-baz", "foo*baz"));
    }
}
