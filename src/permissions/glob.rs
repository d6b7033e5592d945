//! Glob matching for policy rule patterns.
//!
//! `*` matches any run of characters within a single path segment, `**`
//! matches zero or more whole segments, everything else matches literally.
//! Patterns are anchored at the policy file's own directory, so matching
//! is always done against a path already made relative to that directory.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;

/// Compiles a glob pattern into an anchored regex and caches the result,
/// since the same handful of patterns get re-evaluated on every
/// permission check. `parking_lot::Mutex` over `std::sync::Mutex` here:
/// no poisoning to thread through a function that's called on every
/// permission check.
static COMPILED: Lazy<Mutex<HashMap<String, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Returns true if `pattern` matches `relative_path` under glob semantics:
/// `*` matches within one path segment, `**` matches across any number.
pub fn glob_matches(pattern: &str, relative_path: &str) -> bool {
    let mut cache = COMPILED.lock();
    let re = cache
        .entry(pattern.to_string())
        .or_insert_with(|| compile(pattern));
    re.is_match(relative_path)
}

fn compile(pattern: &str) -> Regex {
    let segments: Vec<&str> = pattern.split('/').collect();
    let mut regex_str = String::from("^");
    // Tracks whether the previous emitted piece already owns the
    // separator leading into the next segment, so a "**" group and its
    // neighbor never both contribute a "/".
    let mut skip_separator = true;
    for (i, segment) in segments.iter().enumerate() {
        if *segment == "**" {
            if segments.len() == 1 {
                // A bare "**" matches everything, including zero segments.
                regex_str.push_str(".*");
            } else if i == 0 {
                // Leading "**": zero or more whole segments before the
                // rest, with the trailing "/" folded into the group so
                // the next segment doesn't also emit one.
                regex_str.push_str("(?:.*/)?");
                skip_separator = true;
                continue;
            } else {
                // Middle or trailing "**": zero or more whole segments,
                // with the separator before it made optional.
                regex_str.push_str("(?:/.*)?");
            }
        } else {
            if !skip_separator {
                regex_str.push('/');
            }
            regex_str.push_str(&segment_to_regex(segment));
        }
        skip_separator = false;
    }
    regex_str.push('$');
    Regex::new(&regex_str).unwrap_or_else(|_| {
        // A pattern that fails to compile matches nothing, rather than
        // panicking the permission check.
        Regex::new("$^").expect("never-matching regex is valid")
    })
}

const REGEX_META: &[char] = &[
    '.', '+', '(', ')', '|', '[', ']', '{', '}', '^', '$', '\\', '?',
];

fn segment_to_regex(segment: &str) -> String {
    let mut out = String::new();
    for ch in segment.chars() {
        match ch {
            '*' => out.push_str("[^/]*"),
            c if REGEX_META.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_within_segment() {
        assert!(glob_matches("public/*.csv", "public/data.csv"));
        assert!(!glob_matches("public/*.csv", "public/nested/data.csv"));
    }

    #[test]
    fn double_star_matches_every_path() {
        assert!(glob_matches("**", "anything/at/all"));
        assert!(glob_matches("**", "single"));
    }

    #[test]
    fn double_star_matches_zero_or_more_segments() {
        assert!(glob_matches("data/**/public.csv", "data/public.csv"));
        assert!(glob_matches("data/**/public.csv", "data/a/b/public.csv"));
    }

    #[test]
    fn leading_double_star_matches_zero_or_more_segments() {
        assert!(glob_matches("**/public.csv", "public.csv"));
        assert!(glob_matches("**/public.csv", "a/b/public.csv"));
        assert!(!glob_matches("**/public.csv", "public.csv.bak"));
    }

    #[test]
    fn literal_characters_match_exactly() {
        assert!(glob_matches("config.yaml", "config.yaml"));
        assert!(!glob_matches("config.yaml", "config.yml"));
    }
}
