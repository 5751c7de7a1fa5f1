// Copyright 2024. Felix Engl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A single `*`-wildcard glob, full-string anchored (spec.md §4.1: "a `*`
//! matches any run of characters, anchored start and end").

/// Matches `text` against `pattern`, where `*` in `pattern` matches zero or
/// more characters. Equivalent to `^pattern$` with `*` replaced by `.*`,
/// but implemented directly rather than through the `regex` crate since
/// patterns are short and evaluated per-URL on the hot path.
pub fn glob_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    match_from(&text, 0, &pattern, 0)
}

fn match_from(text: &[char], ti: usize, pattern: &[char], pi: usize) -> bool {
    if pi == pattern.len() {
        return ti == text.len();
    }

    if pattern[pi] == '*' {
        // Try consuming zero or more characters of `text` for this `*`.
        for skip in 0..=(text.len() - ti) {
            if match_from(text, ti + skip, pattern, pi + 1) {
                return true;
            }
        }
        return false;
    }

    ti < text.len() && text[ti] == pattern[pi] && match_from(text, ti + 1, pattern, pi + 1)
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Any literal string (no `*`) matches itself and nothing longer.
        #[test]
        fn literal_pattern_is_reflexive(s in "[a-z0-9_]{0,16}") {
            prop_assert!(glob_match(&s, &s));
        }

        /// `prefix*` matches `prefix` followed by anything.
        #[test]
        fn star_suffix_matches_any_tail(prefix in "[a-z]{1,8}", tail in "[a-z0-9]{0,8}") {
            let pattern = format!("{prefix}*");
            let text = format!("{prefix}{tail}");
            prop_assert!(glob_match(&text, &pattern));
        }

        /// A bare `*` matches every string.
        #[test]
        fn bare_star_matches_everything(s in "[a-zA-Z0-9/_.-]{0,32}") {
            prop_assert!(glob_match(&s, "*"));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(glob_match("fbclid", "fbclid"));
        assert!(!glob_match("fbclid2", "fbclid"));
    }

    #[test]
    fn star_matches_any_run() {
        assert!(glob_match("utm_source", "utm_*"));
        assert!(glob_match("utm_", "utm_*"));
        assert!(!glob_match("xutm_source", "utm_*"));
    }

    #[test]
    fn star_is_anchored_both_ends() {
        assert!(glob_match("image/png", "image/*"));
        assert!(!glob_match("notimage/png", "image/*"));
    }

    #[test]
    fn empty_pattern_matches_only_empty_text() {
        assert!(glob_match("", ""));
        assert!(!glob_match("a", ""));
    }
}
