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

//! URL canonicalization and glob matching (spec.md §4.1).
//!
//! Pure functions only — no I/O, no shared state. The frontier keys its
//! `seen`/`in_frontier` sets on the output of [`canonicalize`].

mod glob;

pub use glob::glob_match;

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum CanonicalizeError {
    #[error("could not parse URL: {0}")]
    Parse(#[from] url::ParseError),
}

/// The components of a URL needed by the scope predicate, extracted via
/// the public-suffix list so that `registered_domain` is correct for
/// multi-part TLDs (`co.uk`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlComponents {
    pub scheme: String,
    pub host: String,
    pub registered_domain: String,
    pub subdomain: String,
    pub path: String,
    pub canonical: String,
}

/// Canonicalizes `raw`, resolving it against `base` first if it is
/// relative. `ignore_query_patterns` are glob patterns (`*` wildcard,
/// full-string match) naming query keys to drop.
///
/// Steps follow spec.md §4.1 exactly: resolve relative → lower-case
/// scheme/host → drop default port → normalize path → filter+sort query →
/// drop fragment → re-serialize.
pub fn canonicalize(
    raw: &str,
    base: Option<&Url>,
    ignore_query_patterns: &[String],
) -> Result<String, CanonicalizeError> {
    let mut url = match base {
        Some(base) => Url::options().base_url(Some(base)).parse(raw)?,
        None => Url::parse(raw)?,
    };

    lowercase_scheme_and_host(&mut url);
    drop_default_port(&mut url);
    normalize_path(&mut url);
    normalize_query(&mut url, ignore_query_patterns);
    url.set_fragment(None);

    Ok(url.to_string())
}

fn lowercase_scheme_and_host(url: &mut Url) {
    if url.scheme() != url.scheme().to_ascii_lowercase() {
        let lowered = url.scheme().to_ascii_lowercase();
        let _ = url.set_scheme(&lowered);
    }
    if let Some(host) = url.host_str() {
        let lowered = host.to_ascii_lowercase();
        if lowered != host {
            let _ = url.set_host(Some(&lowered));
        }
    }
}

fn drop_default_port(url: &mut Url) {
    let default = match url.scheme() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    };
    if url.port() == default {
        let _ = url.set_port(None);
    }
}

/// Resolves `.`/`..` segments, collapses empty segments, and preserves a
/// trailing slash only when the original path ended in one AND the last
/// segment has no dot in it (the "directory heuristic" from spec.md §9).
fn normalize_path(url: &mut Url) {
    let original = url.path().to_string();
    let had_trailing_slash = original.ends_with('/') && original != "/";

    let mut resolved: Vec<&str> = Vec::new();
    for segment in original.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }

    let keep_trailing_slash = had_trailing_slash
        && resolved
            .last()
            .map(|last| !last.contains('.'))
            .unwrap_or(false);

    let mut new_path = String::from("/");
    new_path.push_str(&resolved.join("/"));
    if keep_trailing_slash && new_path != "/" {
        new_path.push('/');
    }

    url.set_path(&new_path);
}

/// Drops query params matching any ignore glob, then sorts the rest
/// lexicographically by name and, within a name, by value.
fn normalize_query(url: &mut Url, ignore_query_patterns: &[String]) {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .filter(|(key, _)| !ignore_query_patterns.iter().any(|p| glob_match(key, p)))
        .collect();

    if pairs.is_empty() {
        url.set_query(None);
        return;
    }

    pairs.sort();
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in &pairs {
        serializer.append_pair(key, value);
    }
    url.set_query(Some(&serializer.finish()));
}

/// Extracts scope-relevant components from a URL, using the public-suffix
/// list to compute `registered_domain`/`subdomain` correctly for
/// multi-label TLDs.
pub fn get_url_components(
    url: &str,
    ignore_query_patterns: &[String],
) -> Result<UrlComponents, CanonicalizeError> {
    let parsed = Url::parse(url)?;
    let host = parsed.host_str().unwrap_or("").to_ascii_lowercase();
    let (registered_domain, subdomain) = split_registered_domain(&host);
    let canonical = canonicalize(url, None, ignore_query_patterns)?;

    Ok(UrlComponents {
        scheme: parsed.scheme().to_ascii_lowercase(),
        host,
        registered_domain,
        subdomain,
        path: parsed.path().to_string(),
        canonical,
    })
}

/// Splits `host` into `(registered_domain, subdomain)` using the public
/// suffix list, e.g. `blog.example.co.uk` -> `(example.co.uk, blog)`.
fn split_registered_domain(host: &str) -> (String, String) {
    let labels: Vec<&str> = host.split('.').collect();
    let Some(suffix_len) = psl::suffix(host.as_bytes()).map(|s| {
        std::str::from_utf8(s.as_bytes())
            .unwrap_or_default()
            .split('.')
            .count()
    }) else {
        return (host.to_string(), String::new());
    };

    if labels.len() <= suffix_len {
        return (host.to_string(), String::new());
    }

    let registered_start = labels.len() - suffix_len - 1;
    let registered_domain = labels[registered_start..].join(".");
    let subdomain = labels[..registered_start].join(".");
    (registered_domain, subdomain)
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// P4: canonicalizing an already-canonical URL is a no-op, for any
        /// combination of host/path/query segments a worker might see.
        #[test]
        fn canonicalize_is_idempotent(
            host in "[a-z]{3,10}\\.(com|org|net)",
            segments in prop::collection::vec("[a-z0-9]{1,6}", 0..4),
            keys in prop::collection::vec("[a-z]{1,4}", 0..3),
        ) {
            let path = segments.join("/");
            let query = keys
                .iter()
                .enumerate()
                .map(|(i, k)| format!("{k}={i}"))
                .collect::<Vec<_>>()
                .join("&");
            let raw = if query.is_empty() {
                format!("https://{host}/{path}")
            } else {
                format!("https://{host}/{path}?{query}")
            };

            let once = canonicalize(&raw, None, &[]).unwrap();
            let twice = canonicalize(&once, None, &[]).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
