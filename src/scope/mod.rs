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

//! The scope predicate: decides whether a discovered URL is in-bounds for
//! a job (spec.md §4.2).

mod content_type;
mod excludes;

pub use content_type::{is_asset_type_allowed, is_content_type_allowed};
pub use excludes::get_default_exclude_patterns;

use crate::models::{CrawlParams, ScopeKind};
use crate::url_canon::{get_url_components, UrlComponents};
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("invalid regex pattern {index} ({pattern:?}): {source}")]
    InvalidPattern {
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("scope is path_prefix but no path_prefix was given")]
    MissingPathPrefix,
    #[error("scope is custom but neither include nor exclude patterns were given")]
    CustomScopeNeedsPatterns,
    #[error(transparent)]
    Canonicalize(#[from] crate::url_canon::CanonicalizeError),
}

/// Returns true iff `url` is in scope for `params`, given the seed's
/// pre-computed components.
pub fn in_scope(
    url: &str,
    params: &CrawlParams,
    seed: &UrlComponents,
) -> Result<bool, ScopeError> {
    let components = get_url_components(url, &params.ignore_query_params)?;

    if params.same_protocol_only && components.scheme != seed.scheme {
        return Ok(false);
    }

    match params.scope {
        ScopeKind::Domain => {
            if components.registered_domain != seed.registered_domain {
                return Ok(false);
            }
        }
        ScopeKind::Host => {
            if components.host != seed.host {
                return Ok(false);
            }
        }
        ScopeKind::PathPrefix => {
            if components.host != seed.host {
                return Ok(false);
            }
            if let Some(prefix) = &params.path_prefix {
                if !components.path.starts_with(prefix.as_str()) {
                    return Ok(false);
                }
            }
        }
        ScopeKind::Custom => {}
    }

    if !params.include_patterns.is_empty() {
        let mut matched = false;
        for pattern in &params.include_patterns {
            let re = compile(pattern)?;
            if re.is_match(url) {
                matched = true;
                break;
            }
        }
        if !matched {
            return Ok(false);
        }
    }

    for pattern in &params.exclude_patterns {
        let re = compile(pattern)?;
        if re.is_match(url) {
            return Ok(false);
        }
    }

    Ok(true)
}

fn compile(pattern: &str) -> Result<Regex, ScopeError> {
    Regex::new(pattern).map_err(|source| ScopeError::InvalidPattern {
        index: 0,
        pattern: pattern.to_string(),
        source,
    })
}

/// Rejects links carrying `rel="nofollow"` unless the job opted in, then
/// defers to [`in_scope`].
pub fn should_follow_link(
    url: &str,
    params: &CrawlParams,
    seed: &UrlComponents,
    link_has_nofollow: bool,
) -> Result<bool, ScopeError> {
    if link_has_nofollow && !params.follow_nofollow {
        return Ok(false);
    }
    in_scope(url, params, seed)
}

/// Fills in the default spider-trap excludes when the job didn't specify
/// any of its own, mirroring `apply_default_excludes` from the reference
/// source. A no-op once a job has any exclude pattern, custom or not.
pub fn apply_default_excludes(params: &mut CrawlParams) {
    if params.exclude_patterns.is_empty() {
        params.exclude_patterns = get_default_exclude_patterns();
    }
}

/// Validates a job's patterns compile and its scope/pattern combination is
/// sane, mirroring `validate_scope_config` from the reference source.
pub fn validate_scope_config(params: &CrawlParams) -> Vec<String> {
    let mut errors = Vec::new();

    if matches!(params.scope, ScopeKind::PathPrefix) && params.path_prefix.is_none() {
        errors.push("path_prefix is required when scope is 'path_prefix'".to_string());
    }

    for (i, pattern) in params.include_patterns.iter().enumerate() {
        if let Err(e) = Regex::new(pattern) {
            errors.push(format!("invalid include pattern {i}: {pattern} - {e}"));
        }
    }
    for (i, pattern) in params.exclude_patterns.iter().enumerate() {
        if let Err(e) = Regex::new(pattern) {
            errors.push(format!("invalid exclude pattern {i}: {pattern} - {e}"));
        }
    }

    if matches!(params.scope, ScopeKind::Custom)
        && params.include_patterns.is_empty()
        && params.exclude_patterns.is_empty()
    {
        errors.push("custom scope requires at least one include or exclude pattern".to_string());
    }

    errors
}

/// A short human-readable summary of a job's scope, used for logging and
/// job listings.
pub fn get_scope_description(params: &CrawlParams, seed: &UrlComponents) -> String {
    let mut desc = match params.scope {
        ScopeKind::Domain => format!("domain: {}", seed.registered_domain),
        ScopeKind::Host => format!("host: {}", seed.host),
        ScopeKind::PathPrefix => format!(
            "host: {}, path prefix: {}",
            seed.host,
            params.path_prefix.as_deref().unwrap_or("/")
        ),
        ScopeKind::Custom => "custom scope".to_string(),
    };

    if !params.include_patterns.is_empty() {
        desc.push_str(&format!(", include patterns: {}", params.include_patterns.len()));
    }
    if !params.exclude_patterns.is_empty() {
        desc.push_str(&format!(", exclude patterns: {}", params.exclude_patterns.len()));
    }
    if params.same_protocol_only {
        desc.push_str(&format!(", protocol: {} only", seed.scheme));
    }

    desc
}
