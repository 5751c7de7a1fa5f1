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

//! Sitemap discovery and parsing (spec.md §4.5). Malformed XML is
//! tolerated by returning an empty list rather than propagating an error —
//! a bad sitemap should never fail the job.

use crate::fetch::Fetcher;
use sitemap::reader::{SiteMapEntity, SiteMapReader};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

const HEAD_TIMEOUT: Duration = Duration::from_secs(10);
const GET_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_CHILD_SITEMAPS: usize = 10;
const SITEMAP_INDEX_DEPTH: u32 = 1;

const CONVENTIONAL_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/sitemaps.xml",
    "/sitemap/sitemap.xml",
];

/// Returns the `Sitemap:` directives parsed out of `robots_body` plus any
/// conventional sitemap paths that respond 200 to HEAD.
pub async fn discover_sitemaps(base: &Url, robots_body: &str, fetcher: &dyn Fetcher) -> Vec<Url> {
    let mut found = HashSet::new();

    for line in robots_body.lines() {
        let line = line.trim();
        if let Some(rest) = line.to_ascii_lowercase().strip_prefix("sitemap:") {
            let value = line[rest.len()..].trim().to_string();
            if let Ok(url) = Url::parse(&value) {
                found.insert(url);
            }
        }
    }

    for path in CONVENTIONAL_PATHS {
        let Ok(url) = base.join(path) else { continue };
        if let Ok(info) = fetcher.head(&url, HEAD_TIMEOUT).await {
            if info.status == 200 {
                found.insert(url);
            }
        }
    }

    found.into_iter().collect()
}

/// Parses a sitemap (or sitemap index, bounded to one level and ten
/// children) and returns up to `max_urls` `<loc>` entries.
pub async fn parse_sitemap(url: &Url, max_urls: usize, fetcher: &dyn Fetcher) -> Vec<String> {
    parse_sitemap_at_depth(url, max_urls, fetcher, 0).await
}

async fn parse_sitemap_at_depth(
    url: &Url,
    max_urls: usize,
    fetcher: &dyn Fetcher,
    depth: u32,
) -> Vec<String> {
    let Ok(response) = fetcher.get_text(url, GET_TIMEOUT).await else {
        return Vec::new();
    };
    if response.status != 200 {
        return Vec::new();
    }

    let mut urls = Vec::new();
    let mut child_sitemaps = Vec::new();

    let reader = SiteMapReader::new(response.body.as_bytes());
    for entity in reader {
        match entity {
            SiteMapEntity::Url(entry) => {
                if let sitemap::structs::Location::Url(loc) = entry.loc {
                    urls.push(loc.to_string());
                    if urls.len() >= max_urls {
                        break;
                    }
                }
            }
            SiteMapEntity::SiteMap(entry) => {
                if let sitemap::structs::Location::Url(loc) = entry.loc {
                    child_sitemaps.push(loc);
                }
            }
            SiteMapEntity::Err(_) => {
                // Malformed entry: skip it, don't fail the whole sitemap.
            }
        }
    }

    if !child_sitemaps.is_empty() && depth < SITEMAP_INDEX_DEPTH {
        for child in child_sitemaps.into_iter().take(MAX_CHILD_SITEMAPS) {
            if urls.len() >= max_urls {
                break;
            }
            let remaining = max_urls - urls.len();
            let child_urls =
                Box::pin(parse_sitemap_at_depth(&child, remaining, fetcher, depth + 1)).await;
            urls.extend(child_urls);
        }
    }

    urls.truncate(max_urls);
    urls
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sitemap_directive_parsed_case_insensitively() {
        let body = "User-agent: *\nSitemap: https://example.com/sitemap.xml\n";
        assert!(body
            .lines()
            .any(|l| l.to_ascii_lowercase().starts_with("sitemap:")));
    }
}
