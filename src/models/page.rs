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

//! Records written once to the store and never mutated afterwards
//! (spec.md §3, §4.7).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;

/// The extractor's payload, stored verbatim under `article_result`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleResult {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, rename = "textContent")]
    pub text_content: Option<String>,
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    #[serde(default)]
    pub screenshot: Option<String>,
    #[serde(default, rename = "fullContent")]
    pub full_content: Option<String>,
}

/// One processed URL. Written once; `page_id` is the sha256 hex digest of
/// the canonical URL (spec.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub depth: u32,
    pub status_code: u16,
    pub ok: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    pub article_result: ArticleResult,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub assets: HashMap<String, String>,
    pub crawl_metadata: CrawlMetadata,
    /// The page's `<link rel="canonical">` target, if any. Informational
    /// only — frontier dedup stays keyed on the page's own canonicalized
    /// URL, never on this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlMetadata {
    pub job_id: String,
    pub depth: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub crawled_at: OffsetDateTime,
}

impl PageRecord {
    pub fn ok(
        job_id: &str,
        url: String,
        depth: u32,
        status_code: u16,
        article_result: ArticleResult,
        now: OffsetDateTime,
    ) -> Self {
        let title = article_result.title.clone();
        let length = article_result.length;
        Self {
            url,
            depth,
            status_code,
            ok: true,
            timestamp: now,
            reason: None,
            title,
            length,
            article_result,
            assets: HashMap::new(),
            crawl_metadata: CrawlMetadata {
                job_id: job_id.to_string(),
                depth,
                crawled_at: now,
            },
            canonical_url: None,
        }
    }

    /// Attaches the scraped canonical link, if one was found.
    pub fn with_canonical_url(mut self, canonical_url: Option<String>) -> Self {
        self.canonical_url = canonical_url;
        self
    }

    pub fn failed(
        job_id: &str,
        url: String,
        depth: u32,
        status_code: u16,
        reason: impl Into<String>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            url,
            depth,
            status_code,
            ok: false,
            timestamp: now,
            reason: Some(reason.into()),
            title: None,
            length: None,
            article_result: ArticleResult::default(),
            assets: HashMap::new(),
            crawl_metadata: CrawlMetadata {
                job_id: job_id.to_string(),
                depth,
                crawled_at: now,
            },
            canonical_url: None,
        }
    }
}

/// A content-addressed binary blob (spec.md §3, §4.7, invariant I7).
#[derive(Debug, Clone)]
pub struct AssetBlob {
    pub blob_id: String,
    pub extension: Option<String>,
    pub bytes: Vec<u8>,
}

/// Projection of `PageRecord` returned by `list_pages` (spec.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSummary {
    pub url: String,
    pub depth: u32,
    pub ok: bool,
    pub status_code: u16,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl From<&PageRecord> for PageSummary {
    fn from(record: &PageRecord) -> Self {
        Self {
            url: record.url.clone(),
            depth: record.depth,
            ok: record.ok,
            status_code: record.status_code,
            timestamp: record.timestamp,
        }
    }
}

/// Full record returned by a single-page lookup, identical in shape to
/// what is persisted on disk.
pub type PageDetail = PageRecord;
