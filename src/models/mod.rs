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

//! The data model shared by every component: job parameters, job state,
//! and the records the store persists.

pub mod job;
pub mod page;
pub mod params;

pub use job::{JobStats, JobState, JobStatus};
pub use page::{AssetBlob, PageDetail, PageRecord, PageSummary};
pub use params::{CrawlParams, RenderOptions, ScopeKind, WaitUntil};

/// A URL waiting in the frontier, not yet dequeued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub canonical_url: String,
    pub depth: u32,
}

/// A cached `robots.txt` fetch, keyed by origin (`scheme://host[:port]`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RobotsEntry {
    pub origin: String,
    pub body: String,
    pub status: Option<u16>,
    #[serde(with = "time::serde::rfc3339")]
    pub fetched_at: time::OffsetDateTime,
}

impl RobotsEntry {
    pub fn is_stale(&self, now: time::OffsetDateTime, ttl: time::Duration) -> bool {
        now - self.fetched_at > ttl
    }
}
