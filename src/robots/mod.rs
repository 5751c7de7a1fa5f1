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

//! The robots/sitemap advisor (spec.md §4.5). Unlike
//! `original_source/robots.py::can_fetch`, which unconditionally allows
//! every URL, `can_fetch` here actually parses the cached body and honors
//! its directives.

mod cache;
mod sitemap_discovery;

pub use cache::RobotsCache;
pub use sitemap_discovery::{discover_sitemaps, parse_sitemap};

use crate::fetch::Fetcher;
use crate::models::RobotsEntry;
use std::time::Duration;
use texting_robots::Robot;
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

#[derive(Debug, Error)]
pub enum RobotsError {
    #[error("could not parse robots.txt for {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: texting_robots::Error,
    },
}

const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RobotsAdvisor {
    cache: RobotsCache,
    user_agent: String,
}

impl RobotsAdvisor {
    pub fn new(disk_dir: impl Into<camino::Utf8PathBuf>, user_agent: impl Into<String>) -> Self {
        Self {
            cache: RobotsCache::new(disk_dir),
            user_agent: user_agent.into(),
        }
    }

    fn origin_of(url: &Url) -> String {
        match url.port() {
            Some(port) => format!("{}://{}:{port}", url.scheme(), url.host_str().unwrap_or("")),
            None => format!("{}://{}", url.scheme(), url.host_str().unwrap_or("")),
        }
    }

    /// Fetches (or returns cached) `robots.txt` for `url`'s origin. A
    /// fetch failure is cached as an empty body, per spec.md §4.5, so a
    /// dead origin is not hammered on every subsequent URL.
    async fn entry_for(&self, url: &Url, fetcher: &dyn Fetcher) -> RobotsEntry {
        let origin = Self::origin_of(url);
        let host = url.host_str().unwrap_or("").to_string();

        if let Some(cached) = self.cache.get(&origin, &host).await {
            return (*cached).clone();
        }

        let robots_url = format!("{origin}/robots.txt");
        let (body, status) = match Url::parse(&robots_url)
            .ok()
            .map(|u| fetcher.get_text(&u, ROBOTS_FETCH_TIMEOUT))
        {
            Some(fut) => match fut.await {
                Ok(response) if response.status == 200 => (response.body, Some(response.status)),
                Ok(response) => (String::new(), Some(response.status)),
                Err(_) => (String::new(), None),
            },
            None => (String::new(), None),
        };

        let entry = RobotsEntry {
            origin: origin.clone(),
            body,
            status,
            fetched_at: OffsetDateTime::now_utc(),
        };
        self.cache.put(&origin, &host, entry.clone()).await;
        entry
    }

    /// Returns `true` if `url` may be fetched by `user_agent` (falls back
    /// to the advisor's configured agent when `None`). Only consulted by
    /// the orchestrator when the job's `respect_robots` is set.
    pub async fn can_fetch(
        &self,
        url: &Url,
        fetcher: &dyn Fetcher,
        user_agent: Option<&str>,
    ) -> Result<bool, RobotsError> {
        let entry = self.entry_for(url, fetcher).await;
        if entry.body.is_empty() {
            // No robots.txt (or it couldn't be fetched): allow by default,
            // the standard's documented behavior for a missing file.
            return Ok(true);
        }

        let agent = user_agent.unwrap_or(&self.user_agent);
        let robot = Robot::new(agent, entry.body.as_bytes()).map_err(|source| RobotsError::Parse {
            origin: entry.origin.clone(),
            source,
        })?;
        Ok(robot.allowed(url.as_str()))
    }

    /// The crawl-delay directive for `url`'s origin, if any (seconds).
    pub async fn crawl_delay(
        &self,
        url: &Url,
        fetcher: &dyn Fetcher,
        user_agent: Option<&str>,
    ) -> Option<f32> {
        let entry = self.entry_for(url, fetcher).await;
        if entry.body.is_empty() {
            return None;
        }
        let agent = user_agent.unwrap_or(&self.user_agent);
        Robot::new(agent, entry.body.as_bytes())
            .ok()
            .and_then(|r| r.delay)
    }

    /// Union of `Sitemap:` directives in robots.txt plus conventional
    /// paths that respond 200 to HEAD (spec.md §4.5).
    pub async fn discover_sitemaps(&self, base: &Url, fetcher: &dyn Fetcher) -> Vec<Url> {
        let entry = self.entry_for(base, fetcher).await;
        discover_sitemaps(base, &entry.body, fetcher).await
    }
}
