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

//! A two-tier `robots.txt` cache: an in-memory `moka` cache backed by a
//! per-host JSON file, mirroring `original_source/robots.py`'s
//! memory-then-disk lookup but fixing its lack of an actual TTL check on
//! the disk tier.

use crate::models::RobotsEntry;
use camino::Utf8Path;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

pub const TTL: Duration = Duration::hours(24);

pub struct RobotsCache {
    memory: moka::future::Cache<String, Arc<RobotsEntry>>,
    disk_dir: camino::Utf8PathBuf,
}

impl RobotsCache {
    pub fn new(disk_dir: impl Into<camino::Utf8PathBuf>) -> Self {
        Self {
            memory: moka::future::Cache::new(10_000),
            disk_dir: disk_dir.into(),
        }
    }

    fn disk_path(&self, host: &str) -> camino::Utf8PathBuf {
        self.disk_dir.join(format!("{}.json", host.replace(':', "_")))
    }

    pub async fn get(&self, origin: &str, host: &str) -> Option<Arc<RobotsEntry>> {
        if let Some(entry) = self.memory.get(origin).await {
            if !entry.is_stale(OffsetDateTime::now_utc(), TTL) {
                return Some(entry);
            }
        }

        let path = self.disk_path(host);
        if let Ok(bytes) = tokio::fs::read(&path).await {
            if let Ok(entry) = serde_json::from_slice::<RobotsEntry>(&bytes) {
                if !entry.is_stale(OffsetDateTime::now_utc(), TTL) {
                    let entry = Arc::new(entry);
                    self.memory.insert(origin.to_string(), entry.clone()).await;
                    return Some(entry);
                }
            }
        }

        None
    }

    pub async fn put(&self, origin: &str, host: &str, entry: RobotsEntry) {
        let entry = Arc::new(entry);
        self.memory.insert(origin.to_string(), entry.clone()).await;

        if let Err(e) = self.write_disk(host, &entry).await {
            log::warn!("failed to write robots cache for {host}: {e}");
        }
    }

    async fn write_disk(&self, host: &str, entry: &RobotsEntry) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.disk_dir).await?;
        let path = self.disk_path(host);
        let json = serde_json::to_vec(entry).unwrap_or_default();
        tokio::fs::write(&path, json).await
    }

    /// Evicts both tiers for a single origin. `origin` must be the same
    /// `scheme://host[:port]` string passed to `get`/`put`; `host` only
    /// selects the disk file.
    pub async fn clear_host(&self, origin: &str, host: &str) {
        self.memory.invalidate(origin).await;
        let _ = tokio::fs::remove_file(self.disk_path(host)).await;
    }

    #[cfg(test)]
    pub(crate) fn disk_dir(&self) -> &Utf8Path {
        &self.disk_dir
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(origin: &str) -> RobotsEntry {
        RobotsEntry {
            origin: origin.to_string(),
            body: "User-agent: *\nDisallow: /private".to_string(),
            status: Some(200),
            fetched_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn clear_host_evicts_the_memory_tier_too() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RobotsCache::new(camino::Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap());

        let origin = "https://example.com";
        let host = "example.com";
        cache.put(origin, host, entry(origin)).await;
        assert!(cache.get(origin, host).await.is_some());

        // Remove the disk file out from under the cache so a lookup can
        // only succeed through the memory tier.
        tokio::fs::remove_file(cache.disk_path(host)).await.unwrap();
        assert!(cache.get(origin, host).await.is_some(), "memory tier should still serve it");

        cache.clear_host(origin, host).await;
        assert!(
            cache.get(origin, host).await.is_none(),
            "clear_host must invalidate the memory tier, keyed on origin, not host"
        );
    }
}
