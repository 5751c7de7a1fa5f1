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

//! Per-domain token-bucket rate limiting, plus an optional global ceiling
//! (spec.md §4.4).

mod bucket;

pub use bucket::TokenBucket;

use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use url::Url;

fn domain_of(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{port}", host.to_ascii_lowercase()),
        (Some(host), None) => host.to_ascii_lowercase(),
        (None, _) => "unknown".to_string(),
    }
}

/// Per-domain buckets, created lazily and kept for the job's lifetime.
pub struct DomainRateLimiter {
    default_rate: f64,
    buckets: RwLock<HashMap<String, TokenBucket>>,
    overrides: RwLock<HashMap<String, f64>>,
}

impl DomainRateLimiter {
    pub fn new(default_rate: f64) -> Self {
        Self {
            default_rate,
            buckets: RwLock::new(HashMap::new()),
            overrides: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set_domain_rate(&self, domain: &str, rate: f64) {
        let domain = domain.to_ascii_lowercase();
        self.overrides.write().await.insert(domain.clone(), rate);
        if let Some(bucket) = self.buckets.read().await.get(&domain) {
            bucket.set_rate(rate).await;
        }
    }

    async fn with_bucket<F, Fut, R>(&self, domain: &str, f: F) -> R
    where
        F: FnOnce(&TokenBucket) -> Fut,
        Fut: std::future::Future<Output = R>,
    {
        {
            let buckets = self.buckets.read().await;
            if let Some(bucket) = buckets.get(domain) {
                return f(bucket).await;
            }
        }

        let rate = self
            .overrides
            .read()
            .await
            .get(domain)
            .copied()
            .unwrap_or(self.default_rate);
        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .entry(domain.to_string())
            .or_insert_with(|| TokenBucket::new(rate));
        f(bucket).await
    }

    pub async fn acquire(&self, url: &Url) -> bool {
        let domain = domain_of(url);
        self.with_bucket(&domain, |bucket| bucket.acquire(1.0)).await
    }

    pub async fn wait_for_permission(&self, url: &Url, timeout: Duration) -> bool {
        let domain = domain_of(url);
        self.with_bucket(&domain, |bucket| bucket.wait_for_tokens(1.0, timeout))
            .await
    }

    pub async fn acquire_scheduled(&self, url: &Url, timeout: Duration) -> bool {
        let domain = domain_of(url);
        self.with_bucket(&domain, |bucket| bucket.acquire_scheduled(1.0, timeout))
            .await
    }

    pub async fn get_wait_time(&self, url: &Url) -> f64 {
        let domain = domain_of(url);
        if !self.buckets.read().await.contains_key(&domain) {
            return 0.0;
        }
        self.with_bucket(&domain, |bucket| bucket.get_wait_time(1.0))
            .await
    }

    pub async fn clear_domain(&self, domain: &str) {
        let domain = domain.to_ascii_lowercase();
        self.buckets.write().await.remove(&domain);
        self.overrides.write().await.remove(&domain);
    }

    /// Per-domain diagnostics for the CLI status surface: only domains with
    /// a live bucket are reported (a domain with no traffic yet has nothing
    /// to show).
    pub async fn get_stats(&self) -> HashMap<String, DomainRateStats> {
        let buckets = self.buckets.read().await;
        let overrides = self.overrides.read().await;
        let mut stats = HashMap::with_capacity(buckets.len());
        for (domain, bucket) in buckets.iter() {
            stats.insert(
                domain.clone(),
                DomainRateStats {
                    rate: overrides.get(domain).copied().unwrap_or(self.default_rate),
                    tokens: bucket.tokens().await,
                    capacity: bucket.capacity(),
                    wait_time: bucket.get_wait_time(1.0).await,
                },
            );
        }
        stats
    }
}

/// A snapshot of one domain's bucket state, returned by
/// [`DomainRateLimiter::get_stats`].
#[derive(Debug, Clone, PartialEq)]
pub struct DomainRateStats {
    pub rate: f64,
    pub tokens: f64,
    pub capacity: f64,
    pub wait_time: f64,
}

/// An optional ceiling across all domains, checked before the per-domain
/// bucket.
pub struct GlobalRateLimiter {
    bucket: TokenBucket,
}

impl GlobalRateLimiter {
    pub fn new(rate: f64) -> Self {
        Self {
            bucket: TokenBucket::new(rate),
        }
    }

    pub async fn wait_for_permission(&self, timeout: Duration) -> bool {
        self.bucket.wait_for_tokens(1.0, timeout).await
    }

    pub async fn set_rate(&self, rate: f64) {
        self.bucket.set_rate(rate).await;
    }
}

/// Combines a per-domain limiter with an optional global one, tracking
/// remaining timeout budget across both (spec.md §4.4).
pub struct CrawlRateLimiter {
    pub domains: DomainRateLimiter,
    pub global: Option<GlobalRateLimiter>,
}

impl CrawlRateLimiter {
    pub fn new(default_domain_rate: f64, global_rate: Option<f64>) -> Self {
        Self {
            domains: DomainRateLimiter::new(default_domain_rate),
            global: global_rate.map(GlobalRateLimiter::new),
        }
    }

    /// Waits on the global bucket first (if configured), then the
    /// per-domain bucket, splitting `timeout` across both legs.
    pub async fn wait_for_permission(&self, url: &Url, timeout: Duration) -> bool {
        let start = Instant::now();

        if let Some(global) = &self.global {
            if !global.wait_for_permission(timeout).await {
                return false;
            }
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        self.domains.wait_for_permission(url, remaining).await
    }

    pub async fn get_stats(&self) -> HashMap<String, DomainRateStats> {
        self.domains.get_stats().await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn scenario_4_burst_then_steady_rate() {
        let limiter = DomainRateLimiter::new(2.0);
        let url = Url::parse("https://example.com/a").unwrap();

        // Burst: first two admitted immediately (capacity == 2).
        assert!(limiter.acquire(&url).await);
        assert!(limiter.acquire(&url).await);
        assert!(!limiter.acquire(&url).await);
    }

    #[tokio::test]
    async fn domain_override_changes_existing_bucket() {
        let limiter = DomainRateLimiter::new(1.0);
        let url = Url::parse("https://example.com/a").unwrap();
        limiter.acquire(&url).await;
        limiter.set_domain_rate("example.com", 5.0).await;

        let buckets = limiter.buckets.read().await;
        assert_eq!(buckets.get("example.com").unwrap().rate().await, 5.0);
    }

    #[tokio::test]
    async fn get_stats_reports_only_touched_domains() {
        let limiter = DomainRateLimiter::new(2.0);
        let url = Url::parse("https://example.com/a").unwrap();
        assert!(limiter.get_stats().await.is_empty());

        limiter.acquire(&url).await;
        let stats = limiter.get_stats().await;
        let entry = stats.get("example.com").unwrap();
        assert_eq!(entry.rate, 2.0);
        assert_eq!(entry.capacity, 2.0);
        assert_eq!(entry.tokens, 1.0);
    }

    #[tokio::test]
    async fn global_limiter_gates_before_domain_limiter() {
        let limiter = CrawlRateLimiter::new(100.0, Some(1.0));
        let a = Url::parse("https://a.example.com/").unwrap();
        let b = Url::parse("https://b.example.com/").unwrap();

        assert!(limiter.wait_for_permission(&a, Duration::from_millis(50)).await);
        // Global bucket now empty; different domain still blocked by it.
        assert!(!limiter.wait_for_permission(&b, Duration::from_millis(50)).await);
    }
}
