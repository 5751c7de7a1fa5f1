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

//! The deduplicating frontier: a bounded FIFO of `(canonical_url, depth)`
//! plus the `seen`/`in_frontier`/`visited` sets that give invariant I1
//! (spec.md §4.3).

use crate::models::JobStats;
use crate::url_canon::{canonicalize, CanonicalizeError};
use std::collections::HashSet;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum FrontierError {
    #[error(transparent)]
    Canonicalize(#[from] CanonicalizeError),
}

/// `(canonical_url, depth)`, the unit the frontier queues and hands to
/// workers.
pub type FrontierItem = (String, u32);

struct Sets {
    seen: HashSet<String>,
    in_frontier: HashSet<String>,
    visited: HashSet<String>,
}

/// The job-scoped frontier. Cheap to clone (an `Arc` internally would be
/// used by callers that need to share it across worker tasks — here the
/// orchestrator holds the only instance and hands out `&Frontier`).
pub struct Frontier {
    ignore_query_patterns: Vec<String>,
    sender: mpsc::UnboundedSender<FrontierItem>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<FrontierItem>>,
    sets: Mutex<Sets>,
    stats: Mutex<JobStats>,
}

impl Frontier {
    pub fn new(ignore_query_patterns: Vec<String>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            ignore_query_patterns,
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            sets: Mutex::new(Sets {
                seen: HashSet::new(),
                in_frontier: HashSet::new(),
                visited: HashSet::new(),
            }),
            stats: Mutex::new(JobStats::default()),
        }
    }

    fn canonical(&self, url: &str) -> Result<String, FrontierError> {
        Ok(canonicalize(url, None, &self.ignore_query_patterns)?)
    }

    /// Adds `url` at `depth` if it has never been seen before. Returns
    /// `false` for an already-seen URL (not an error).
    pub fn enqueue(&self, url: &str, depth: u32) -> Result<bool, FrontierError> {
        let canonical = self.canonical(url)?;
        let mut sets = self.sets.lock().unwrap();
        if sets.seen.contains(&canonical) {
            return Ok(false);
        }
        sets.seen.insert(canonical.clone());
        sets.in_frontier.insert(canonical.clone());
        drop(sets);

        // An unbounded channel's send only fails if every receiver was
        // dropped, which only happens once this Frontier itself is gone.
        let _ = self.sender.send((canonical, depth));

        let mut stats = self.stats.lock().unwrap();
        stats.enqueued += 1;
        stats.queued += 1;
        Ok(true)
    }

    /// Non-blocking bulk variant; returns the count actually added.
    pub fn add_bulk(&self, urls_with_depth: &[(String, u32)]) -> Result<usize, FrontierError> {
        let mut added = 0;
        for (url, depth) in urls_with_depth {
            if self.enqueue(url, *depth)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Blocks until an item is available or `cancel` fires. Returns `None`
    /// on cancellation — *not* the same as an empty frontier, which
    /// callers detect via [`Frontier::is_empty`].
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<FrontierItem> {
        let mut receiver = self.receiver.lock().await;
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = receiver.recv() => item,
        }?;

        let mut sets = self.sets.lock().unwrap();
        sets.in_frontier.remove(&item.0);
        sets.visited.insert(item.0.clone());
        drop(sets);

        let mut stats = self.stats.lock().unwrap();
        stats.queued = stats.queued.saturating_sub(1);
        stats.visited += 1;

        Some(item)
    }

    pub fn mark_success(&self, canonical_url: &str) {
        if self.sets.lock().unwrap().visited.contains(canonical_url) {
            self.stats.lock().unwrap().ok += 1;
        }
    }

    pub fn mark_failure(&self, canonical_url: &str, reason: &str) {
        if self.sets.lock().unwrap().visited.contains(canonical_url) {
            self.stats.lock().unwrap().failed += 1;
            log::debug!("url failed: {canonical_url} - {reason}");
        }
    }

    pub fn mark_skipped(&self, reason: &str) {
        self.stats.lock().unwrap().skipped += 1;
        log::debug!("url skipped: {reason}");
    }

    pub fn is_visited(&self, canonical_url: &str) -> bool {
        self.sets.lock().unwrap().visited.contains(canonical_url)
    }

    pub fn is_in_frontier(&self, canonical_url: &str) -> bool {
        self.sets
            .lock()
            .unwrap()
            .in_frontier
            .contains(canonical_url)
    }

    pub fn is_seen(&self, canonical_url: &str) -> bool {
        self.is_visited(canonical_url) || self.is_in_frontier(canonical_url)
    }

    pub fn size(&self) -> u64 {
        self.stats.lock().unwrap().queued
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn stats(&self) -> JobStats {
        *self.stats.lock().unwrap()
    }

    pub fn total_seen(&self) -> usize {
        self.sets.lock().unwrap().seen.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn enqueue_rejects_duplicates() {
        let frontier = Frontier::new(vec![]);
        assert!(frontier.enqueue("https://example.com/a", 0).unwrap());
        assert!(!frontier.enqueue("https://example.com/a", 0).unwrap());
        assert!(!frontier
            .enqueue("https://EXAMPLE.com/a", 0)
            .unwrap());
        assert_eq!(frontier.stats().enqueued, 1);
    }

    #[tokio::test]
    async fn scenario_3_bfs_order_and_depth_cap() {
        let frontier = Frontier::new(vec![]);
        let cancel = CancellationToken::new();

        frontier.enqueue("https://example.com/s", 0).unwrap();
        frontier.enqueue("https://example.com/a", 1).unwrap();
        frontier.enqueue("https://example.com/b", 1).unwrap();
        // depth(C) would be 2 with max_depth=1, so the orchestrator never
        // calls enqueue for it; the frontier itself doesn't enforce depth.

        let (s, depth_s) = frontier.dequeue(&cancel).await.unwrap();
        assert_eq!((s.as_str(), depth_s), ("https://example.com/s", 0));
        let (a, _) = frontier.dequeue(&cancel).await.unwrap();
        assert_eq!(a, "https://example.com/a");
        let (b, _) = frontier.dequeue(&cancel).await.unwrap();
        assert_eq!(b, "https://example.com/b");

        frontier.mark_success(&s);
        frontier.mark_success(&a);
        frontier.mark_success(&b);

        let stats = frontier.stats();
        assert_eq!(stats.enqueued, 3);
        assert_eq!(stats.visited, 3);
        assert_eq!(stats.ok, 3);
        assert_eq!(stats.queued, 0);
        assert!(frontier.is_empty());
    }

    #[tokio::test]
    async fn dequeue_returns_none_on_cancellation_not_emptiness() {
        let frontier = Frontier::new(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(frontier.dequeue(&cancel).await.is_none());
    }

    #[test]
    fn mark_success_requires_visited_membership() {
        let frontier = Frontier::new(vec![]);
        frontier.enqueue("https://example.com/a", 0).unwrap();
        // Never dequeued, so not yet in the visited set.
        frontier.mark_success("https://example.com/a");
        assert_eq!(frontier.stats().ok, 0);
    }
}
