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

//! Job lifecycle state, persisted as the `status` section of the manifest
//! (spec.md §4.7) and owned exclusively by the orchestrator.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    /// Terminal states never transition further except via a fresh job.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Stopped
        )
    }
}

/// Cumulative counters maintained by the frontier and mirrored into the
/// manifest. `visited = ok + failed + skipped` is invariant I2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub queued: u64,
    pub visited: u64,
    pub ok: u64,
    pub failed: u64,
    pub skipped: u64,
    pub enqueued: u64,
}

impl JobStats {
    pub fn is_consistent(&self) -> bool {
        self.visited == self.ok + self.failed + self.skipped && self.enqueued >= self.visited
    }
}

/// The mutable status record for one job. `job_id`, `created_at`, and
/// `params` (held alongside, not here) never change; everything below does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub status: JobStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
    pub stats: JobStats,
    pub last_error: Option<String>,
}

impl JobState {
    pub fn new(job_id: String, created_at: OffsetDateTime) -> Self {
        Self {
            job_id,
            created_at,
            status: JobStatus::Pending,
            started_at: None,
            finished_at: None,
            stats: JobStats::default(),
            last_error: None,
        }
    }

    pub fn elapsed_sec(&self, now: OffsetDateTime) -> Option<f64> {
        let started = self.started_at?;
        let end = self.finished_at.unwrap_or(now);
        Some((end - started).as_seconds_f64())
    }

    pub fn start(&mut self, now: OffsetDateTime) {
        self.status = JobStatus::Running;
        self.started_at = Some(now);
    }

    pub fn pause(&mut self) {
        self.status = JobStatus::Paused;
    }

    pub fn resume(&mut self) {
        self.status = JobStatus::Running;
    }

    pub fn finish(&mut self, status: JobStatus, now: OffsetDateTime) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.finished_at = Some(now);
    }

    pub fn fail(&mut self, reason: impl Into<String>, now: OffsetDateTime) {
        self.last_error = Some(reason.into());
        self.finish(JobStatus::Failed, now);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn stats_consistency_matches_invariant_i2() {
        let mut stats = JobStats::default();
        stats.ok = 3;
        stats.failed = 1;
        stats.skipped = 2;
        stats.visited = 6;
        stats.enqueued = 6;
        assert!(stats.is_consistent());

        stats.visited = 5;
        assert!(!stats.is_consistent());
    }

    #[test]
    fn elapsed_sec_uses_finished_at_once_terminal() {
        let mut job = JobState::new("abc".into(), datetime!(2026-01-01 00:00:00 UTC));
        job.start(datetime!(2026-01-01 00:00:00 UTC));
        job.finish(JobStatus::Completed, datetime!(2026-01-01 00:01:40 UTC));
        assert_eq!(
            job.elapsed_sec(datetime!(2026-01-01 01:00:00 UTC)),
            Some(100.0)
        );
    }
}
