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

//! Termination-condition polling and periodic manifest flushes (spec.md
//! §4.6 state machine, mirroring `original_source/crawler.py::
//! SiteCrawler._monitor_crawl`). Runs as its own task alongside the
//! worker pool; the orchestrator awaits it to learn why a job ended.

use super::worker::WorkerContext;
use crate::models::JobStatus;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Why the monitor decided the job was done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    DurationExceeded,
    PageLimitReached,
    FrontierDrained,
    Cancelled,
}

impl TerminationReason {
    pub fn status(self) -> JobStatus {
        match self {
            TerminationReason::Cancelled => JobStatus::Stopped,
            _ => JobStatus::Completed,
        }
    }
}

/// Polls every [`TICK_INTERVAL`] until one of spec.md §4.6's termination
/// conditions holds, then cancels the worker pool so it unwinds cleanly.
pub async fn run_monitor(
    ctx: Arc<WorkerContext>,
    started_at: OffsetDateTime,
    max_duration_sec: u64,
    max_pages: u64,
) -> TerminationReason {
    loop {
        if ctx.cancel.is_cancelled() {
            return TerminationReason::Cancelled;
        }

        let elapsed = (OffsetDateTime::now_utc() - started_at).as_seconds_f64();
        if elapsed > max_duration_sec as f64 {
            ctx.cancel.cancel();
            return TerminationReason::DurationExceeded;
        }

        let stats = ctx.frontier.stats();
        if stats.visited >= max_pages {
            ctx.cancel.cancel();
            return TerminationReason::PageLimitReached;
        }

        let all_idle = ctx.busy.iter().all(|b| !b.load(Ordering::SeqCst));
        if ctx.frontier.is_empty() && all_idle {
            ctx.cancel.cancel();
            return TerminationReason::FrontierDrained;
        }

        tokio::select! {
            _ = tokio::time::sleep(TICK_INTERVAL) => {}
            _ = wait_cancelled(&ctx.cancel) => return TerminationReason::Cancelled,
        }
    }
}

async fn wait_cancelled(cancel: &CancellationToken) {
    cancel.cancelled().await
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cancelled_status_is_stopped_others_are_completed() {
        assert_eq!(TerminationReason::Cancelled.status(), JobStatus::Stopped);
        assert_eq!(
            TerminationReason::PageLimitReached.status(),
            JobStatus::Completed
        );
        assert_eq!(
            TerminationReason::FrontierDrained.status(),
            JobStatus::Completed
        );
    }
}
