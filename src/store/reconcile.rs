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

//! Start-up reconciliation of jobs left `running` by a process that died
//! without a clean `stop` (spec.md §9 open question, resolved in
//! `DESIGN.md`): a `running` job with at least one page record is
//! promoted to `completed`; one with none is marked `failed`.

use super::{CrawlStore, PageStore, StoreError};
use crate::models::JobStatus;
use time::OffsetDateTime;

/// Walks every job the store knows about and closes out any left in the
/// `running` or `paused` state, since no orchestrator is alive to resume
/// them in this process. Returns the job ids that were changed.
pub fn fix_stuck_jobs(store: &mut CrawlStore, now: OffsetDateTime) -> Result<Vec<String>, StoreError> {
    let mut fixed = Vec::new();

    for manifest in store.list_jobs(usize::MAX, 0)? {
        if !matches!(manifest.status.status, JobStatus::Running | JobStatus::Paused) {
            continue;
        }

        let job_dir = store.job_dir(&manifest.job_id)?;
        let page_count = PageStore::new(job_dir.pages_dir()).count();

        let mut manifest = manifest;
        if page_count > 0 {
            manifest.status.finish(JobStatus::Completed, now);
        } else {
            manifest.status.fail("interrupted without completing", now);
        }
        store.save_manifest(&job_dir, &manifest)?;
        fixed.push(manifest.job_id);
    }

    Ok(fixed)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::models::{ArticleResult, CrawlParams, PageRecord};
    use camino::Utf8PathBuf;
    use url::Url;

    #[test]
    fn running_job_with_pages_completes() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let mut store = CrawlStore::open(root).unwrap();

        let params = CrawlParams::new(Url::parse("https://example.com/").unwrap());
        let now = time::macros::datetime!(2026-01-01 00:00:00 UTC);
        let job_dir = store.new_job(&params, now).unwrap();
        let mut manifest = store.load_manifest(&job_dir.job_id).unwrap();
        manifest.status.start(now);
        store.save_manifest(&job_dir, &manifest).unwrap();

        let record = PageRecord::ok(
            &job_dir.job_id,
            "https://example.com/".to_string(),
            0,
            200,
            ArticleResult::default(),
            now,
        );
        crate::store::PageStore::new(job_dir.pages_dir()).save(&record).unwrap();

        let later = time::macros::datetime!(2026-01-01 01:00:00 UTC);
        let fixed = fix_stuck_jobs(&mut store, later).unwrap();
        assert_eq!(fixed, vec![job_dir.job_id.clone()]);

        let reloaded = store.load_manifest(&job_dir.job_id).unwrap();
        assert_eq!(reloaded.status.status, JobStatus::Completed);
    }

    #[test]
    fn running_job_without_pages_fails() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let mut store = CrawlStore::open(root).unwrap();

        let params = CrawlParams::new(Url::parse("https://example.com/").unwrap());
        let now = time::macros::datetime!(2026-01-01 00:00:00 UTC);
        let job_dir = store.new_job(&params, now).unwrap();
        let mut manifest = store.load_manifest(&job_dir.job_id).unwrap();
        manifest.status.start(now);
        store.save_manifest(&job_dir, &manifest).unwrap();

        let fixed = fix_stuck_jobs(&mut store, now).unwrap();
        assert_eq!(fixed.len(), 1);

        let reloaded = store.load_manifest(&job_dir.job_id).unwrap();
        assert_eq!(reloaded.status.status, JobStatus::Failed);
        assert_eq!(
            reloaded.status.last_error.as_deref(),
            Some("interrupted without completing")
        );
    }
}
