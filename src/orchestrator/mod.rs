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

//! The job lifecycle: seeds the frontier, spawns the worker pool and
//! monitor, and owns the manifest (spec.md §4.6). Grounded in
//! `original_source/crawler.py::SiteCrawler` (state machine and
//! `_monitor_crawl`/`_start_workers` shape) and `atra::crawl` (splitting
//! the worker loop and the orchestrator into separate modules).

mod monitor;
mod worker;

pub use monitor::TerminationReason;
pub use worker::WorkerContext;

use crate::extract::{Extractor, LinkExtractor};
use crate::fetch::Fetcher;
use crate::frontier::Frontier;
use crate::models::{CrawlParams, JobStatus};
use crate::ratelimit::CrawlRateLimiter;
use crate::robots::RobotsAdvisor;
use crate::store::{BlobStore, CrawlStore, JobDir, Manifest, PageStore, StoreError};
use crate::url_canon::get_url_components;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Errors raised within the worker pool itself, as opposed to the narrower
/// per-module errors (`FrontierError`, `RobotsError`, ...) that the worker
/// loop mostly swallows into `mark_failure`/`mark_skipped` (spec.md §4.6
/// invariant I6).
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("could not parse {0} as a URL")]
    BadUrl(String),
}

/// External collaborators the orchestrator is handed at construction
/// time; all three are swappable (spec.md §6.4-6.5).
pub struct Collaborators {
    pub fetcher: Arc<dyn Fetcher>,
    pub extractor: Arc<dyn Extractor>,
    pub link_extractor: Arc<dyn LinkExtractor>,
    pub robots: Option<Arc<RobotsAdvisor>>,
}

/// A running job: the handle external callers use to `stop`/`pause` and
/// to learn the outcome.
pub struct JobHandle {
    job_id: String,
    job_dir: JobDir,
    ctx: Arc<WorkerContext>,
    worker_tasks: Vec<JoinHandle<()>>,
    monitor_task: JoinHandle<TerminationReason>,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn job_dir(&self) -> &JobDir {
        &self.job_dir
    }

    pub fn ctx(&self) -> &Arc<WorkerContext> {
        &self.ctx
    }

    /// Cancels the worker pool and monitor, then waits for both to
    /// unwind. Mirrors `SiteCrawler.stop`: in-flight URLs are lost, no
    /// page record is written for them, and counters are not touched.
    pub async fn cancel_and_join(self) -> TerminationReason {
        self.ctx.cancel.cancel();
        self.join_tasks().await
    }

    pub async fn join(self) -> TerminationReason {
        self.join_tasks().await
    }

    /// Races natural termination against an external pause request. On the
    /// `PauseRequested` branch `self` is left intact (the monitor task is
    /// only borrowed, never consumed) so the caller can still hand it to
    /// [`Orchestrator::pause`].
    pub async fn run_until(&mut self, pause: &tokio::sync::Notify) -> RunOutcome {
        tokio::select! {
            biased;
            _ = pause.notified() => RunOutcome::PauseRequested,
            reason = &mut self.monitor_task => {
                for task in &mut self.worker_tasks {
                    let _ = task.await;
                }
                RunOutcome::Finished(reason.unwrap_or(TerminationReason::Cancelled))
            }
        }
    }

    async fn join_tasks(self) -> TerminationReason {
        for task in self.worker_tasks {
            let _ = task.await;
        }
        self.monitor_task.await.unwrap_or(TerminationReason::Cancelled)
    }

    /// Cancels the pool without waiting, handing back everything needed
    /// to respawn against the same frontier (spec.md §4.6's `pause`:
    /// "signal workers to stop ... `resume`: respawn workers" against
    /// unfinished state).
    pub async fn into_paused(self) -> PausedJob {
        self.ctx.cancel.cancel();
        for task in self.worker_tasks {
            let _ = task.await;
        }
        let _ = self.monitor_task.await;
        PausedJob {
            job_id: self.job_id,
            job_dir: self.job_dir,
            ctx: self.ctx,
        }
    }
}

/// The result of [`JobHandle::run_until`].
pub enum RunOutcome {
    /// The job reached a terminal state on its own.
    Finished(TerminationReason),
    /// The caller's pause signal fired before the job finished; `self` in
    /// `run_until` is still valid and can be handed to `Orchestrator::pause`.
    PauseRequested,
}

/// A job whose pool has been torn down but whose frontier and stores are
/// intact, ready to be handed back to [`Orchestrator::resume`].
pub struct PausedJob {
    job_id: String,
    job_dir: JobDir,
    ctx: Arc<WorkerContext>,
}

impl PausedJob {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn job_dir(&self) -> &JobDir {
        &self.job_dir
    }
}

/// Drives one crawl job end to end: `start` seeds the frontier and spawns
/// the pool; the returned [`JobHandle`] is awaited (or cancelled) by the
/// caller, which then calls [`Orchestrator::finalize`] to close out the
/// manifest.
pub struct Orchestrator {
    store: CrawlStore,
}

impl Orchestrator {
    pub fn new(store: CrawlStore) -> Self {
        Self { store }
    }

    /// Creates a new job, seeds its frontier with the canonical seed at
    /// depth 0, and spawns `params.concurrency` workers plus a monitor.
    pub fn start(
        &mut self,
        mut params: CrawlParams,
        system: &crate::config::SystemConfig,
        collaborators: Collaborators,
    ) -> Result<JobHandle, StoreError> {
        params.clamp_to_system(system);
        crate::scope::apply_default_excludes(&mut params);

        let now = OffsetDateTime::now_utc();
        let job_dir = self.store.new_job(&params, now)?;

        let mut manifest = self.store.load_manifest(&job_dir.job_id)?;
        manifest.status.start(now);
        self.store.save_manifest(&job_dir, &manifest)?;

        let seed_components =
            get_url_components(params.seed_url.as_str(), &params.ignore_query_params)
                .expect("seed URL was already validated on submission");

        let frontier = Arc::new(Frontier::new(params.ignore_query_params.clone()));
        let _ = frontier.enqueue(params.seed_url.as_str(), 0);

        let concurrency = params.concurrency.max(1);
        let cancel = CancellationToken::new();
        let busy = (0..concurrency).map(|_| AtomicBool::new(false)).collect();

        let ctx = Arc::new(WorkerContext {
            job_id: job_dir.job_id.clone(),
            seed_components,
            frontier: frontier.clone(),
            rate_limiter: Arc::new(CrawlRateLimiter::new(
                params.rate_limit_per_domain_per_sec,
                None,
            )),
            robots: collaborators.robots,
            fetcher: collaborators.fetcher,
            extractor: collaborators.extractor,
            link_extractor: collaborators.link_extractor,
            pages: PageStore::new(job_dir.pages_dir()),
            blobs: BlobStore::new(job_dir.blobs_dir()),
            render_semaphore: Arc::new(Semaphore::new(concurrency)),
            cancel: cancel.clone(),
            busy,
            params,
        });

        let worker_tasks = (0..concurrency)
            .map(|id| {
                let ctx = ctx.clone();
                tokio::spawn(async move { worker::run_worker(ctx, id).await })
            })
            .collect();

        let monitor_ctx = ctx.clone();
        let max_duration = monitor_ctx.params.max_duration_sec;
        let max_pages = monitor_ctx.params.max_pages;
        let monitor_task = tokio::spawn(async move {
            monitor::run_monitor(monitor_ctx, now, max_duration, max_pages).await
        });

        log::info!(
            "job {} started with {concurrency} workers, seed {}",
            job_dir.job_id,
            ctx.params.seed_url
        );

        Ok(JobHandle {
            job_id: job_dir.job_id.clone(),
            job_dir,
            ctx,
            worker_tasks,
            monitor_task,
        })
    }

    /// Writes the job's final status and stats after a [`JobHandle`] has
    /// been joined or cancelled (spec.md §4.6's terminal transitions).
    pub fn finalize(
        &mut self,
        job_dir: &JobDir,
        ctx: &WorkerContext,
        reason: TerminationReason,
    ) -> Result<(), StoreError> {
        let mut manifest = self.store.load_manifest(&job_dir.job_id)?;
        manifest.status.stats = ctx.frontier.stats();
        let now = OffsetDateTime::now_utc();
        manifest.status.finish(reason.status(), now);
        self.store.save_manifest(job_dir, &manifest)
    }

    /// Mirrors stats into the manifest without closing out the job;
    /// called by external callers on a timer while a job runs (spec.md
    /// §4.7: "Manifest writes ... periodic ... plus on every state
    /// transition").
    pub fn checkpoint(&mut self, job_dir: &JobDir, ctx: &WorkerContext) -> Result<(), StoreError> {
        let mut manifest = self.store.load_manifest(&job_dir.job_id)?;
        manifest.status.stats = ctx.frontier.stats();
        self.store.save_manifest(job_dir, &manifest)
    }

    /// Tears down the worker pool and marks the job paused. The returned
    /// [`PausedJob`] keeps the frontier and stores alive for `resume`.
    pub async fn pause(&mut self, handle: JobHandle) -> Result<PausedJob, StoreError> {
        let job_dir = handle.job_dir.clone();
        let paused = handle.into_paused().await;

        let mut manifest = self.store.load_manifest(&job_dir.job_id)?;
        manifest.status.stats = paused.ctx.frontier.stats();
        manifest.status.pause();
        self.store.save_manifest(&job_dir, &manifest)?;
        Ok(paused)
    }

    /// Respawns a fresh worker pool and monitor against a paused job's
    /// still-populated frontier (spec.md §4.6's `resume`).
    pub fn resume(&mut self, paused: PausedJob) -> Result<JobHandle, StoreError> {
        let PausedJob { job_id, job_dir, ctx } = paused;

        let mut manifest = self.store.load_manifest(&job_id)?;
        manifest.status.resume();
        self.store.save_manifest(&job_dir, &manifest)?;

        let concurrency = ctx.params.concurrency.max(1);
        let cancel = CancellationToken::new();
        let busy = (0..concurrency).map(|_| AtomicBool::new(false)).collect();

        let ctx = Arc::new(WorkerContext {
            job_id: ctx.job_id.clone(),
            params: ctx.params.clone(),
            seed_components: ctx.seed_components.clone(),
            frontier: ctx.frontier.clone(),
            rate_limiter: ctx.rate_limiter.clone(),
            robots: ctx.robots.clone(),
            fetcher: ctx.fetcher.clone(),
            extractor: ctx.extractor.clone(),
            link_extractor: ctx.link_extractor.clone(),
            pages: ctx.pages.clone(),
            blobs: ctx.blobs.clone(),
            render_semaphore: Arc::new(Semaphore::new(concurrency)),
            cancel: cancel.clone(),
            busy,
        });

        let worker_tasks = (0..concurrency)
            .map(|id| {
                let ctx = ctx.clone();
                tokio::spawn(async move { worker::run_worker(ctx, id).await })
            })
            .collect();

        let started_at = manifest.status.started_at.unwrap_or_else(OffsetDateTime::now_utc);
        let monitor_ctx = ctx.clone();
        let max_duration = monitor_ctx.params.max_duration_sec;
        let max_pages = monitor_ctx.params.max_pages;
        let monitor_task = tokio::spawn(async move {
            monitor::run_monitor(monitor_ctx, started_at, max_duration, max_pages).await
        });

        log::info!("job {job_id} resumed with {concurrency} workers");

        Ok(JobHandle {
            job_id,
            job_dir,
            ctx,
            worker_tasks,
            monitor_task,
        })
    }

    /// Finalizes a paused job as stopped, without respawning a pool
    /// (the user declined to resume). The paused job's pool is already
    /// down, so this is just a manifest transition.
    pub fn stop_paused(&mut self, paused: PausedJob) -> Result<(), StoreError> {
        let mut manifest = self.store.load_manifest(&paused.job_id)?;
        manifest.status.stats = paused.ctx.frontier.stats();
        manifest
            .status
            .finish(JobStatus::Stopped, OffsetDateTime::now_utc());
        self.store.save_manifest(&paused.job_dir, &manifest)
    }

    pub fn store_mut(&mut self) -> &mut CrawlStore {
        &mut self.store
    }
}

/// Returns the job's current status, refreshed from disk (used by `GET
/// /crawl/{job_id}`, spec.md §6.1).
pub fn job_status(manifest: &Manifest) -> JobStatus {
    manifest.status.status
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::SystemConfig;
    use crate::extract::{ExtractError, ExtractedLink, ExtractedPage};
    use crate::fetch::{FetchError, FetchedBody, HeadInfo};
    use crate::models::ArticleResult;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream::BoxStream;
    use std::time::Duration;
    use url::Url;

    struct NoLinksFetcher;

    #[async_trait]
    impl Fetcher for NoLinksFetcher {
        async fn head(&self, url: &Url, _timeout: Duration) -> Result<HeadInfo, FetchError> {
            Ok(HeadInfo {
                status: 200,
                content_type: Some("text/html".to_string()),
                content_length: None,
                final_url: url.clone(),
            })
        }

        async fn get_text(&self, url: &Url, _timeout: Duration) -> Result<FetchedBody, FetchError> {
            Ok(FetchedBody {
                status: 200,
                final_url: url.clone(),
                body: String::new(),
            })
        }

        async fn stream_get(
            &self,
            _url: &Url,
            _timeout: Duration,
        ) -> Result<(HeadInfo, BoxStream<'static, Result<Bytes, FetchError>>), FetchError> {
            unimplemented!("no assets in this test")
        }
    }

    struct NoLinksExtractor;

    #[async_trait]
    impl Extractor for NoLinksExtractor {
        async fn extract_page(
            &self,
            url: &Url,
            _render: &crate::models::RenderOptions,
        ) -> Result<ExtractedPage, ExtractError> {
            Ok(ExtractedPage {
                final_url: url.clone(),
                article: ArticleResult::default(),
            })
        }
    }

    #[async_trait]
    impl LinkExtractor for NoLinksExtractor {
        async fn extract_links(
            &self,
            _url: &Url,
            _render: &crate::models::RenderOptions,
        ) -> Result<Vec<ExtractedLink>, ExtractError> {
            Ok(Vec::new())
        }
    }

    fn collaborators() -> Collaborators {
        Collaborators {
            fetcher: Arc::new(NoLinksFetcher),
            extractor: Arc::new(NoLinksExtractor),
            link_extractor: Arc::new(NoLinksExtractor),
            robots: None,
        }
    }

    #[tokio::test]
    async fn single_page_job_drains_frontier_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let root = camino::Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let store = CrawlStore::open(root).unwrap();
        let mut orchestrator = Orchestrator::new(store);

        let params = CrawlParams::new(Url::parse("https://example.com/").unwrap());
        let handle = orchestrator
            .start(params, &SystemConfig::default(), collaborators())
            .unwrap();

        let job_dir = handle.job_dir().clone();
        let ctx = handle.ctx().clone();
        let reason = handle.join().await;

        assert_eq!(reason, TerminationReason::FrontierDrained);
        orchestrator.finalize(&job_dir, &ctx, reason).unwrap();

        let manifest = orchestrator.store_mut().load_manifest(&job_dir.job_id).unwrap();
        assert_eq!(manifest.status.status, JobStatus::Completed);
        assert_eq!(manifest.status.stats.ok, 1);
    }

    /// A fetcher/extractor pair whose pages form a chain
    /// `page/0 -> page/1 -> ... -> page/{n-1}`, one outlink per page. A
    /// short sleep on extraction gives a concurrent pause signal a window
    /// to land before the chain drains.
    struct ChainFetcher;

    #[async_trait]
    impl Fetcher for ChainFetcher {
        async fn head(&self, url: &Url, _timeout: Duration) -> Result<HeadInfo, FetchError> {
            Ok(HeadInfo {
                status: 200,
                content_type: Some("text/html".to_string()),
                content_length: None,
                final_url: url.clone(),
            })
        }

        async fn get_text(&self, url: &Url, _timeout: Duration) -> Result<FetchedBody, FetchError> {
            Ok(FetchedBody {
                status: 200,
                final_url: url.clone(),
                body: String::new(),
            })
        }

        async fn stream_get(
            &self,
            _url: &Url,
            _timeout: Duration,
        ) -> Result<(HeadInfo, BoxStream<'static, Result<Bytes, FetchError>>), FetchError> {
            unimplemented!("no assets in this test")
        }
    }

    struct ChainExtractor {
        chain_len: u32,
    }

    fn next_in_chain(url: &Url, chain_len: u32) -> Option<Url> {
        let n: u32 = url.path_segments()?.last()?.parse().ok()?;
        if n + 1 < chain_len {
            Some(url.join(&format!("/page/{}", n + 1)).unwrap())
        } else {
            None
        }
    }

    #[async_trait]
    impl Extractor for ChainExtractor {
        async fn extract_page(
            &self,
            url: &Url,
            _render: &crate::models::RenderOptions,
        ) -> Result<ExtractedPage, ExtractError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(ExtractedPage {
                final_url: url.clone(),
                article: ArticleResult::default(),
            })
        }
    }

    #[async_trait]
    impl LinkExtractor for ChainExtractor {
        async fn extract_links(
            &self,
            url: &Url,
            _render: &crate::models::RenderOptions,
        ) -> Result<Vec<ExtractedLink>, ExtractError> {
            Ok(next_in_chain(url, self.chain_len)
                .into_iter()
                .map(|url| ExtractedLink {
                    url: url.to_string(),
                    text: String::new(),
                    nofollow: false,
                })
                .collect())
        }
    }

    fn chain_collaborators(chain_len: u32) -> Collaborators {
        Collaborators {
            fetcher: Arc::new(ChainFetcher),
            extractor: Arc::new(ChainExtractor { chain_len }),
            link_extractor: Arc::new(ChainExtractor { chain_len }),
            robots: None,
        }
    }

    #[tokio::test]
    async fn pause_then_resume_drains_remaining_frontier() {
        const CHAIN_LEN: u32 = 6;

        let dir = tempfile::tempdir().unwrap();
        let root = camino::Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let store = CrawlStore::open(root).unwrap();
        let mut orchestrator = Orchestrator::new(store);

        let mut params = CrawlParams::new(Url::parse("https://example.com/page/0").unwrap());
        params.max_depth = CHAIN_LEN;
        params.max_pages = CHAIN_LEN as u64;
        params.concurrency = 1;

        let mut handle = orchestrator
            .start(params, &SystemConfig::default(), chain_collaborators(CHAIN_LEN))
            .unwrap();
        let job_id = handle.job_id().to_string();

        let pause_requested = Arc::new(tokio::sync::Notify::new());
        {
            let pause_requested = pause_requested.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                pause_requested.notify_one();
            });
        }

        let outcome = handle.run_until(&pause_requested).await;
        assert!(matches!(outcome, RunOutcome::PauseRequested));

        let paused = orchestrator.pause(handle).await.unwrap();
        let manifest = orchestrator.store_mut().load_manifest(&job_id).unwrap();
        assert_eq!(manifest.status.status, JobStatus::Paused);
        assert!(
            manifest.status.stats.visited < CHAIN_LEN as u64,
            "test sleep should pause before the whole chain drains"
        );

        let handle = orchestrator.resume(paused).unwrap();
        let job_dir = handle.job_dir().clone();
        let ctx = handle.ctx().clone();
        let reason = handle.join().await;
        orchestrator.finalize(&job_dir, &ctx, reason).unwrap();

        let manifest = orchestrator.store_mut().load_manifest(&job_id).unwrap();
        assert_eq!(manifest.status.status, JobStatus::Completed);
        assert_eq!(manifest.status.stats.ok, CHAIN_LEN as u64);

        let pages = PageStore::new(job_dir.pages_dir());
        assert_eq!(pages.count() as u64, manifest.status.stats.ok);
    }

    #[tokio::test]
    async fn stop_transitions_to_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let root = camino::Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let store = CrawlStore::open(root).unwrap();
        let mut orchestrator = Orchestrator::new(store);

        let mut params = CrawlParams::new(Url::parse("https://example.com/").unwrap());
        params.max_duration_sec = 3600;
        let handle = orchestrator
            .start(params, &SystemConfig::default(), collaborators())
            .unwrap();

        let job_dir = handle.job_dir().clone();
        let ctx = handle.ctx().clone();
        let reason = handle.cancel_and_join().await;

        orchestrator.finalize(&job_dir, &ctx, reason).unwrap();
        let manifest = orchestrator.store_mut().load_manifest(&job_dir.job_id).unwrap();
        assert_eq!(manifest.status.status, JobStatus::Stopped);
    }
}
