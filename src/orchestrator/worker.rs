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

//! The per-URL worker loop (spec.md §4.6). Mirrors
//! `original_source/crawler.py::CrawlWorker._process_url` step for step:
//! robots → rate limit → content-type → extract → links → assets →
//! persist. Only extraction failures and successes produce a page
//! record; robots/content-type skips and rate-limit timeouts do not
//! (invariant I6).

use crate::extract::{scrape_anchor_links, scrape_assets, scrape_canonical_link, Extractor, LinkExtractor};
use crate::fetch::Fetcher;
use crate::models::{CrawlParams, PageRecord};
use crate::ratelimit::CrawlRateLimiter;
use crate::robots::RobotsAdvisor;
use crate::scope::{is_asset_type_allowed, is_content_type_allowed, should_follow_link};
use crate::store::{BlobStore, PageStore};
use crate::url_canon::{canonicalize, get_url_components, UrlComponents};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;

const RATE_LIMIT_TIMEOUT: Duration = Duration::from_secs(30);
const CONTENT_TYPE_HEAD_TIMEOUT: Duration = Duration::from_secs(10);
const ASSET_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a worker needs, shared read-only (or behind its own
/// synchronization) across the whole worker pool for one job.
pub struct WorkerContext {
    pub job_id: String,
    pub params: CrawlParams,
    pub seed_components: UrlComponents,
    pub frontier: Arc<crate::frontier::Frontier>,
    pub rate_limiter: Arc<CrawlRateLimiter>,
    pub robots: Option<Arc<RobotsAdvisor>>,
    pub fetcher: Arc<dyn Fetcher>,
    pub extractor: Arc<dyn Extractor>,
    pub link_extractor: Arc<dyn LinkExtractor>,
    pub pages: PageStore,
    pub blobs: BlobStore,
    pub render_semaphore: Arc<Semaphore>,
    pub cancel: CancellationToken,
    /// Flipped while a worker has a URL checked out; the monitor reads
    /// this to decide whether the pool is idle.
    pub busy: Vec<AtomicBool>,
}

/// Runs until the frontier reports cancellation.
pub async fn run_worker(ctx: Arc<WorkerContext>, worker_id: usize) {
    log::info!("worker {worker_id} starting for job {}", ctx.job_id);

    loop {
        let Some((url, depth)) = ctx.frontier.dequeue(&ctx.cancel).await else {
            break;
        };
        ctx.busy[worker_id].store(true, Ordering::SeqCst);

        if let Err(e) = process_url(&ctx, &url, depth).await {
            log::error!("worker {worker_id} error processing {url}: {e}");
            ctx.frontier.mark_failure(&url, &e.to_string());
        }

        ctx.busy[worker_id].store(false, Ordering::SeqCst);
    }

    log::info!("worker {worker_id} stopped for job {}", ctx.job_id);
}

async fn process_url(
    ctx: &WorkerContext,
    url: &str,
    depth: u32,
) -> Result<(), crate::orchestrator::OrchestratorError> {
    let parsed = Url::parse(url)
        .map_err(|_| crate::orchestrator::OrchestratorError::BadUrl(url.to_string()))?;

    // Step 1: robots.
    if ctx.params.respect_robots {
        if let Some(robots) = &ctx.robots {
            match robots.can_fetch(&parsed, ctx.fetcher.as_ref(), None).await {
                Ok(false) => {
                    ctx.frontier.mark_skipped("robots.txt disallowed");
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("robots.txt unparseable for {url}, allowing by default: {e}");
                }
                Ok(true) => {}
            }
        }
    }

    // Step 2: rate limit.
    if !ctx
        .rate_limiter
        .wait_for_permission(&parsed, RATE_LIMIT_TIMEOUT)
        .await
    {
        ctx.frontier.mark_failure(url, "rate limit timeout");
        return Ok(());
    }

    // Step 3: content-type via HEAD.
    let (content_type, head_status) = match ctx.fetcher.head(&parsed, CONTENT_TYPE_HEAD_TIMEOUT).await {
        Ok(info) => (info.content_type.unwrap_or_default(), Some(info.status)),
        Err(e) => {
            ctx.frontier
                .mark_skipped(&format!("HEAD request failed: {e}"));
            return Ok(());
        }
    };
    if !is_content_type_allowed(&content_type, &ctx.params.content_types) {
        ctx.frontier
            .mark_skipped(&format!("content-type {content_type} not allowed"));
        return Ok(());
    }

    // Step 4: extraction.
    let _permit = ctx
        .render_semaphore
        .acquire()
        .await
        .expect("render semaphore is never closed");
    let extracted = match ctx.extractor.extract_page(&parsed, &ctx.params.render).await {
        Ok(page) => page,
        Err(e) => {
            let record = PageRecord::failed(
                &ctx.job_id,
                url.to_string(),
                depth,
                0,
                format!("extraction failed: {e}"),
                OffsetDateTime::now_utc(),
            );
            let _ = ctx.pages.save(&record);
            ctx.frontier.mark_failure(url, "extraction failed");
            return Ok(());
        }
    };
    drop(_permit);

    // Step 5: link discovery, falling back to an HTML scrape.
    let mut links = Vec::new();
    if depth < ctx.params.max_depth {
        links = ctx
            .link_extractor
            .extract_links(&parsed, &ctx.params.render)
            .await
            .unwrap_or_default();

        if links.is_empty() {
            if let Some(full_content) = &extracted.article.full_content {
                links = scrape_anchor_links(full_content, &extracted.final_url)
                    .into_iter()
                    .map(|link| crate::extract::ExtractedLink {
                        url: link.url,
                        text: link.text,
                        nofollow: link.nofollow,
                    })
                    .collect();
            }
        }
    }

    // Step 6: filter and enqueue.
    for link in &links {
        let Ok(canonical) = canonicalize(&link.url, None, &ctx.params.ignore_query_params) else {
            continue;
        };
        match should_follow_link(&canonical, &ctx.params, &ctx.seed_components, link.nofollow) {
            Ok(true) => {
                let _ = ctx.frontier.enqueue(&canonical, depth + 1);
            }
            _ => continue,
        }
    }

    // Step 7: optional asset capture.
    let mut assets = std::collections::HashMap::new();
    if ctx.params.capture_assets {
        if let Some(full_content) = &extracted.article.full_content {
            assets = capture_assets(ctx, full_content, &extracted.final_url).await;
        }
    }

    // Step 8: persist and mark success. Prefer the real HEAD status; only
    // fall back to 200 when extraction succeeded without one (spec.md §9).
    let status_code = head_status.unwrap_or(200);
    let canonical_url = extracted
        .article
        .full_content
        .as_deref()
        .and_then(|html| scrape_canonical_link(html, &extracted.final_url))
        .and_then(|raw| canonicalize(raw.as_str(), None, &ctx.params.ignore_query_params).ok());
    let mut record = PageRecord::ok(
        &ctx.job_id,
        url.to_string(),
        depth,
        status_code,
        extracted.article,
        OffsetDateTime::now_utc(),
    )
    .with_canonical_url(canonical_url);
    record.assets = assets;
    ctx.pages.save(&record).ok();
    ctx.frontier.mark_success(url);

    Ok(())
}

async fn capture_assets(
    ctx: &WorkerContext,
    html: &str,
    base: &Url,
) -> std::collections::HashMap<String, String> {
    let mut out = std::collections::HashMap::new();
    let max_bytes = ctx.params.max_asset_size_mb * 1024 * 1024;

    for asset in scrape_assets(html, base) {
        if !is_asset_type_allowed(asset.mime_guess.essence_str(), &ctx.params.capture_asset_types) {
            continue;
        }
        let Ok(asset_url) = Url::parse(&asset.url) else {
            continue;
        };
        match should_follow_link(&asset.url, &ctx.params, &ctx.seed_components, false) {
            Ok(true) => {}
            _ => continue,
        }

        match download_asset(ctx, &asset_url, max_bytes).await {
            Some(bytes) => {
                let extension = crate::extract::guess_extension(&asset.mime_guess);
                match ctx.blobs.put(&bytes, extension) {
                    Ok(blob) => {
                        let filename = ctx.blobs.filename_for(&blob.blob_id, extension);
                        out.insert(asset.url, filename);
                    }
                    Err(e) => log::debug!("error saving asset {}: {e}", asset_url),
                }
            }
            None => log::debug!("skipped asset {asset_url}: download failed or too large"),
        }
    }

    out
}

/// Streams an asset with a byte cap, rejecting on an over-limit
/// `content-length` header or an over-limit running total (spec.md §4.6
/// step 7).
async fn download_asset(ctx: &WorkerContext, url: &Url, max_bytes: u64) -> Option<Vec<u8>> {
    use futures::StreamExt;

    let (info, mut stream) = ctx
        .fetcher
        .stream_get(url, ASSET_DOWNLOAD_TIMEOUT)
        .await
        .ok()?;
    if let Some(len) = info.content_length {
        if len > max_bytes {
            return None;
        }
    }

    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.ok()?;
        buf.extend_from_slice(&chunk);
        if buf.len() as u64 > max_bytes {
            return None;
        }
    }
    Some(buf)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::extract::{ExtractError, ExtractedLink, ExtractedPage};
    use crate::fetch::{FetchError, FetchedBody, HeadInfo};
    use crate::frontier::Frontier;
    use crate::models::ArticleResult;
    use crate::url_canon::get_url_components;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream::BoxStream;

    struct StubFetcher;

    #[async_trait]
    impl Fetcher for StubFetcher {
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
            unimplemented!("not used in this test")
        }
    }

    struct StubExtractor;

    #[async_trait]
    impl Extractor for StubExtractor {
        async fn extract_page(
            &self,
            url: &Url,
            _render: &crate::models::RenderOptions,
        ) -> Result<ExtractedPage, ExtractError> {
            let mut article = ArticleResult::default();
            article.title = Some("Example".to_string());
            article.full_content = Some(format!(
                r#"<link rel="canonical" href="{0}/"><a href="{0}/next">next</a>"#,
                url.origin().ascii_serialization()
            ));
            Ok(ExtractedPage {
                final_url: url.clone(),
                article,
            })
        }
    }

    #[async_trait]
    impl LinkExtractor for StubExtractor {
        async fn extract_links(
            &self,
            _url: &Url,
            _render: &crate::models::RenderOptions,
        ) -> Result<Vec<ExtractedLink>, ExtractError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn worker_processes_seed_and_enqueues_discovered_link() {
        let seed = Url::parse("https://example.com/").unwrap();
        let params = CrawlParams::new(seed.clone());
        let seed_components = get_url_components(seed.as_str(), &params.ignore_query_params).unwrap();

        let frontier = Arc::new(Frontier::new(params.ignore_query_params.clone()));
        frontier.enqueue(seed.as_str(), 0).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let root = camino::Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(root.join("pages")).unwrap();
        std::fs::create_dir_all(root.join("blobs")).unwrap();

        let ctx = Arc::new(WorkerContext {
            job_id: "job1".to_string(),
            params,
            seed_components,
            frontier: frontier.clone(),
            rate_limiter: Arc::new(CrawlRateLimiter::new(100.0, None)),
            robots: None,
            fetcher: Arc::new(StubFetcher),
            extractor: Arc::new(StubExtractor),
            link_extractor: Arc::new(StubExtractor),
            pages: PageStore::new(root.join("pages")),
            blobs: BlobStore::new(root.join("blobs")),
            render_semaphore: Arc::new(Semaphore::new(4)),
            cancel: CancellationToken::new(),
            busy: vec![AtomicBool::new(false)],
        });

        let cancel_clone = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel_clone.cancel();
        });

        run_worker(ctx.clone(), 0).await;

        let stats = frontier.stats();
        assert_eq!(stats.ok, 2);
        assert_eq!(stats.enqueued, 2);

        let seed_record = ctx.pages.load(seed.as_str()).unwrap();
        assert_eq!(seed_record.canonical_url.as_deref(), Some("https://example.com/"));
    }
}
