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

//! A thin `clap`-derived driver over the orchestrator/store (spec.md §2.4),
//! in the shape of `atra::args::AtraArgs`/`exec_args`: parse, build a
//! `Configs`, dispatch to one subcommand, print to stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use webcrawl_core::config::Configs;
use webcrawl_core::fetch::Fetcher;
use webcrawl_core::models::CrawlParams;
use webcrawl_core::orchestrator::{Collaborators, Orchestrator, RunOutcome};
use webcrawl_core::store::CrawlStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "Recursive web crawler", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Starts a new crawl job from a seed URL and runs it to completion.
    Crawl {
        seed_url: String,
        #[arg(long)]
        max_depth: Option<u32>,
        #[arg(long)]
        max_pages: Option<u64>,
        #[arg(long)]
        max_duration_sec: Option<u64>,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        capture_assets: bool,
        #[arg(long)]
        no_robots: bool,
    },
    /// Reconciles a job left `running` by a crashed process (no live
    /// worker pool to resume). A graceful pause/resume cycle, by
    /// contrast, happens within a single `crawl` invocation via ctrl-c;
    /// see `Command::Crawl`.
    Resume { job_id: String },
    /// Lists known jobs, most recently modified first.
    ListJobs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Shows one job's manifest and stats.
    ShowJob { job_id: String },
    /// Writes `results.jsonl` and `results.zip` for a completed job.
    Export { job_id: String },
}

pub async fn run(args: CliArgs) -> Result<()> {
    let configs = Configs::discover_or_default();
    webcrawl_core::config::configure_logging(&configs).context("failed to configure logging")?;

    let mut store = CrawlStore::open(configs.paths.crawls_root())
        .context("failed to open the crawl store")?;

    match args.command {
        Command::Crawl {
            seed_url,
            max_depth,
            max_pages,
            max_duration_sec,
            concurrency,
            capture_assets,
            no_robots,
        } => {
            let seed = url::Url::parse(&seed_url).context("seed URL did not parse")?;
            let mut params = CrawlParams::new(seed);
            if let Some(v) = max_depth {
                params.max_depth = v;
            }
            if let Some(v) = max_pages {
                params.max_pages = v;
            }
            if let Some(v) = max_duration_sec {
                params.max_duration_sec = v;
            }
            if let Some(v) = concurrency {
                params.concurrency = v;
            }
            params.capture_assets = capture_assets;
            params.respect_robots = !no_robots;

            let scope_errors = webcrawl_core::scope::validate_scope_config(&params);
            if !scope_errors.is_empty() {
                anyhow::bail!("invalid scope configuration: {}", scope_errors.join("; "));
            }

            let robots = if params.respect_robots {
                Some(std::sync::Arc::new(webcrawl_core::robots::RobotsAdvisor::new(
                    configs.paths.robots_cache_dir(),
                    "webcrawl",
                )))
            } else {
                None
            };
            let fetcher = std::sync::Arc::new(webcrawl_core::fetch::ReqwestFetcher::new());
            let collaborators = Collaborators {
                fetcher,
                extractor: std::sync::Arc::new(PlainTextExtractor),
                link_extractor: std::sync::Arc::new(PlainTextExtractor),
                robots,
            };

            let mut orchestrator = Orchestrator::new(store);
            let mut handle = orchestrator.start(params, &configs.system, collaborators)?;
            let job_id = handle.job_id().to_string();
            println!("started job {job_id} (ctrl-c pauses it; resume or stop it from the prompt)");

            let pause_requested = Arc::new(tokio::sync::Notify::new());
            {
                let pause_requested = pause_requested.clone();
                tokio::spawn(async move {
                    while tokio::signal::ctrl_c().await.is_ok() {
                        pause_requested.notify_one();
                    }
                });
            }

            let reason = loop {
                match handle.run_until(&pause_requested).await {
                    RunOutcome::Finished(reason) => break reason,
                    RunOutcome::PauseRequested => {
                        let paused = orchestrator.pause(handle).await?;
                        let manifest = orchestrator.store_mut().load_manifest(&job_id)?;
                        println!(
                            "job {job_id} paused at {} pages; type `resume` or `stop`:",
                            manifest.status.stats.visited
                        );

                        let line = tokio::task::spawn_blocking(|| {
                            let mut line = String::new();
                            std::io::stdin().read_line(&mut line).map(|_| line)
                        })
                        .await
                        .context("failed to join stdin reader task")?
                        .context("failed to read from stdin")?;

                        if line.trim().eq_ignore_ascii_case("stop") {
                            orchestrator.stop_paused(paused)?;
                            println!("job {job_id} stopped while paused");
                            return Ok(());
                        }

                        println!("resuming job {job_id}");
                        handle = orchestrator.resume(paused)?;
                    }
                }
            };

            let job_dir = handle.job_dir().clone();
            let ctx = handle.ctx().clone();
            orchestrator.finalize(&job_dir, &ctx, reason)?;
            println!("job {job_id} finished: {reason:?}");
        }

        Command::Resume { job_id } => {
            let fixed = webcrawl_core::store::fix_stuck_jobs(&mut store, now())?;
            if fixed.contains(&job_id) {
                println!("job {job_id} had no worker pool running; marked terminal during reconciliation");
            } else {
                println!("job {job_id} is not paused/running, nothing to resume");
            }
        }

        Command::ListJobs { limit, offset } => {
            let jobs = store.list_jobs(limit, offset)?;
            for manifest in jobs {
                let seed = webcrawl_core::url_canon::get_url_components(
                    manifest.params.seed_url.as_str(),
                    &manifest.params.ignore_query_params,
                )?;
                println!(
                    "{}  {:?}  ok={} failed={} visited={}  [{}]",
                    manifest.job_id,
                    manifest.status.status,
                    manifest.status.stats.ok,
                    manifest.status.stats.failed,
                    manifest.status.stats.visited,
                    webcrawl_core::scope::get_scope_description(&manifest.params, &seed)
                );
            }
        }

        Command::ShowJob { job_id } => {
            let manifest = store.load_manifest(&job_id)?;
            let seed = webcrawl_core::url_canon::get_url_components(
                manifest.params.seed_url.as_str(),
                &manifest.params.ignore_query_params,
            )?;
            println!(
                "scope: {}",
                webcrawl_core::scope::get_scope_description(&manifest.params, &seed)
            );
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }

        Command::Export { job_id } => {
            let job_dir = store.job_dir(&job_id)?;
            let manifest = store.load_manifest(&job_id)?;
            webcrawl_core::store::export_jsonl(&job_dir)?;
            webcrawl_core::store::export_zip(&job_dir, &manifest)?;
            println!("exported job {job_id} to {}", job_dir.exports_dir());
        }
    }

    Ok(())
}

fn now() -> time::OffsetDateTime {
    time::OffsetDateTime::now_utc()
}

/// A minimal, non-rendering `Extractor`/`LinkExtractor` used when the CLI is
/// run without a configured renderer: fetches the page as plain text and
/// scrapes anchors, rather than executing JavaScript (spec.md §6.4 treats
/// the renderer as an external collaborator; this is the CLI's default).
struct PlainTextExtractor;

#[async_trait::async_trait]
impl webcrawl_core::extract::Extractor for PlainTextExtractor {
    async fn extract_page(
        &self,
        url: &url::Url,
        _render: &webcrawl_core::models::RenderOptions,
    ) -> Result<webcrawl_core::extract::ExtractedPage, webcrawl_core::extract::ExtractError> {
        let fetcher = webcrawl_core::fetch::ReqwestFetcher::new();
        let body = fetcher
            .get_text(url, std::time::Duration::from_secs(20))
            .await
            .map_err(|e| webcrawl_core::extract::ExtractError::Failed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let mut article = webcrawl_core::models::ArticleResult::default();
        article.full_content = Some(body.body);
        Ok(webcrawl_core::extract::ExtractedPage {
            final_url: body.final_url,
            article,
        })
    }
}

#[async_trait::async_trait]
impl webcrawl_core::extract::LinkExtractor for PlainTextExtractor {
    async fn extract_links(
        &self,
        url: &url::Url,
        render: &webcrawl_core::models::RenderOptions,
    ) -> Result<Vec<webcrawl_core::extract::ExtractedLink>, webcrawl_core::extract::ExtractError>
    {
        let page = self.extract_page(url, render).await?;
        let Some(html) = page.article.full_content else {
            return Ok(Vec::new());
        };
        Ok(webcrawl_core::extract::scrape_anchor_links(
            &html,
            &page.final_url,
        ))
    }
}
