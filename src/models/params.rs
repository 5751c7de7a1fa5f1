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

//! `CrawlParams`: the immutable request that seeds a job, built once and
//! never mutated for the job's lifetime.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// Which URLs count as "in scope" for a job (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Domain,
    Host,
    PathPrefix,
    Custom,
}

/// Renderer readiness signal, mirrored from Playwright/Puppeteer-style
/// `wait_until` options; passed through to the renderer collaborator
/// verbatim (§6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    NetworkIdle,
    Commit,
}

impl Default for WaitUntil {
    fn default() -> Self {
        WaitUntil::DomContentLoaded
    }
}

/// Render options forwarded to the renderer collaborator for every page
/// fetched under a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderOptions {
    #[serde(default)]
    pub screenshot: bool,
    #[serde(default = "_default_true")]
    pub full_content: bool,
    #[serde(default)]
    pub wait_until: WaitUntil,
    #[serde(default = "_default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub sleep_ms: u64,
    #[serde(default = "_default_device")]
    pub device: String,
    #[serde(default)]
    pub user_scripts: Vec<String>,
    #[serde(default = "_default_true")]
    pub incognito: bool,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

fn _default_true() -> bool {
    true
}
fn _default_timeout_ms() -> u64 {
    60_000
}
fn _default_device() -> String {
    "Desktop Chrome".to_string()
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            screenshot: false,
            full_content: true,
            wait_until: WaitUntil::default(),
            timeout_ms: _default_timeout_ms(),
            sleep_ms: 0,
            device: _default_device(),
            user_scripts: Vec::new(),
            incognito: true,
            proxy: None,
            extra_headers: HashMap::new(),
        }
    }
}

/// Everything needed to drive one crawl job, built once from the incoming
/// request and then treated as read-only (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlParams {
    #[serde(with = "serde_url")]
    pub seed_url: Url,

    #[serde(default = "_default_scope")]
    pub scope: ScopeKind,
    #[serde(default)]
    pub path_prefix: Option<String>,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    #[serde(default = "_default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "_default_max_pages")]
    pub max_pages: u64,
    #[serde(default = "_default_max_duration_sec")]
    pub max_duration_sec: u64,
    #[serde(default = "_default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "_default_rate_limit")]
    pub rate_limit_per_domain_per_sec: f64,

    #[serde(default = "_default_true")]
    pub respect_robots: bool,
    #[serde(default)]
    pub follow_nofollow: bool,
    #[serde(default = "_default_true")]
    pub same_protocol_only: bool,

    #[serde(default = "_default_ignore_query_params")]
    pub ignore_query_params: Vec<String>,
    #[serde(default = "_default_content_types")]
    pub content_types: Vec<String>,

    #[serde(default)]
    pub capture_assets: bool,
    #[serde(default = "_default_asset_types")]
    pub capture_asset_types: Vec<String>,
    #[serde(default = "_default_max_asset_size_mb")]
    pub max_asset_size_mb: u64,

    #[serde(default)]
    pub render: RenderOptions,
}

mod serde_url {
    use serde::{Deserialize, Deserializer, Serializer};
    use url::Url;

    pub fn serialize<S: Serializer>(url: &Url, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(url.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Url, D::Error> {
        let raw = String::deserialize(d)?;
        Url::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn _default_scope() -> ScopeKind {
    ScopeKind::Domain
}
fn _default_max_depth() -> u32 {
    3
}
fn _default_max_pages() -> u64 {
    1000
}
fn _default_max_duration_sec() -> u64 {
    3600
}
fn _default_concurrency() -> usize {
    4
}
fn _default_rate_limit() -> f64 {
    1.0
}
fn _default_ignore_query_params() -> Vec<String> {
    vec!["utm_*".to_string(), "fbclid".to_string()]
}
fn _default_content_types() -> Vec<String> {
    vec!["text/html".to_string()]
}
fn _default_asset_types() -> Vec<String> {
    vec!["image/*".to_string(), "application/pdf".to_string()]
}
fn _default_max_asset_size_mb() -> u64 {
    20
}

impl CrawlParams {
    pub fn new(seed_url: Url) -> Self {
        Self {
            seed_url,
            scope: _default_scope(),
            path_prefix: None,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            max_depth: _default_max_depth(),
            max_pages: _default_max_pages(),
            max_duration_sec: _default_max_duration_sec(),
            concurrency: _default_concurrency(),
            rate_limit_per_domain_per_sec: _default_rate_limit(),
            respect_robots: true,
            follow_nofollow: false,
            same_protocol_only: true,
            ignore_query_params: _default_ignore_query_params(),
            content_types: _default_content_types(),
            capture_assets: false,
            capture_asset_types: _default_asset_types(),
            max_asset_size_mb: _default_max_asset_size_mb(),
            render: RenderOptions::default(),
        }
    }

    /// Clamps this job's request against system ceilings (spec.md §6.2).
    /// System values only ever tighten, never loosen, the request.
    pub fn clamp_to_system(&mut self, system: &crate::config::SystemConfig) {
        self.concurrency = system.clamp_concurrency(self.concurrency);
        self.max_pages = system.clamp_max_pages(self.max_pages);
        self.max_duration_sec = system.clamp_max_duration_sec(self.max_duration_sec);
        self.rate_limit_per_domain_per_sec =
            system.clamp_rate_per_domain(self.rate_limit_per_domain_per_sec);
        if !system.enable_asset_capture {
            self.capture_assets = false;
        }
    }
}
