use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// System-level ceilings, read from the `CRAWL_*` / `USER_DATA_DIR`
/// environment variables (spec.md §6.2). These bound every per-job
/// `CrawlParams` — a job may only request a value at least as strict as
/// the ceiling, never looser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename(serialize = "System"))]
pub struct SystemConfig {
    /// Hard ceiling on `CrawlParams::concurrency`.
    #[serde(default = "_default_max_concurrency")]
    pub max_concurrency: usize,

    /// Default per-domain rate applied when a job doesn't request a
    /// stricter one.
    #[serde(default = "_default_rate_per_domain")]
    pub default_rate_per_domain: f64,

    /// Hard ceiling on `CrawlParams::max_pages`.
    #[serde(default = "_default_hard_page_limit")]
    pub hard_page_limit: u64,

    /// Hard ceiling on `CrawlParams::max_duration_sec`.
    #[serde(default = "_default_hard_duration_sec")]
    pub hard_duration_sec: u64,

    /// Whether asset capture is permitted at all, regardless of what a job
    /// requests.
    #[serde(default = "_default_enable_asset_capture")]
    pub enable_asset_capture: bool,

    /// The log level of the crawler.
    #[serde(default = "_default_log_level")]
    pub log_level: log::LevelFilter,

    /// Log to a file instead of the console.
    #[serde(default)]
    pub log_to_file: bool,
}

const fn _default_max_concurrency() -> usize {
    8
}
const fn _default_rate_per_domain() -> f64 {
    1.0
}
const fn _default_hard_page_limit() -> u64 {
    50_000
}
const fn _default_hard_duration_sec() -> u64 {
    6 * 3600
}
const fn _default_enable_asset_capture() -> bool {
    true
}
const fn _default_log_level() -> log::LevelFilter {
    log::LevelFilter::Info
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            max_concurrency: _default_max_concurrency(),
            default_rate_per_domain: _default_rate_per_domain(),
            hard_page_limit: _default_hard_page_limit(),
            hard_duration_sec: _default_hard_duration_sec(),
            enable_asset_capture: _default_enable_asset_capture(),
            log_level: _default_log_level(),
            log_to_file: false,
        }
    }
}

impl SystemConfig {
    /// Applies environment overrides. `config::Environment` already does
    /// this when layered into `Configs::load_from`; this is used by the CLI
    /// for the one variable (`USER_DATA_DIR`) that belongs to `PathsConfig`
    /// rather than `SystemConfig` and therefore can't share the `CRAWL_`
    /// prefix.
    pub fn clamp_concurrency(&self, requested: usize) -> usize {
        requested.min(self.max_concurrency)
    }

    pub fn clamp_max_pages(&self, requested: u64) -> u64 {
        requested.min(self.hard_page_limit)
    }

    pub fn clamp_max_duration_sec(&self, requested: u64) -> u64 {
        requested.min(self.hard_duration_sec)
    }

    pub fn clamp_rate_per_domain(&self, requested: f64) -> f64 {
        // The system default acts as a ceiling: a job may ask for a slower
        // (stricter) rate but never a faster one.
        requested.min(self.default_rate_per_domain)
    }
}

/// Where job data is persisted, defaulting to `${USER_DATA_DIR}/crawls`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename(serialize = "Paths"))]
pub struct PathsConfig {
    #[serde(default = "_default_user_data_dir")]
    pub user_data_dir: Utf8PathBuf,
}

fn _default_user_data_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("./user_data")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            user_data_dir: _default_user_data_dir(),
        }
    }
}

impl PathsConfig {
    pub fn crawls_root(&self) -> Utf8PathBuf {
        self.user_data_dir.join("crawls")
    }

    pub fn robots_cache_dir(&self) -> Utf8PathBuf {
        self.user_data_dir.join("_robots_cache")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clamps_tighten_never_loosen() {
        let sys = SystemConfig {
            max_concurrency: 4,
            ..Default::default()
        };
        assert_eq!(sys.clamp_concurrency(16), 4);
        assert_eq!(sys.clamp_concurrency(2), 2);
    }
}
