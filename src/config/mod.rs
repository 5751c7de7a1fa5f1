//! Aggregate configuration, layered the way `atra::config::Configs` does:
//! a checked-in default file, an optional user file, then environment
//! variables — highest precedence last.

pub mod logging;
pub mod system;

pub use logging::configure_logging;
pub use system::{PathsConfig, SystemConfig};

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename(serialize = "Config"))]
pub struct Configs {
    pub system: SystemConfig,
    pub paths: PathsConfig,
}

impl Configs {
    /// Loads config from `./crawl.{toml,yaml,json}` (if present), a file in
    /// `folder`, and `CRAWL_*` / environment variables, in that precedence
    /// order. Falls back to defaults when no file is found.
    pub fn load_from<P: AsRef<Utf8Path>>(folder: P) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("./crawl").required(false))
            .add_source(
                config::File::with_name(folder.as_ref().join("crawl").as_str()).required(false),
            )
            .add_source(config::Environment::with_prefix("CRAWL").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Discovers config in the current directory, falling back to defaults
    /// if nothing is found or parseable.
    pub fn discover_or_default() -> Self {
        config::Config::builder()
            .add_source(config::File::with_name("./crawl").required(false))
            .add_source(config::Environment::with_prefix("CRAWL").separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let config = Configs::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Configs = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
