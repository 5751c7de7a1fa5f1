//! Logging setup, mirroring `atra::app::logging::configure_logging`: a
//! console appender plus an optional rolling file appender, wired through
//! `log4rs` so every module can just use the `log` facade macros.

use super::Configs;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config as LogConfig, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

const PATTERN: &str = "{l}@Thread{I} - {d} - {m}{n}";

/// Initializes the global logger from `configs.system`. Safe to call once
/// per process; a second call returns an error from `log4rs::init_config`
/// that callers (the CLI entry point) may ignore in tests.
pub fn configure_logging(configs: &Configs) -> Result<(), anyhow::Error> {
    let encoder = Box::new(PatternEncoder::new(PATTERN));

    let mut builder = LogConfig::builder();
    let mut root_appenders = vec![];

    if configs.system.log_to_file {
        let file = FileAppender::builder()
            .encoder(encoder)
            .build(configs.paths.user_data_dir.join("crawl.log"))?;
        builder = builder.appender(Appender::builder().build("file", Box::new(file)));
        root_appenders.push("file");
    } else {
        let console = ConsoleAppender::builder().encoder(encoder).build();
        builder = builder.appender(Appender::builder().build("console", Box::new(console)));
        root_appenders.push("console");
    }

    let config = builder
        .logger(Logger::builder().build("webcrawl_core", configs.system.log_level))
        .build(Root::builder().appenders(root_appenders).build(configs.system.log_level))?;

    log4rs::init_config(config)?;
    Ok(())
}
