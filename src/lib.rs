use std::env;
use log::LevelFilter;
use crate::config::io::ConfigIO;
use crate::console::application::run_application;
use crate::console::types::Cli;
use crate::error::AppRunError;

pub mod config;
pub mod console;
pub mod device;
pub mod error;

/// Environment variable that overrides the configured log level, e.g. `BLINKY_LOG=debug`.
pub const LOG_LEVEL_ENV: &str = "BLINKY_LOG";

pub fn init_logging(level: LevelFilter) {
    let level = env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(level);

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        match fern::log_file(&log_file) {
            Ok(file) => dispatch = dispatch.chain(file),
            Err(err) => eprintln!("Failed to open LOG_FILE {}: {}", log_file, err),
        }
    }

    if let Err(err) = dispatch.apply() {
        eprintln!("Failed to initialize logger: {}", err);
    }
}

pub async fn run(cli: Cli) -> Result<(), AppRunError> {
    let config_io = ConfigIO::new(cli.config.clone())?;
    let config = config_io.read().await?;

    init_logging(config.log_level_filter());
    log::info!("Using config file {}", config_io.path().to_string_lossy());

    run_application(cli, config).await
}
