use std::io::Write;
use std::str::FromStr;

use chrono::Local;
use log::{LevelFilter, SetLoggerError};

use crate::config::LogConfig;

/// Level from the configuration, `Info` when it does not name one
pub fn parse_level(level: &str) -> LevelFilter {
    LevelFilter::from_str(level.trim()).unwrap_or(LevelFilter::Info)
}

/// Install env_logger. `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &LogConfig) -> Result<(), SetLoggerError> {
    env_logger::Builder::new()
        .filter_level(parse_level(&config.level))
        .parse_env("RUST_LOG")
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()
}
