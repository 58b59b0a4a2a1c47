use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::device::constants::SCAN_TIMEOUT;
use crate::device::types::ConnectOptions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub connect: ConnectOptions,
    pub scan_timeout_ms: u64,
    pub log_level: String,
}

impl Config {
    /// The configured log level, falling back to `Info` for values `log` does not know.
    pub fn log_level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            connect: ConnectOptions::default(),
            scan_timeout_ms: SCAN_TIMEOUT,
            log_level: String::from("info"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: Config = serde_json::from_str(r#"{"connect": {"retries": 5}}"#).unwrap();
        assert_eq!(config.connect.retries, 5);
        assert_eq!(config.connect.retry_delay_ms, 300);
        assert_eq!(config.connect.timeout_ms, 3000);
        assert_eq!(config.scan_timeout_ms, SCAN_TIMEOUT);
        assert_eq!(config.log_level_filter(), LevelFilter::Info);
    }

    #[test]
    fn uses_camel_case_keys() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["connect"]["autoConnect"], false);
        assert_eq!(json["connect"]["retryDelayMs"], 300);
        assert_eq!(json["scanTimeoutMs"], 10_000);
        assert_eq!(json["logLevel"], "info");
    }

    #[test]
    fn log_level_parsing() {
        let mut config = Config::default();
        config.log_level = "debug".into();
        assert_eq!(config.log_level_filter(), LevelFilter::Debug);
        config.log_level = "nonsense".into();
        assert_eq!(config.log_level_filter(), LevelFilter::Info);
    }
}
