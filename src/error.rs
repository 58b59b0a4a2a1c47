use std::io;
use std::str::Utf8Error;
use thiserror::Error;
use btleplug;
use serde_json;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to talk to the Blinky: {source}")]
    DeviceError { #[from] source: DeviceError },

    #[error("Failed to start application (runtime): {source}")]
    IOError { #[from] source: io::Error },
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("A required bluetooth characteristic is not available")]
    MissingCharacteristic,

    #[error("The device does not implement the LED Button Service")]
    Unsupported,

    #[error("Failed to connect after {attempts} attempt(s): {source}")]
    ConnectFailed { attempts: u32, source: Box<DeviceError> },

    #[error("{operation} took longer than {millis}ms")]
    Timeout { operation: &'static str, millis: u64 },

    #[error("The device is not ready")]
    NotReady,

    #[error("The connection was lost while it was being set up")]
    LinkLost,

    #[error("The session has been released")]
    Released,

    #[error("No matching Blinky device was found")]
    NotFound,

    #[error("Received a value of {length} byte(s), expected 1")]
    InvalidValue { length: usize },
}

impl DeviceError {
    /// Errors that will not go away by simply trying again.
    pub fn is_permanent(&self) -> bool {
        matches!(self, DeviceError::Unsupported | DeviceError::Released)
    }
}
