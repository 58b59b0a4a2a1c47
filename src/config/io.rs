use std::env::current_exe;
use std::path::{Path, PathBuf};
use std::str;
use directories_next::ProjectDirs;
use tokio::fs;
use serde_json;

use crate::config::types::Config;
use crate::error::ConfigError;

// creates a path to blinky.json next to the executable ("portable" mode)
fn get_portable_config_path() -> Option<PathBuf> {
    match current_exe() {
        Ok(mut path) => {
            // /opt/blinky/blinky => /opt/blinky/blinky.json
            if !path.set_extension("json") {
                eprintln!("current exe has no filename: {}", path.to_string_lossy());
                return None
            }

            Some(path)
        },
        Err(err) => {
            eprintln!("failed to get current exe path: {:?}", err);
            None
        },
    }
}

// creates a path to blinky.json in an os dependent standard directory, such as ~/.config on linux
fn get_local_config_path() -> Option<PathBuf> {
    ProjectDirs::from("no", "nordicsemi", "blinky").map(|dirs| {
        dirs.config_dir().join("blinky.json")
    })
}

fn get_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = get_portable_config_path() {
        if let Ok(attr) = std::fs::metadata(&path) {
            if attr.is_file() {
                return Ok(path);
            }
        }
    }

    match get_local_config_path() {
        None => Err(ConfigError::NoConfigPath),
        Some(path) => Ok(path),
    }
}

#[derive(Debug, Clone)]
pub struct ConfigIO {
    path: PathBuf,
}

impl ConfigIO {
    pub fn new(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path,
            None => get_config_path()?,
        };

        Ok(ConfigIO { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the config file. A missing or empty file yields the default config.
    pub async fn read(&self) -> Result<Config, ConfigError> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(source) => {
                let err = ConfigError::from(source);
                if err.is_file_not_found_error() {
                    return Ok(Config::default());
                }
                return Err(err);
            },
        };

        if content.is_empty() {
            return Ok(Config::default());
        }

        let content = str::from_utf8(&content)?;
        Ok(serde_json::from_str(content)?)
    }

    pub async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        if let Some(directory) = self.path.parent() {
            fs::create_dir_all(directory).await?;
        }

        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, content.as_bytes()).await?;
        Ok(())
    }
}
