use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::SnpError;
use crate::loader::DEFAULT_PROGRESS_INTERVAL;
use crate::store::default_database_path;

pub const DEFAULT_CONFIG_FILE: &str = "snp-import.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub progress_interval: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub database_path: Utf8PathBuf,
    pub work_dir: Option<Utf8PathBuf>,
    pub progress_interval: u64,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, SnpError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SnpError::ConfigRead(config_path.clone()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|err| SnpError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, SnpError> {
        let database_path = match config.database {
            Some(path) => Utf8PathBuf::from(path),
            None => default_database_path()?,
        };
        let progress_interval = config
            .progress_interval
            .filter(|interval| *interval > 0)
            .unwrap_or(DEFAULT_PROGRESS_INTERVAL);

        Ok(ResolvedConfig {
            database_path,
            work_dir: config.work_dir.map(Utf8PathBuf::from),
            progress_interval,
        })
    }
}
