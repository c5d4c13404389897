use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    CONFIG_FILE, DEBOUNCE_MS, ENV_ENDPOINT, FALLBACK_DATA_DIR, POLL_MS, READ_RETRY_MS,
    SUPPRESSION_MS,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Timing windows of the reconciliation engine, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BadgeTimings {
    pub debounce_ms: u64,
    pub suppression_ms: u64,
    pub read_retry_ms: u64,
    pub poll_ms: u64,
}

impl Default for BadgeTimings {
    fn default() -> Self {
        Self {
            debounce_ms: DEBOUNCE_MS,
            suppression_ms: SUPPRESSION_MS,
            read_retry_ms: READ_RETRY_MS,
            poll_ms: POLL_MS,
        }
    }
}

impl BadgeTimings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn suppression(&self) -> Duration {
        Duration::from_millis(self.suppression_ms)
    }

    pub fn read_retry(&self) -> Duration {
        Duration::from_millis(self.read_retry_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

/// On-disk shape of `config.json`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    endpoint: Option<String>,
    #[serde(default)]
    timings: BadgeTimings,
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    /// Base URL of the remote conversation store
    pub endpoint: Option<String>,
    pub timings: BadgeTimings,
}

impl CoreConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            endpoint: None,
            timings: BadgeTimings::default(),
        }
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join("rentarb"))
            .unwrap_or_else(|| PathBuf::from(FALLBACK_DATA_DIR))
    }

    /// Load `<data_dir>/config.json`, falling back to defaults when the file is absent.
    /// `RENTARB_ENDPOINT` takes precedence over the file's endpoint.
    pub fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self, ConfigError> {
        let mut config = Self::new(data_dir);
        let path = config.data_dir.join(CONFIG_FILE);

        let file = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<ConfigFile>(&content).map_err(|source| {
                ConfigError::Parse {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ConfigFile::default(),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        config.endpoint = file.endpoint;
        config.timings = file.timings;

        if let Ok(endpoint) = std::env::var(ENV_ENDPOINT) {
            if !endpoint.is_empty() {
                config.endpoint = Some(endpoint);
            }
        }

        Ok(config)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::new(Self::default_data_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_timings() {
        let timings = BadgeTimings::default();
        assert_eq!(timings.debounce(), Duration::from_secs(10));
        assert_eq!(timings.suppression(), Duration::from_secs(15));
        assert_eq!(timings.read_retry(), Duration::from_secs(3));
        assert_eq!(timings.poll(), Duration::from_secs(60));
    }

    #[test]
    fn test_load_partial_timings() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"timings": {"pollMs": 5000}}"#,
        )
        .unwrap();

        let config = CoreConfig::load(dir.path()).unwrap();
        assert_eq!(config.timings.poll_ms, 5000);
        assert_eq!(config.timings.debounce_ms, DEBOUNCE_MS);
        assert_eq!(config.data_dir, dir.path());
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();

        match CoreConfig::load(dir.path()) {
            Err(ConfigError::Parse { path, .. }) => {
                assert_eq!(path, dir.path().join(CONFIG_FILE));
            }
            other => panic!("Expected parse error, got {:?}", other),
        }
    }
}
