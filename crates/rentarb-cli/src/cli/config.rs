use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rentarb_core::streaming::PushSocketClient;
use rentarb_core::CoreConfig;
use serde::{Deserialize, Serialize};

/// CLI configuration that can be loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    /// Data directory holding config.json and the override store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the conversation store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Push-event socket to follow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
}

impl CliConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CliConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(CoreConfig::default_data_dir)
    }

    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(PushSocketClient::default_socket_path)
    }

    /// Core config from the data dir, with this file's endpoint taking precedence.
    pub fn core_config(&self) -> Result<CoreConfig> {
        let mut core = CoreConfig::load(self.data_dir()).context("Failed to load core config")?;
        if let Some(endpoint) = &self.endpoint {
            core.endpoint = Some(endpoint.clone());
        }
        Ok(core)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "dataDir": "/var/lib/rentarb",
            "endpoint": "https://support.example.com/api",
            "socketPath": "/tmp/test/rentarb-push.sock"
        }"#;
        let config: CliConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/rentarb"));
        assert_eq!(
            config.endpoint.as_deref(),
            Some("https://support.example.com/api")
        );
        assert_eq!(
            config.socket_path(),
            PathBuf::from("/tmp/test/rentarb-push.sock")
        );
    }

    #[test]
    fn test_parse_config_minimal() {
        let config: CliConfig = serde_json::from_str("{}").unwrap();
        assert!(config.data_dir.is_none());
        assert!(config.endpoint.is_none());
        assert_eq!(config.socket_path(), PushSocketClient::default_socket_path());
    }

    #[test]
    fn test_core_config_uses_cli_endpoint() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"endpoint": "http://from-file", "timings": {"debounceMs": 500}}"#,
        )
        .unwrap();

        let config = CliConfig {
            data_dir: Some(dir.path().to_path_buf()),
            endpoint: Some("http://from-cli".to_string()),
            socket_path: None,
        };
        let core = config.core_config().unwrap();
        assert_eq!(core.endpoint.as_deref(), Some("http://from-cli"));
        assert_eq!(core.timings.debounce_ms, 500);
        assert_eq!(core.data_dir, dir.path());
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = CliConfig::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
