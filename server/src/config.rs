//! Configuration management for Scroll Server

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Endpoint path of the realtime socket
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Longest accepted text message, in characters
    pub max_text_len: usize,
}

fn default_ws_path() -> String {
    scroll_core::DEFAULT_WS_PATH.to_string()
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self { max_text_len: 4000 }
    }
}

impl Config {
    pub async fn load(path: &str) -> anyhow::Result<Self> {
        if Path::new(path).exists() {
            let content = fs::read_to_string(path).await?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            let content = toml::to_string_pretty(&config)?;
            fs::write(path, content).await?;
            tracing::info!("Created default config at {}", path);
            Ok(config)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                ws_path: default_ws_path(),
            },
            storage: StorageConfig {
                database_path: "./data/scroll.db".to_string(),
            },
            realtime: RealtimeConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writes_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();

        let config = Config::load(path).await.unwrap();
        assert_eq!(config.server.ws_path, "/api/socket");
        assert!(Path::new(path).exists());

        let reloaded = Config::load(path).await.unwrap();
        assert_eq!(reloaded.server.port, config.server.port);
        assert_eq!(reloaded.realtime.max_text_len, 4000);
    }

    #[test]
    fn test_optional_sections() {
        let config: Config = toml::from_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 8080

            [storage]
            database_path = "/tmp/scroll.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.ws_path, "/api/socket");
        assert_eq!(config.realtime.max_text_len, 4000);
    }
}
