//! Configuration management for sgpt

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub client: ClientConfig,
    pub retrieval: RetrievalConfig,
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8081,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend used when a request does not ask for the remote API
    /// ("local", or "sim" with the test-sim feature)
    pub default_backend: String,
    pub local: LocalBackendConfig,
    pub remote: RemoteBackendConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_backend: "local".to_string(),
            local: LocalBackendConfig::default(),
            remote: RemoteBackendConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalBackendConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "qwen3:0.6b".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteBackendConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: usize,
}

impl Default for RemoteBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4096,
        }
    }
}

/// Timeouts for the asynchronous request client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Upper bound on a one-shot /generate call, in seconds
    pub request_timeout_secs: u64,
    /// Upper bound on a /generateStream call; generation can be slow
    pub stream_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 300,
            stream_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Directory of .md/.txt documents loaded into the index at boot
    pub docs_dir: Option<String>,
    /// Number of context documents injected per question
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            docs_dir: None,
            top_k: 3,
        }
    }
}

/// Bounds for inference server process supervision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// How long to wait for the server to answer /health before failing
    pub ready_timeout_secs: u64,
    /// Interval between readiness probes
    pub poll_interval_ms: u64,
    /// Grace period after the /shutdown request before escalating
    pub term_wait_secs: u64,
    /// Grace period after a forced kill before reporting failure
    pub kill_wait_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            ready_timeout_secs: 120,
            poll_interval_ms: 250,
            term_wait_secs: 3,
            kill_wait_secs: 2,
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "sgpt") {
            let config_dir = proj_dirs.config_dir();
            std::fs::create_dir_all(config_dir)?;
            Ok(config_dir.join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }

    /// Save configuration to default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Base URL of the inference endpoint described by the server section
    pub fn endpoint_url(&self) -> String {
        format!("http://{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.llm.default_backend, "local");
        assert_eq!(config.retrieval.top_k, 3);
        assert!(config.client.stream_timeout_secs >= 300);
        assert_eq!(config.supervisor.term_wait_secs, 3);
        assert_eq!(config.supervisor.kill_wait_secs, 2);
    }

    #[test]
    fn test_endpoint_url() {
        let config = Config::default();
        assert_eq!(config.endpoint_url(), "http://127.0.0.1:8081");
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.server.port = 9000;
        config.retrieval.docs_dir = Some("/tmp/docs".to_string());

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server.port, 9000);
        assert_eq!(parsed.retrieval.docs_dir.as_deref(), Some("/tmp/docs"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: Config = toml::from_str("[server]\nport = 9999\n").unwrap();
        assert_eq!(parsed.server.port, 9999);
        assert_eq!(parsed.server.host, "127.0.0.1");
        assert_eq!(parsed.llm.default_backend, "local");
    }
}
