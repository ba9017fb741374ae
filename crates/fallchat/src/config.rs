use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
    #[serde(default = "default_models")]
    pub models: Vec<ModelConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            fallback: FallbackConfig::default(),
            providers: default_providers(),
            models: default_models(),
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }

    /// Apply a `PORT`-style override. `None` leaves the configured port alone.
    pub fn override_port(&mut self, value: Option<&str>) -> Result<(), ConfigError> {
        if let Some(raw) = value {
            self.server.port = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(raw.to_string()))?;
        }
        Ok(())
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Longest gap allowed between two streamed fragments.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
            keep_alive_interval_seconds: default_keep_alive_interval(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    300
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_keep_alive_interval() -> u64 {
    15
}

// ============================================================================
// FallbackConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct FallbackConfig {
    /// Model used when a request names none, or names an unknown one.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Budget for a single candidate attempt, not the whole chain.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_seconds: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
    #[serde(default = "default_probe_message")]
    pub probe_message: String,
    /// Endpoint for the trailing attempt that names no provider.
    #[serde(default)]
    pub unpinned: Option<EndpointConfig>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            attempt_timeout_seconds: default_attempt_timeout(),
            probe_timeout_seconds: default_probe_timeout(),
            probe_message: default_probe_message(),
            unpinned: None,
        }
    }
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_attempt_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_probe_message() -> String {
    "Hello, can you say hi back?".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

// ============================================================================
// ProviderConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_true")]
    pub working: bool,
    #[serde(default = "default_true")]
    pub supports_stream: bool,
    #[serde(default = "default_true")]
    pub supports_system_message: bool,
}

fn default_true() -> bool {
    true
}

fn default_providers() -> Vec<ProviderConfig> {
    [
        ("OpenAI", "https://api.openai.com/v1", Some("OPENAI_API_KEY")),
        ("OpenRouter", "https://openrouter.ai/api/v1", Some("OPENROUTER_API_KEY")),
        ("Groq", "https://api.groq.com/openai/v1", Some("GROQ_API_KEY")),
        ("DeepInfra", "https://api.deepinfra.com/v1/openai", Some("DEEPINFRA_API_KEY")),
        ("Ollama", "http://localhost:11434/v1", None),
    ]
    .into_iter()
    .map(|(id, url, key)| ProviderConfig {
        id: id.to_string(),
        url: url.to_string(),
        api_key_env: key.map(str::to_string),
        working: true,
        supports_stream: true,
        supports_system_message: true,
    })
    .collect()
}

// ============================================================================
// ModelConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub base_provider: String,
    #[serde(default)]
    pub best_provider: String,
}

fn default_models() -> Vec<ModelConfig> {
    [
        ("gpt-3.5-turbo", "GPT-3.5 Turbo", "openai"),
        ("gpt-4", "GPT-4", "openai"),
        ("gpt-4-turbo", "GPT-4 Turbo", "openai"),
        ("claude-v1", "Claude v1", "anthropic"),
        ("claude-instant-v1", "Claude Instant v1", "anthropic"),
        ("palm", "PaLM", "google"),
        ("llama-2-7b", "Llama 2 7B", "meta"),
        ("llama-2-13b", "Llama 2 13B", "meta"),
    ]
    .into_iter()
    .map(|(id, display_name, base_provider)| ModelConfig {
        id: id.to_string(),
        display_name: display_name.to_string(),
        base_provider: base_provider.to_string(),
        best_provider: String::new(),
    })
    .collect()
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("invalid port override: {0:?}")]
    InvalidPort(String),
}

// ============================================================================
// Tests
// ============================================================================
