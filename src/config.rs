//! Configuration management for courtside.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub tennis_api: TennisApiConfig,
    #[serde(default)]
    pub web_search: WebSearchConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "gemini" or "openai_compatible" (DeepSeek and friends)
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_key_env() -> String {
    "LLM_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on LLM round trips per user query
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    pub system_prompt: String,
}

fn default_max_turns() -> u32 {
    5
}

/// Connection settings for the upstream sports-data API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TennisApiConfig {
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_tennis_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_tennis_key_env() -> String {
    "TENNIS_API_KEY".to_string()
}

/// Timeout and retry budget shared by the upstream HTTP clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    /// "google_cse" or "duckduckgo"
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default)]
    pub google_api_key: Option<String>,
    #[serde(default = "default_google_key_env")]
    pub google_api_key_env: String,
    #[serde(default)]
    pub google_cse_id: Option<String>,
    #[serde(default = "default_google_cse_env")]
    pub google_cse_id_env: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_search_provider() -> String {
    "duckduckgo".to_string()
}

fn default_google_key_env() -> String {
    "GOOGLE_SEARCH_API_KEY".to_string()
}

fn default_google_cse_env() -> String {
    "GOOGLE_CSE_ID".to_string()
}

fn default_max_results() -> usize {
    5
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            google_api_key: None,
            google_api_key_env: default_google_key_env(),
            google_cse_id: None,
            google_cse_id_env: default_google_cse_env(),
            max_results: default_max_results(),
            http: HttpConfig::default(),
        }
    }
}

impl WebSearchConfig {
    /// Google credentials, from the config file or the environment.
    pub fn google_credentials(&self) -> Option<(String, String)> {
        let key = secret(&self.google_api_key, &self.google_api_key_env)?;
        let cx = secret(&self.google_cse_id, &self.google_cse_id_env)?;
        Some((key, cx))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Trailing window of messages kept per session
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    /// Idle time after which a session is forgotten
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_max_messages() -> usize {
    20
}

fn default_ttl_secs() -> u64 {
    3600
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter; `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info,courtside=debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly, enthusiastic and helpful tennis \
    assistant with the tone of a passionate tennis expert. Use the available tools to look up \
    schedules, live scores, match statistics, head-to-head records and rankings instead of \
    relying on memory. Prefer 'find_match_and_get_details' for questions about a specific \
    match. If a tool reports an error or cannot find the data, say so honestly and use any web \
    search context you were given. Do not ask the user for clarification when a tool can \
    answer the question.";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: "gemini".to_string(),
                model: "gemini-1.5-flash-latest".to_string(),
                api_base: None,
                api_key: None,
                api_key_env: default_api_key_env(),
                max_tokens: 2048,
                temperature: default_temperature(),
                timeout_secs: default_llm_timeout_secs(),
            },
            agent: AgentConfig {
                max_turns: default_max_turns(),
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            },
            tennis_api: TennisApiConfig {
                host: "tennisapi1.p.rapidapi.com".to_string(),
                api_key: None,
                api_key_env: default_tennis_key_env(),
                http: HttpConfig::default(),
            },
            web_search: WebSearchConfig::default(),
            session: SessionConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Read a secret from the config value, falling back to an env var.
fn secret(value: &Option<String>, env_var: &str) -> Option<String> {
    value
        .clone()
        .filter(|v| !v.is_empty())
        .or_else(|| std::env::var(env_var).ok().filter(|v| !v.is_empty()))
}

impl AppConfig {
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".courtside").join("config.toml"))
    }

    /// Load `path` and apply environment overrides.
    pub fn load_with_env(path: &std::path::Path) -> Result<Self> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load a config file; a missing file yields the defaults.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(provider) = std::env::var("COURTSIDE_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Ok(model) = std::env::var("COURTSIDE_MODEL") {
            self.llm.model = model;
        }
        if let Ok(api_base) = std::env::var("COURTSIDE_API_BASE") {
            self.llm.api_base = Some(api_base);
        }
        if let Ok(host) = std::env::var("TENNIS_API_HOST") {
            self.tennis_api.host = host;
        }
        if let Some(port) = std::env::var("COURTSIDE_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            self.server.port = port;
        }
    }

    pub fn api_key(&self) -> Result<String> {
        secret(&self.llm.api_key, &self.llm.api_key_env).with_context(|| {
            format!(
                "LLM API key not found. Either:\n  \
                 1. Set llm.api_key in config file: {}\n  \
                 2. Set environment variable: export {}=your-key",
                Self::config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                self.llm.api_key_env
            )
        })
    }

    pub fn tennis_api_key(&self) -> Result<String> {
        secret(&self.tennis_api.api_key, &self.tennis_api.api_key_env).with_context(|| {
            format!(
                "Tennis API key not found. Set tennis_api.api_key or export {}",
                self.tennis_api.api_key_env
            )
        })
    }

    pub fn save_default_to(config_path: &std::path::Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content =
            toml::to_string_pretty(&Self::default()).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.agent.max_turns, 5);
        assert_eq!(config.session.max_messages, 20);
        assert_eq!(config.tennis_api.http.max_attempts, 3);
        assert_eq!(config.llm.provider, "gemini");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        AppConfig::save_default_to(&path).unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.server.port, 8000);
        assert_eq!(loaded.web_search.provider, "duckduckgo");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.agent.max_turns, 5);
    }

    #[test]
    fn test_partial_file_fills_optional_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[llm]
provider = "openai_compatible"
model = "deepseek-chat"
api_base = "https://api.deepseek.com/v1"
max_tokens = 1024

[agent]
system_prompt = "be brief"

[tennis_api]
host = "example.test"

[tennis_api.http]
max_attempts = 5
"#,
        )
        .unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.llm.provider, "openai_compatible");
        assert_eq!(loaded.agent.max_turns, 5);
        assert_eq!(loaded.tennis_api.http.max_attempts, 5);
        assert_eq!(loaded.tennis_api.http.connect_timeout_secs, 5);
        assert_eq!(loaded.session.ttl_secs, 3600);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
