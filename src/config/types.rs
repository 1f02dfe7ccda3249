use serde::{Deserialize, Serialize};

use super::ConfigResult;

pub const DEFAULT_PROVIDER_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Anonymous tokens live for seven days.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 60 * 60 * 24 * 7;

/// Main relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatConfig {
    #[serde(default = "default_history_backend")]
    pub history_backend: HistoryBackend,
    /// Required when history_backend = "redis"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub cors_allowed_origins: Vec<String>,
}

fn default_history_backend() -> HistoryBackend {
    HistoryBackend::Memory
}

/// History backend configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    Memory,
    Redis,
}

impl std::fmt::Display for HistoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryBackend::Memory => f.write_str("memory"),
            HistoryBackend::Redis => f.write_str("redis"),
        }
    }
}

/// Redis history backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedisConfig {
    /// e.g. `redis://127.0.0.1:6379`
    pub url: String,
    #[serde(default = "default_pool_max")]
    pub pool_max: usize,
    /// Expire chat records after this many days; keep forever when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u64>,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_max: default_pool_max(),
            retention_days: None,
        }
    }
}

fn default_pool_max() -> usize {
    16
}

/// Upstream chat-completion provider (OpenAI-compatible)
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub api_base: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound on one streamed completion, first byte to `[DONE]`
    pub stream_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_PROVIDER_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream_timeout_secs: 120,
            connect_timeout_secs: 10,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("stream_timeout_secs", &self.stream_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

/// Anonymous bearer token settings
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// HS256 signing secret. A random per-process secret is used when unset.
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_backend: default_history_backend(),
            redis: None,
            provider: ProviderConfig::default(),
            auth: AuthConfig::default(),
            cors_allowed_origins: vec![DEFAULT_ALLOWED_ORIGIN.to_string()],
        }
    }
}

impl ChatConfig {
    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        crate::config::validation::ConfigValidator::validate(self)
    }

    pub fn has_provider_key(&self) -> bool {
        self.provider
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_provider_settings() {
        let config = ChatConfig::default();
        assert_eq!(config.history_backend, HistoryBackend::Memory);
        assert_eq!(config.provider.model, "gpt-3.5-turbo");
        assert_eq!(config.provider.max_tokens, 1000);
        assert!((config.provider.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.auth.token_ttl_secs, 604_800);
        assert_eq!(config.cors_allowed_origins, vec!["http://localhost:3000"]);
    }

    #[test]
    fn test_chat_completions_url_trims_trailing_slash() {
        let provider = ProviderConfig {
            api_base: "http://localhost:9000/v1/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            provider.chat_completions_url(),
            "http://localhost:9000/v1/chat/completions"
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = ChatConfig::default();
        config.provider.api_key = Some("sk-live-123".to_string());
        config.auth.secret = Some("hunter2".to_string());

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-live-123"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_history_backend_serde_lowercase() {
        let json = serde_json::to_string(&HistoryBackend::Redis).unwrap();
        assert_eq!(json, "\"redis\"");
        let parsed: HistoryBackend = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(parsed, HistoryBackend::Memory);
    }

    #[test]
    fn test_has_provider_key_ignores_blank() {
        let mut config = ChatConfig::default();
        assert!(!config.has_provider_key());
        config.provider.api_key = Some("  ".to_string());
        assert!(!config.has_provider_key());
        config.provider.api_key = Some("sk-test".to_string());
        assert!(config.has_provider_key());
    }
}
