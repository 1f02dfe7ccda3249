use super::{ChatConfig, ConfigResult, HistoryBackend, RedisConfig};

/// Builder for ChatConfig that wraps the config itself
#[derive(Debug, Clone, Default)]
pub struct ChatConfigBuilder {
    config: ChatConfig,
}

impl ChatConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== History Backend ====================

    pub fn memory_history(mut self) -> Self {
        self.config.history_backend = HistoryBackend::Memory;
        self.config.redis = None;
        self
    }

    pub fn redis_history(mut self, url: impl Into<String>) -> Self {
        self.config.history_backend = HistoryBackend::Redis;
        self.config.redis = Some(RedisConfig::new(url));
        self
    }

    pub fn redis_pool_max(mut self, pool_max: usize) -> Self {
        if let Some(redis) = self.config.redis.as_mut() {
            redis.pool_max = pool_max;
        }
        self
    }

    pub fn redis_retention_days(mut self, days: Option<u64>) -> Self {
        if let Some(redis) = self.config.redis.as_mut() {
            redis.retention_days = days;
        }
        self
    }

    // ==================== Provider ====================

    pub fn provider_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.config.provider.api_base = api_base.into();
        self
    }

    pub fn provider_api_key(mut self, api_key: Option<String>) -> Self {
        self.config.provider.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.provider.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.provider.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.provider.max_tokens = max_tokens;
        self
    }

    pub fn stream_timeout_secs(mut self, secs: u64) -> Self {
        self.config.provider.stream_timeout_secs = secs;
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.provider.connect_timeout_secs = secs;
        self
    }

    // ==================== Auth ====================

    pub fn auth_secret(mut self, secret: Option<String>) -> Self {
        self.config.auth.secret = secret.filter(|s| !s.is_empty());
        self
    }

    pub fn token_ttl_secs(mut self, secs: u64) -> Self {
        self.config.auth.token_ttl_secs = secs;
        self
    }

    // ==================== HTTP ====================

    pub fn cors_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.config.cors_allowed_origins = origins;
        self
    }

    pub fn build(self) -> ConfigResult<ChatConfig> {
        self.build_with_validation(true)
    }

    pub fn build_unchecked(self) -> ChatConfig {
        self.config
    }

    pub fn build_with_validation(self, validate: bool) -> ConfigResult<ChatConfig> {
        let config = self.config;
        if validate {
            config.validate()?;
        }
        Ok(config)
    }
}

impl From<ChatConfigBuilder> for ChatConfig {
    fn from(builder: ChatConfigBuilder) -> Self {
        builder.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_redis_history() {
        let config = ChatConfigBuilder::new()
            .redis_history("redis://127.0.0.1:6379")
            .redis_pool_max(4)
            .redis_retention_days(Some(30))
            .build()
            .unwrap();

        assert_eq!(config.history_backend, HistoryBackend::Redis);
        let redis = config.redis.unwrap();
        assert_eq!(redis.pool_max, 4);
        assert_eq!(redis.retention_days, Some(30));
    }

    #[test]
    fn test_builder_provider_overrides() {
        let config = ChatConfigBuilder::new()
            .provider_api_base("http://127.0.0.1:9999/v1")
            .provider_api_key(Some("sk-test".to_string()))
            .model("gpt-4o-mini")
            .temperature(0.2)
            .max_tokens(64)
            .stream_timeout_secs(30)
            .build()
            .unwrap();

        assert_eq!(config.provider.api_base, "http://127.0.0.1:9999/v1");
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.provider.model, "gpt-4o-mini");
        assert_eq!(config.provider.max_tokens, 64);
        assert_eq!(config.provider.stream_timeout_secs, 30);
    }

    #[test]
    fn test_blank_secrets_become_none() {
        let config = ChatConfigBuilder::new()
            .provider_api_key(Some("   ".to_string()))
            .auth_secret(Some(String::new()))
            .build_unchecked();

        assert!(config.provider.api_key.is_none());
        assert!(config.auth.secret.is_none());
    }

    #[test]
    fn test_build_validates() {
        let result = ChatConfigBuilder::new().max_tokens(0).build();
        assert!(result.is_err());

        let unchecked = ChatConfigBuilder::new().max_tokens(0).build_with_validation(false);
        assert!(unchecked.is_ok());
    }
}
