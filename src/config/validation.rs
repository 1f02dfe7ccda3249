use super::{ChatConfig, ConfigError, ConfigResult, HistoryBackend, ProviderConfig};

pub(crate) const MAX_STREAM_TIMEOUT_SECS: u64 = 24 * 60 * 60;
pub(crate) const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;
pub(crate) const MAX_RETENTION_DAYS: u64 = 100 * 365;

/// Configuration validator
pub(crate) struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &ChatConfig) -> ConfigResult<()> {
        Self::validate_history_backend(config)?;
        Self::validate_provider(&config.provider)?;

        if config.auth.token_ttl_secs == 0 || config.auth.token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(ConfigError::InvalidValue {
                field: "auth.token_ttl_secs".to_string(),
                value: config.auth.token_ttl_secs.to_string(),
                reason: format!("Must be between 1 and {}", MAX_TOKEN_TTL_SECS),
            });
        }

        for origin in &config.cors_allowed_origins {
            if origin.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "cors_allowed_origins".to_string(),
                    value: format!("{:?}", origin),
                    reason: "Origins must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    fn validate_history_backend(config: &ChatConfig) -> ConfigResult<()> {
        match (config.history_backend, &config.redis) {
            (HistoryBackend::Redis, None) => Err(ConfigError::MissingRequired {
                field: "redis".to_string(),
            }),
            (HistoryBackend::Redis, Some(redis)) => {
                if !redis.url.starts_with("redis://") && !redis.url.starts_with("rediss://") {
                    return Err(ConfigError::InvalidValue {
                        field: "redis.url".to_string(),
                        value: redis.url.clone(),
                        reason: "Must start with redis:// or rediss://".to_string(),
                    });
                }
                if redis.pool_max == 0 {
                    return Err(ConfigError::InvalidValue {
                        field: "redis.pool_max".to_string(),
                        value: "0".to_string(),
                        reason: "Must be > 0".to_string(),
                    });
                }
                if let Some(days) = redis.retention_days {
                    if days == 0 || days > MAX_RETENTION_DAYS {
                        return Err(ConfigError::InvalidValue {
                            field: "redis.retention_days".to_string(),
                            value: days.to_string(),
                            reason: format!("Must be between 1 and {} when set", MAX_RETENTION_DAYS),
                        });
                    }
                }
                Ok(())
            }
            (HistoryBackend::Memory, Some(_)) => Err(ConfigError::IncompatibleConfig {
                reason: "redis settings were provided but history_backend is memory".to_string(),
            }),
            (HistoryBackend::Memory, None) => Ok(()),
        }
    }

    fn validate_provider(provider: &ProviderConfig) -> ConfigResult<()> {
        let base = provider.api_base.trim();
        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "provider.api_base".to_string(),
                value: provider.api_base.clone(),
                reason: "Must start with http:// or https://".to_string(),
            });
        }

        if provider.model.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "provider.model".to_string(),
            });
        }

        if !(0.0..=2.0).contains(&provider.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "provider.temperature".to_string(),
                value: provider.temperature.to_string(),
                reason: "Must be between 0.0 and 2.0".to_string(),
            });
        }

        if provider.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "provider.max_tokens".to_string(),
                value: "0".to_string(),
                reason: "Must be > 0".to_string(),
            });
        }

        if provider.stream_timeout_secs == 0 || provider.stream_timeout_secs > MAX_STREAM_TIMEOUT_SECS {
            return Err(ConfigError::InvalidValue {
                field: "provider.stream_timeout_secs".to_string(),
                value: provider.stream_timeout_secs.to_string(),
                reason: format!("Must be between 1 and {}", MAX_STREAM_TIMEOUT_SECS),
            });
        }

        if provider.connect_timeout_secs > provider.stream_timeout_secs {
            return Err(ConfigError::ValidationFailed {
                reason: format!(
                    "provider.connect_timeout_secs ({}) exceeds provider.stream_timeout_secs ({})",
                    provider.connect_timeout_secs, provider.stream_timeout_secs
                ),
            });
        }

        Ok(())
    }
}
