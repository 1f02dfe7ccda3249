use chat_relay::{
    config::{ChatConfigBuilder, ConfigError, ConfigResult, HistoryBackend},
    server::{self, ServerConfig},
};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "chat-relay", version)]
#[command(about = "Chat relay - persists conversations and streams LLM replies over SSE")]
struct CliArgs {
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    host: String,

    #[arg(long, default_value_t = 8000, env = "PORT")]
    port: u16,

    // ==================== History ====================
    #[arg(long, default_value = "memory", value_parser = ["memory", "redis"], env = "HISTORY_BACKEND")]
    history_backend: String,

    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    #[arg(long, default_value_t = 16, env = "REDIS_POOL_MAX")]
    redis_pool_max: usize,

    #[arg(long, env = "REDIS_RETENTION_DAYS")]
    redis_retention_days: Option<u64>,

    // ==================== Provider ====================
    #[arg(long, default_value = chat_relay::config::DEFAULT_PROVIDER_API_BASE, env = "OPENAI_API_BASE")]
    provider_api_base: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    provider_api_key: Option<String>,

    #[arg(long, default_value = chat_relay::config::DEFAULT_MODEL, env = "OPENAI_MODEL")]
    model: String,

    #[arg(long, default_value_t = chat_relay::config::DEFAULT_TEMPERATURE, env = "OPENAI_TEMPERATURE")]
    temperature: f32,

    #[arg(long, default_value_t = chat_relay::config::DEFAULT_MAX_TOKENS, env = "OPENAI_MAX_TOKENS")]
    max_tokens: u32,

    #[arg(long, default_value_t = 120)]
    stream_timeout_secs: u64,

    #[arg(long, default_value_t = 10)]
    connect_timeout_secs: u64,

    // ==================== Auth ====================
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    auth_secret: Option<String>,

    #[arg(long, default_value_t = chat_relay::config::DEFAULT_TOKEN_TTL_SECS)]
    token_ttl_secs: u64,

    // ==================== HTTP ====================
    #[arg(long, num_args = 0.., default_values_t = vec![chat_relay::config::DEFAULT_ALLOWED_ORIGIN.to_string()])]
    cors_allowed_origins: Vec<String>,

    #[arg(long, default_value_t = 1024 * 1024)]
    max_payload_size: usize,

    #[arg(long, num_args = 0..)]
    request_id_headers: Vec<String>,

    #[arg(long, default_value_t = 30)]
    shutdown_grace_period_secs: u64,

    // ==================== Logging ====================
    #[arg(long, default_value = "info", value_parser = ["debug", "info", "warn", "error"])]
    log_level: String,

    #[arg(long)]
    log_dir: Option<String>,

    #[arg(long, default_value_t = false)]
    log_json: bool,
}

impl CliArgs {
    fn to_server_config(&self) -> ConfigResult<ServerConfig> {
        let history_backend = match self.history_backend.as_str() {
            "redis" => HistoryBackend::Redis,
            _ => HistoryBackend::Memory,
        };

        let builder = match history_backend {
            HistoryBackend::Redis => {
                let url = self.redis_url.clone().ok_or(ConfigError::MissingRequired {
                    field: "redis_url".to_string(),
                })?;
                ChatConfigBuilder::new()
                    .redis_history(url)
                    .redis_pool_max(self.redis_pool_max)
                    .redis_retention_days(self.redis_retention_days)
            }
            HistoryBackend::Memory => ChatConfigBuilder::new().memory_history(),
        };

        let chat_config = builder
            .provider_api_base(&self.provider_api_base)
            .provider_api_key(self.provider_api_key.clone())
            .model(&self.model)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .stream_timeout_secs(self.stream_timeout_secs)
            .connect_timeout_secs(self.connect_timeout_secs)
            .auth_secret(self.auth_secret.clone())
            .token_ttl_secs(self.token_ttl_secs)
            .cors_allowed_origins(self.cors_allowed_origins.clone())
            .build()?;

        Ok(ServerConfig {
            host: self.host.clone(),
            port: self.port,
            chat_config,
            max_payload_size: self.max_payload_size,
            log_dir: self.log_dir.clone(),
            log_level: Some(self.log_level.clone()),
            log_json: self.log_json,
            request_id_headers: if self.request_id_headers.is_empty() {
                None
            } else {
                Some(self.request_id_headers.clone())
            },
            shutdown_grace_period_secs: self.shutdown_grace_period_secs,
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli_args = CliArgs::parse();

    println!("Chat relay starting...");
    println!("Host: {}:{}", cli_args.host, cli_args.port);
    println!("History backend: {}", cli_args.history_backend);

    let server_config = cli_args.to_server_config()?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move { server::startup(server_config).await })?;
    Ok(())
}
