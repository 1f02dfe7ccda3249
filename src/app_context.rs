use std::{sync::Arc, time::Duration};

use tracing::{info, warn};

use crate::{
    auth::TokenIssuer,
    completion::{CompletionClient, OpenAiCompletionClient},
    config::ChatConfig,
    data_connector::{create_storage, SharedMessageStorage, SharedSessionStorage},
    routers::chat::ChatOrchestrator,
    store::MessageStore,
};

/// Error type for AppContext builder
#[derive(Debug)]
pub struct AppContextBuildError(&'static str);

impl std::fmt::Display for AppContextBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Missing required field: {}", self.0)
    }
}

impl std::error::Error for AppContextBuildError {}

/// Everything a request handler needs, constructed once at startup.
#[derive(Clone)]
pub struct AppContext {
    pub config: ChatConfig,
    pub store: MessageStore,
    pub orchestrator: ChatOrchestrator,
    pub token_issuer: Arc<TokenIssuer>,
}

pub struct AppContextBuilder {
    config: Option<ChatConfig>,
    session_storage: Option<SharedSessionStorage>,
    message_storage: Option<SharedMessageStorage>,
    completion: Option<Arc<dyn CompletionClient>>,
    token_issuer: Option<Arc<TokenIssuer>>,
}

impl AppContext {
    pub fn builder() -> AppContextBuilder {
        AppContextBuilder::new()
    }

    /// Creates storage, the provider client and the token issuer from config.
    pub fn from_config(config: ChatConfig) -> Result<Self, String> {
        AppContextBuilder::new()
            .with_storage(&config)?
            .with_openai_client(&config)?
            .with_token_issuer(&config)
            .config(config)
            .build()
            .map_err(|e| e.to_string())
    }
}

impl Default for AppContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppContextBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            session_storage: None,
            message_storage: None,
            completion: None,
            token_issuer: None,
        }
    }

    pub fn config(mut self, config: ChatConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn session_storage(mut self, storage: SharedSessionStorage) -> Self {
        self.session_storage = Some(storage);
        self
    }

    pub fn message_storage(mut self, storage: SharedMessageStorage) -> Self {
        self.message_storage = Some(storage);
        self
    }

    pub fn completion_client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.completion = Some(client);
        self
    }

    pub fn token_issuer(mut self, issuer: Arc<TokenIssuer>) -> Self {
        self.token_issuer = Some(issuer);
        self
    }

    fn with_storage(self, config: &ChatConfig) -> Result<Self, String> {
        let (sessions, messages) = create_storage(config)?;
        Ok(self.session_storage(sessions).message_storage(messages))
    }

    fn with_openai_client(self, config: &ChatConfig) -> Result<Self, String> {
        if !config.has_provider_key() {
            warn!("No completion provider API key configured; streamed chats will fail");
        }
        let client = OpenAiCompletionClient::new(&config.provider)
            .map_err(|e| format!("Failed to create completion client: {}", e))?;
        info!(
            api_base = %config.provider.api_base,
            model = %config.provider.model,
            "Completion client ready"
        );
        Ok(self.completion_client(Arc::new(client)))
    }

    fn with_token_issuer(self, config: &ChatConfig) -> Self {
        let (issuer, generated) = TokenIssuer::from_config(&config.auth);
        if generated {
            warn!("No auth secret configured; tokens will not survive a restart");
        }
        self.token_issuer(Arc::new(issuer))
    }

    pub fn build(self) -> Result<AppContext, AppContextBuildError> {
        let config = self.config.ok_or(AppContextBuildError("config"))?;
        let store = MessageStore::new(
            self.session_storage
                .ok_or(AppContextBuildError("session_storage"))?,
            self.message_storage
                .ok_or(AppContextBuildError("message_storage"))?,
        );
        let completion = self
            .completion
            .ok_or(AppContextBuildError("completion_client"))?;
        let orchestrator = ChatOrchestrator::new(
            store.clone(),
            completion,
            Duration::from_secs(config.provider.stream_timeout_secs),
        );

        Ok(AppContext {
            store,
            orchestrator,
            token_issuer: self
                .token_issuer
                .ok_or(AppContextBuildError("token_issuer"))?,
            config,
        })
    }
}
