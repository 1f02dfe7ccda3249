use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn, Level};

use crate::{
    app_context::AppContext,
    auth::TokenIssuer,
    config::ChatConfig,
    middleware::{self, RequestIdLayer},
    observability::logging::{self, LoggingConfig},
    routers::{
        auth as auth_routes,
        chat::handlers as chat_routes,
        error,
        sessions::handlers as session_routes,
    },
};

pub const SERVICE_NAME: &str = "chatbot-api";
pub const WELCOME_MESSAGE: &str = "Welcome to SumerAI Chatbot API";

#[derive(Clone)]
pub struct AppState {
    pub context: Arc<AppContext>,
}

impl AppState {
    pub fn new(context: AppContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }
}

impl FromRef<AppState> for Arc<TokenIssuer> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.context.token_issuer)
    }
}

async fn sink_handler() -> Response {
    error::not_found("not_found", "Not Found")
}

async fn root() -> Response {
    Json(json!({
        "message": WELCOME_MESSAGE,
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
    }))
    .into_response()
}

async fn health() -> Response {
    Json(json!({ "status": "healthy", "service": SERVICE_NAME })).into_response()
}

async fn liveness() -> Response {
    (StatusCode::OK, "OK").into_response()
}

async fn readiness(State(state): State<AppState>) -> Response {
    match state.context.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "history_backend": state.context.config.history_backend.to_string(),
            })),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            error::service_unavailable("storage_unavailable", e.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub chat_config: ChatConfig,
    pub max_payload_size: usize,
    pub log_dir: Option<String>,
    pub log_level: Option<String>,
    pub log_json: bool,
    pub request_id_headers: Option<Vec<String>>,
    pub shutdown_grace_period_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            chat_config: ChatConfig::default(),
            max_payload_size: 1024 * 1024,
            log_dir: None,
            log_level: None,
            log_json: false,
            request_id_headers: None,
            shutdown_grace_period_secs: 30,
        }
    }
}

pub fn build_app(
    app_state: AppState,
    max_payload_size: usize,
    request_id_headers: Vec<String>,
    cors_allowed_origins: Vec<String>,
) -> Router {
    let chat_router = Router::new()
        .route("/chat", post(chat_routes::chat))
        .route("/chat/stream", get(chat_routes::chat_stream));

    let session_router = Router::new()
        .route(
            "/chats",
            get(session_routes::list_sessions).post(session_routes::create_session),
        )
        .route("/chats/{session_id}", delete(session_routes::delete_session))
        .route(
            "/chats/{session_id}/messages",
            get(session_routes::list_messages),
        );

    let auth_router = Router::new()
        .route("/auth/anonymous", post(auth_routes::anonymous_login))
        .route("/auth/me", get(auth_routes::current_user));

    let public_router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/liveness", get(liveness))
        .route("/readiness", get(readiness));

    Router::new()
        .merge(chat_router)
        .merge(session_router)
        .merge(auth_router)
        .merge(public_router)
        .fallback(sink_handler)
        .layer(axum::extract::DefaultBodyLimit::max(max_payload_size))
        .layer(tower_http::limit::RequestBodyLimitLayer::new(
            max_payload_size,
        ))
        .layer(middleware::create_logging_layer())
        .layer(RequestIdLayer::new(request_id_headers))
        .layer(create_cors_layer(cors_allowed_origins))
        .with_state(app_state)
}

pub async fn startup(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

    let _log_guard = if !LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        Some(logging::init_logging(LoggingConfig {
            level: config
                .log_level
                .as_deref()
                .and_then(|s| match s.to_uppercase().parse::<Level>() {
                    Ok(l) => Some(l),
                    Err(_) => {
                        warn!("Invalid log level string: '{s}'. Defaulting to INFO.");
                        None
                    }
                })
                .unwrap_or(Level::INFO),
            json_format: config.log_json,
            log_dir: config.log_dir.clone(),
            colorize: !config.log_json,
            ..Default::default()
        }))
    } else {
        None
    };

    info!(
        "Starting chat relay: history_backend={}, model={}, max_payload_size={}MB",
        config.chat_config.history_backend,
        config.chat_config.provider.model,
        config.max_payload_size / (1024 * 1024)
    );

    let chat_config = config.chat_config.clone();
    chat_config.validate()?;
    let cors_allowed_origins = chat_config.cors_allowed_origins.clone();

    let context = AppContext::from_config(chat_config)?;
    let app_state = AppState::new(context);

    let request_id_headers = config
        .request_id_headers
        .clone()
        .unwrap_or_else(|| vec![middleware::REQUEST_ID_HEADER.to_string()]);

    let app = build_app(
        app_state,
        config.max_payload_size,
        request_id_headers,
        cors_allowed_origins,
    );

    let bind_addr = format!("{}:{}", config.host, config.port);
    info!("Starting server on {}", bind_addr);
    let listener = TcpListener::bind(&bind_addr).await?;

    let grace = Duration::from_secs(config.shutdown_grace_period_secs);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(grace))
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. Open SSE streams then get `grace` to
/// finish before the process exits.
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!("Graceful shutdown exceeded {:?}; exiting", grace);
        std::process::exit(0);
    });
}

fn create_cors_layer(allowed_origins: Vec<String>) -> tower_http::cors::CorsLayer {
    use tower_http::cors::Any;

    let cors = if allowed_origins.is_empty() {
        tower_http::cors::CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any)
    } else {
        let origins: Vec<http::HeaderValue> = allowed_origins
            .into_iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        tower_http::cors::CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                http::Method::GET,
                http::Method::POST,
                http::Method::DELETE,
                http::Method::OPTIONS,
            ])
            .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
            .allow_credentials(true)
            .expose_headers([http::header::HeaderName::from_static(
                middleware::REQUEST_ID_HEADER,
            )])
    };

    cors.max_age(Duration::from_secs(3600))
}
