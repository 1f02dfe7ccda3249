use std::io;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

use super::orchestrator::validate_chat_input;
use crate::{
    auth::OptionalUser,
    data_connector::Role,
    routers::error::ApiError,
    server::AppState,
};

pub const PLACEHOLDER_REPLY: &str =
    "This endpoint is for testing. Please use /chat/stream for real-time responses.";

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub session_id: Option<String>,
    pub user_input: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub session_id: Option<String>,
    pub user_input: Option<String>,
}

/// `POST /chat`: stores the turn with a fixed placeholder reply.
pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    let (session_id, user_input) =
        validate_chat_input(body.session_id.as_deref(), body.user_input.as_deref())?;

    let store = state.context.orchestrator.store();
    store.append(&session_id, Role::User, &user_input).await?;
    let history = store.history(&session_id).await?;
    debug!(session_id = %session_id, messages = history.len(), "History loaded");
    store
        .append(&session_id, Role::Assistant, PLACEHOLDER_REPLY)
        .await?;

    Ok(Json(json!({ "reply": PLACEHOLDER_REPLY })).into_response())
}

/// `GET /chat/stream`: relays the completion as server-sent events.
pub async fn chat_stream(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    params: Result<Query<StreamParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    let (session_id, user_input) =
        validate_chat_input(params.session_id.as_deref(), params.user_input.as_deref())?;

    info!(
        session_id = %session_id,
        input_len = user_input.len(),
        user_id = user.as_ref().map(|u| u.user_id.as_str()).unwrap_or("-"),
        "Chat stream requested"
    );

    let prepared = state
        .context
        .orchestrator
        .prepare(session_id, &user_input)
        .await?;

    let (tx, rx) = mpsc::unbounded_channel::<Result<Bytes, io::Error>>();
    tokio::spawn(prepared.relay(tx));

    let mut response = Response::new(Body::from_stream(UnboundedReceiverStream::new(rx)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    Ok(response)
}
