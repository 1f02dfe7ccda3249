use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::{
    auth::{OptionalUser, RequiredUser},
    data_connector::SessionId,
    routers::error::ApiError,
    server::AppState,
    store::{ChatMessage, SessionSummary},
};

pub const SESSION_DELETED_MESSAGE: &str = "Session deleted successfully";

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize)]
pub struct MessageList {
    pub messages: Vec<ChatMessage>,
}

/// `GET /chats`: the caller's sessions, newest first.
pub async fn list_sessions(
    State(state): State<AppState>,
    RequiredUser(user): RequiredUser,
) -> Result<Json<SessionList>, ApiError> {
    let sessions = state
        .context
        .store
        .list_sessions(Some(&user.user_id))
        .await?;
    Ok(Json(SessionList { sessions }))
}

/// `POST /chats`
pub async fn create_session(
    State(state): State<AppState>,
    RequiredUser(user): RequiredUser,
) -> Result<Json<Value>, ApiError> {
    let session_id = state
        .context
        .store
        .create_session(Some(&user.user_id))
        .await?;
    info!(session_id = %session_id, user_id = %user.user_id, "Created chat");
    Ok(Json(json!({ "session_id": session_id })))
}

/// `GET /chats/{id}/messages`. Readable without a token.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    OptionalUser(_user): OptionalUser,
) -> Result<Json<MessageList>, ApiError> {
    let messages = state
        .context
        .store
        .history(&SessionId::from(session_id))
        .await?;
    Ok(Json(MessageList { messages }))
}

/// `DELETE /chats/{id}`. Deleting an unknown id succeeds.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    OptionalUser(user): OptionalUser,
) -> Result<Json<Value>, ApiError> {
    let session_id = SessionId::from(session_id);
    state.context.store.delete_session(&session_id).await?;
    info!(
        session_id = %session_id,
        user_id = user.as_ref().map(|u| u.user_id.as_str()).unwrap_or("-"),
        "Deleted chat"
    );
    Ok(Json(json!({ "detail": SESSION_DELETED_MESSAGE })))
}
