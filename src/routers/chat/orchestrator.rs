//! One chat turn: store the user message, load history, relay the
//! completion to the client, persist the reply.
//!
//! A reply is persisted only when the provider signals completion with at
//! least one fragment. Partial text from a failed, timed out or abandoned
//! stream is discarded; the user message stays in history regardless.

use std::{io, sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::{sync::mpsc::UnboundedSender, time::Instant};
use tracing::{debug, error, info, warn};

use super::events;
use crate::{
    completion::{CompletionClient, CompletionError, StreamStep},
    data_connector::{Role, SessionId},
    routers::error::ApiError,
    store::{ChatMessage, MessageStore},
};

pub const SESSION_REQUIRED_MESSAGE: &str = "session_id and user_input are required";

/// Used when the configured stream timeout does not fit in an `Instant`.
const FAR_DEADLINE: Duration = Duration::from_secs(86_400 * 365 * 30);

pub type EventSender = UnboundedSender<Result<Bytes, io::Error>>;

/// How a relayed stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// `[DONE]` was sent. `persisted` is false when storing the reply failed.
    Completed { persisted: bool },
    /// An error event was sent; nothing was persisted.
    Failed(CompletionError),
    /// The client went away; nothing was persisted.
    Cancelled,
}

/// Rejects missing or blank `session_id` / `user_input`. Both are passed
/// on unchanged; session ids are opaque.
pub fn validate_chat_input(
    session_id: Option<&str>,
    user_input: Option<&str>,
) -> Result<(SessionId, String), ApiError> {
    match (session_id, user_input) {
        (Some(sid), Some(input)) if !sid.trim().is_empty() && !input.trim().is_empty() => {
            Ok((SessionId::from(sid), input.to_string()))
        }
        _ => Err(ApiError::InvalidRequest(SESSION_REQUIRED_MESSAGE.to_string())),
    }
}

#[derive(Clone)]
pub struct ChatOrchestrator {
    store: MessageStore,
    completion: Arc<dyn CompletionClient>,
    stream_timeout: Duration,
}

impl ChatOrchestrator {
    pub fn new(
        store: MessageStore,
        completion: Arc<dyn CompletionClient>,
        stream_timeout: Duration,
    ) -> Self {
        Self {
            store,
            completion,
            stream_timeout,
        }
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Stores the user message and loads the history that includes it.
    /// A storage failure here fails the request before any stream opens.
    pub async fn prepare(
        &self,
        session_id: SessionId,
        user_input: &str,
    ) -> Result<PreparedChat, ApiError> {
        self.store.append(&session_id, Role::User, user_input).await?;
        let history = self.store.history(&session_id).await?;
        debug!(session_id = %session_id, messages = history.len(), "History loaded");

        Ok(PreparedChat {
            session_id,
            history,
            store: self.store.clone(),
            completion: Arc::clone(&self.completion),
            stream_timeout: self.stream_timeout,
        })
    }
}

pub struct PreparedChat {
    session_id: SessionId,
    history: Vec<ChatMessage>,
    store: MessageStore,
    completion: Arc<dyn CompletionClient>,
    stream_timeout: Duration,
}

impl PreparedChat {
    /// Streams the completion into `tx` until it finishes, fails, times out
    /// or the receiver is dropped.
    pub async fn relay(self, tx: EventSender) -> StreamOutcome {
        let now = Instant::now();
        let deadline = now
            .checked_add(self.stream_timeout)
            .unwrap_or_else(|| now + FAR_DEADLINE);
        let timeout_secs = self.stream_timeout.as_secs();
        let session_id = self.session_id;

        let mut stream = tokio::select! {
            biased;
            _ = tx.closed() => {
                info!(session_id = %session_id, "Client disconnected before completion started");
                return StreamOutcome::Cancelled;
            }
            _ = tokio::time::sleep_until(deadline) => {
                return fail(&tx, &session_id, CompletionError::Timeout(timeout_secs), 0);
            }
            stream = self.completion.stream_completion(&self.history) => stream,
        };

        let mut reply = String::new();
        let mut fragments = 0usize;

        loop {
            let step = tokio::select! {
                biased;
                _ = tx.closed() => {
                    info!(session_id = %session_id, fragments, "Client disconnected mid-stream");
                    return StreamOutcome::Cancelled;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    StreamStep::Failed(CompletionError::Timeout(timeout_secs))
                }
                step = stream.next_step() => step,
            };

            match step {
                StreamStep::Fragment(text) => {
                    reply.push_str(&text);
                    fragments += 1;
                    if tx.send(Ok(events::data_event(&text))).is_err() {
                        info!(session_id = %session_id, fragments, "Client disconnected mid-stream");
                        return StreamOutcome::Cancelled;
                    }
                }
                StreamStep::Finished if fragments == 0 => {
                    return fail(&tx, &session_id, CompletionError::Empty, 0);
                }
                StreamStep::Finished => break,
                StreamStep::Failed(e) => {
                    return fail(&tx, &session_id, e, fragments);
                }
            }
        }

        // Release the provider connection before the store round-trip.
        drop(stream);

        let persisted = match self.store.append(&session_id, Role::Assistant, &reply).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    session_id = %session_id,
                    reply_len = reply.len(),
                    error = %e,
                    "Assistant reply streamed but not persisted"
                );
                false
            }
        };

        info!(session_id = %session_id, fragments, reply_len = reply.len(), "Chat stream completed");
        let _ = tx.send(Ok(events::done_event()));
        StreamOutcome::Completed { persisted }
    }
}

fn fail(
    tx: &EventSender,
    session_id: &SessionId,
    error: CompletionError,
    fragments: usize,
) -> StreamOutcome {
    warn!(
        session_id = %session_id,
        fragments,
        error = %error,
        "Chat stream failed; partial reply discarded"
    );
    let _ = tx.send(Ok(events::error_event(&error.to_string())));
    StreamOutcome::Failed(error)
}
