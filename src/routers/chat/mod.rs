//! Chat turns: the non-streaming test endpoint and the SSE relay.

pub mod events;
pub mod handlers;
pub mod orchestrator;

pub use orchestrator::{
    validate_chat_input, ChatOrchestrator, EventSender, PreparedChat, StreamOutcome,
};
