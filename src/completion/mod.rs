//! Streaming chat-completion clients.

pub mod core;
pub mod openai;
pub mod scripted;
pub(crate) mod sse;

pub use self::core::{
    BoxFragmentStream, CompletionClient, CompletionError, FailedStream, FragmentStream, StreamStep,
};
pub use self::openai::OpenAiCompletionClient;
pub use self::scripted::{Script, ScriptEnd, ScriptedCompletionClient};
