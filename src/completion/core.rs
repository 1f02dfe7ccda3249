use async_trait::async_trait;

use crate::store::ChatMessage;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    #[error("Completion provider is not configured: {0}")]
    NotConfigured(String),

    #[error("Failed to reach completion provider: {0}")]
    Request(String),

    #[error("Completion provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Completion provider error: {0}")]
    Provider(String),

    #[error("Malformed completion chunk: {0}")]
    Decode(String),

    #[error("Completion stream ended before completion was signalled")]
    Truncated,

    #[error("Completion stream exceeded {0}s")]
    Timeout(u64),

    #[error("Completion provider returned no content")]
    Empty,
}

/// One pull from a [`FragmentStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStep {
    /// Non-empty piece of assistant text.
    Fragment(String),
    /// Provider signalled completion.
    Finished,
    /// Terminal failure. Fragments already yielded stay valid.
    Failed(CompletionError),
}

impl StreamStep {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamStep::Fragment(_))
    }
}

/// Pull-based, non-restartable sequence of completion fragments.
///
/// Ends with exactly one of `Finished` or `Failed`; every call after that
/// returns `Finished`. Dropping the stream releases the provider connection.
#[async_trait]
pub trait FragmentStream: Send {
    async fn next_step(&mut self) -> StreamStep;
}

pub type BoxFragmentStream = Box<dyn FragmentStream>;

#[async_trait]
pub trait CompletionClient: Send + Sync + 'static {
    /// Starts one completion over `history`, passed through unmodified.
    /// Failures to start surface as the stream's first step.
    async fn stream_completion(&self, history: &[ChatMessage]) -> BoxFragmentStream;
}

/// Stream that fails immediately, for errors raised before the provider
/// produced anything.
pub struct FailedStream {
    error: Option<CompletionError>,
}

impl FailedStream {
    pub fn boxed(error: CompletionError) -> BoxFragmentStream {
        Box::new(Self { error: Some(error) })
    }
}

#[async_trait]
impl FragmentStream for FailedStream {
    async fn next_step(&mut self) -> StreamStep {
        match self.error.take() {
            Some(error) => StreamStep::Failed(error),
            None => StreamStep::Finished,
        }
    }
}
