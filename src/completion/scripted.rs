//! Completion client that plays back canned fragments, for tests.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::core::{BoxFragmentStream, CompletionClient, CompletionError, FragmentStream, StreamStep};
use crate::store::ChatMessage;

/// How a scripted stream ends after its fragments.
#[derive(Debug, Clone)]
pub enum ScriptEnd {
    Finish,
    Fail(CompletionError),
    /// Never ends; for timeout and disconnect tests.
    Hang,
}

#[derive(Debug, Clone)]
pub struct Script {
    pub fragments: Vec<String>,
    pub end: ScriptEnd,
    /// Pause before each step.
    pub delay: Option<Duration>,
}

impl Script {
    pub fn finishing<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            end: ScriptEnd::Finish,
            delay: None,
        }
    }

    pub fn failing<I, S>(fragments: I, error: CompletionError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            end: ScriptEnd::Fail(error),
            delay: None,
        }
    }

    pub fn hanging<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            end: ScriptEnd::Hang,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Plays the same script for every request and records each history it
/// was given.
#[derive(Clone)]
pub struct ScriptedCompletionClient {
    script: Script,
    requests: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedCompletionClient {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Histories received so far, oldest request first.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().clone()
    }
}

struct ScriptedStream {
    fragments: VecDeque<String>,
    end: Option<ScriptEnd>,
    delay: Option<Duration>,
}

#[async_trait]
impl FragmentStream for ScriptedStream {
    async fn next_step(&mut self) -> StreamStep {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(fragment) = self.fragments.pop_front() {
            return StreamStep::Fragment(fragment);
        }
        match self.end.take() {
            Some(ScriptEnd::Fail(error)) => StreamStep::Failed(error),
            Some(ScriptEnd::Hang) => std::future::pending::<StreamStep>().await,
            Some(ScriptEnd::Finish) | None => StreamStep::Finished,
        }
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn stream_completion(&self, history: &[ChatMessage]) -> BoxFragmentStream {
        self.requests.lock().push(history.to_vec());
        Box::new(ScriptedStream {
            fragments: self.script.fragments.iter().cloned().collect(),
            end: Some(self.script.end.clone()),
            delay: self.script.delay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_connector::Role;

    #[tokio::test]
    async fn test_plays_fragments_then_end() {
        let client = ScriptedCompletionClient::new(Script::failing(
            ["a", "b"],
            CompletionError::Provider("boom".to_string()),
        ));
        let history = vec![ChatMessage::new(Role::User, "hi")];
        let mut stream = client.stream_completion(&history).await;

        assert_eq!(stream.next_step().await, StreamStep::Fragment("a".to_string()));
        assert_eq!(stream.next_step().await, StreamStep::Fragment("b".to_string()));
        assert_eq!(
            stream.next_step().await,
            StreamStep::Failed(CompletionError::Provider("boom".to_string()))
        );
        assert_eq!(stream.next_step().await, StreamStep::Finished);
        assert_eq!(client.requests(), vec![history]);
    }
}
