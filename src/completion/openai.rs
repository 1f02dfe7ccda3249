//! OpenAI-compatible `/chat/completions` streaming client.

use std::{collections::VecDeque, pin::Pin, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    core::{BoxFragmentStream, CompletionClient, CompletionError, FailedStream, FragmentStream, StreamStep},
    sse::{parse_sse_block, ChunkProcessor},
};
use crate::{config::ProviderConfig, store::ChatMessage};

const DONE_MARKER: &str = "[DONE]";
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ProviderErrorBody>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ProviderErrorBody,
}

/// What one SSE block from the provider means.
#[derive(Debug, PartialEq, Eq)]
enum BlockOutcome {
    Content(String),
    Skip,
    Done,
    Error(CompletionError),
}

fn interpret_block(block: &str) -> BlockOutcome {
    let (event, data) = parse_sse_block(block);
    let data = data.trim();

    if event == Some("error") {
        return BlockOutcome::Error(CompletionError::Provider(data.to_string()));
    }
    if data.is_empty() {
        return BlockOutcome::Skip;
    }
    if data == DONE_MARKER {
        return BlockOutcome::Done;
    }

    let payload: ChunkPayload = match serde_json::from_str(data) {
        Ok(payload) => payload,
        Err(e) => return BlockOutcome::Error(CompletionError::Decode(e.to_string())),
    };
    if let Some(error) = payload.error {
        let message = error
            .message
            .unwrap_or_else(|| "unknown provider error".to_string());
        return BlockOutcome::Error(CompletionError::Provider(message));
    }

    let content = payload
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .unwrap_or_default();
    if content.is_empty() {
        BlockOutcome::Skip
    } else {
        BlockOutcome::Content(content)
    }
}

/// Best-effort `error.message` from a non-2xx body.
fn error_message_from_body(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        if let Some(message) = envelope.error.message {
            return message;
        }
    }
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

struct OpenAiFragmentStream {
    body: Option<ByteStream>,
    processor: ChunkProcessor,
    ready: VecDeque<String>,
    terminal: Option<StreamStep>,
    finished: bool,
}

impl OpenAiFragmentStream {
    fn new(body: ByteStream) -> Self {
        Self {
            body: Some(body),
            processor: ChunkProcessor::new(),
            ready: VecDeque::new(),
            terminal: None,
            finished: false,
        }
    }

    /// Drains complete blocks into `ready`, stopping at the first terminal one.
    fn drain_blocks(&mut self) {
        while self.terminal.is_none() {
            let Some(block) = self.processor.next_block() else {
                break;
            };
            match interpret_block(&block) {
                BlockOutcome::Content(text) => self.ready.push_back(text),
                BlockOutcome::Skip => {}
                BlockOutcome::Done => self.terminal = Some(StreamStep::Finished),
                BlockOutcome::Error(e) => self.terminal = Some(StreamStep::Failed(e)),
            }
        }
        if self.terminal.is_some() {
            // Nothing after a terminal block is read.
            self.body = None;
        }
    }
}

#[async_trait]
impl FragmentStream for OpenAiFragmentStream {
    async fn next_step(&mut self) -> StreamStep {
        loop {
            if let Some(text) = self.ready.pop_front() {
                return StreamStep::Fragment(text);
            }
            if self.finished {
                return StreamStep::Finished;
            }
            if let Some(step) = self.terminal.take() {
                self.finished = true;
                return step;
            }

            let Some(body) = self.body.as_mut() else {
                self.finished = true;
                return StreamStep::Failed(CompletionError::Truncated);
            };

            match body.next().await {
                Some(Ok(chunk)) => {
                    self.processor.push_chunk(&chunk);
                    self.drain_blocks();
                }
                Some(Err(e)) => {
                    self.body = None;
                    self.terminal = Some(StreamStep::Failed(CompletionError::Request(e.to_string())));
                }
                None => {
                    self.body = None;
                    if self.processor.has_remaining() {
                        // Last block without its trailing blank line.
                        let rest = self.processor.take_remaining();
                        self.processor.push_chunk(rest.as_bytes());
                        self.processor.push_chunk(b"\n\n");
                        self.drain_blocks();
                    }
                    if self.terminal.is_none() {
                        self.terminal = Some(StreamStep::Failed(CompletionError::Truncated));
                    }
                }
            }
        }
    }
}

pub struct OpenAiCompletionClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompletionClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, CompletionError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| CompletionError::Request(e.to_string()))?;

        Ok(Self {
            http,
            url: config.chat_completions_url(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn stream_completion(&self, history: &[ChatMessage]) -> BoxFragmentStream {
        let Some(api_key) = self.api_key.as_deref() else {
            return FailedStream::boxed(CompletionError::NotConfigured(
                "no API key set".to_string(),
            ));
        };

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: history,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: true,
        };

        debug!(url = %self.url, model = %self.model, messages = history.len(), "Requesting completion");

        let response = match self
            .http
            .post(&self.url)
            .bearer_auth(api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Completion request failed");
                return FailedStream::boxed(CompletionError::Request(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message_from_body(&body);
            warn!(status = status.as_u16(), message = %message, "Completion provider rejected request");
            return FailedStream::boxed(CompletionError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Box::new(OpenAiFragmentStream::new(Box::pin(response.bytes_stream())))
    }
}
