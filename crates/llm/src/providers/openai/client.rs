//! [`CompletionClient`] implementation for OpenAI-compatible endpoints.

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::debug;

use rx_tool_runtime::{
    CompletionClient, CompletionRequest, CompletionResponse, CompletionStream, LlmError,
    StreamEvent, ToolDialect,
};

use super::sse::{parse_chunk, SseDecoder, SseFrame};
use super::translate::{build_body, parse_completion, status_error};

/// OpenAI-compatible chat-completions client.
///
/// The model is taken from each [`CompletionRequest`], so one client serves
/// every agent on the same endpoint.
pub struct OpenAiCompletionClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider: String,
    dialect: ToolDialect,
}

impl OpenAiCompletionClient {
    /// Create a client for the OpenAI API.
    ///
    /// # Arguments
    /// * `api_key` - Bearer token
    /// * `base_url` - API base including the version segment (e.g. `"https://api.openai.com/v1"`)
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            provider: "openai".to_string(),
            dialect: ToolDialect::OpenAi,
        }
    }

    /// Create a client for DeepInfra's OpenAI-compatible endpoint.
    pub fn deepinfra(api_key: String, base_url: String) -> Self {
        Self {
            provider: "deepinfra".to_string(),
            dialect: ToolDialect::DeepInfra,
            ..Self::new(api_key, base_url)
        }
    }

    pub(super) fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let url = self.endpoint();
        debug!(provider = %self.provider, url = %url, stream = body["stream"].as_bool().unwrap_or(false), "completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let body_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, body_text, retry_after));
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut body = build_body(&request, self.dialect);
        body["stream"] = Value::Bool(false);

        let response = self.post(&body).await?;
        let parsed: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        parse_completion(&parsed)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream, LlmError> {
        let mut body = build_body(&request, self.dialect);
        body["stream"] = Value::Bool(true);

        let response = self.post(&body).await?;

        type ByteStream =
            Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>;

        struct State {
            bytes: ByteStream,
            decoder: SseDecoder,
            pending: VecDeque<Result<StreamEvent, LlmError>>,
            finished: bool,
        }

        impl State {
            fn absorb(&mut self, frame: SseFrame) {
                match frame {
                    SseFrame::Done => self.finished = true,
                    SseFrame::Data(data) => match parse_chunk(&data) {
                        Ok(events) => self.pending.extend(events.into_iter().map(Ok)),
                        Err(e) => self.pending.push_back(Err(e)),
                    },
                }
            }
        }

        let state = State {
            bytes: Box::pin(response.bytes_stream()),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        };

        let events = stream::unfold(state, |mut state| async move {
            loop {
                // Drain parsed events first, in arrival order.
                if let Some(evt) = state.pending.pop_front() {
                    return Some((evt, state));
                }
                if state.finished {
                    return None;
                }

                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        for frame in state.decoder.feed(&chunk) {
                            state.absorb(frame);
                        }
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        return Some((Err(LlmError::StreamError(e.to_string())), state));
                    }
                    None => {
                        if let Some(frame) = state.decoder.finish() {
                            state.absorb(frame);
                        }
                        state.finished = true;
                    }
                }
            }
        });

        Ok(Box::pin(events))
    }

    fn provider_name(&self) -> &str {
        &self.provider
    }

    fn dialect(&self) -> ToolDialect {
        self.dialect
    }
}
