use crate::conversation::ConversationMessage;
use crate::dialect::ToolDialect;
use crate::stream::{FinishReason, StreamEvent};
use crate::tool::ToolCall;
use async_trait::async_trait;
use futures::Stream;
use rx_core::InferenceConfig;
use serde_json::Value;
use std::pin::Pin;

pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

/// How the model may pick tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    /// Force a call to the named tool.
    Tool(String),
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ConversationMessage>,
    pub inference: InferenceConfig,
    /// Tool schemas, already rendered in the client's dialect.
    pub tools: Vec<Value>,
    pub tool_choice: Option<ToolChoice>,
    pub stream: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionChoice {
    pub finish_reason: Option<FinishReason>,
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// Trait for completion providers, streaming or single-shot, with optional tools.
///
/// This trait lives in tool-runtime (not in crates/llm) because it's
/// defined by the consumer (the recursive tool loop), not the provider.
/// Implementations live in crates/llm.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream, LlmError>;

    /// Provider name for logging/debugging (e.g., "openai", "deepinfra")
    fn provider_name(&self) -> &str;

    /// Dialect tool schemas must be rendered in for this client.
    fn dialect(&self) -> ToolDialect {
        ToolDialect::OpenAi
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Authentication failed")]
    AuthError,
    #[error("Stream error: {0}")]
    StreamError(String),
}

impl From<LlmError> for rx_core::RxError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::AuthError => rx_core::RxError::Configuration(e.to_string()),
            other => rx_core::RxError::UpstreamCall(other.to_string()),
        }
    }
}

/// Mock completion client for testing the tool loop without real API calls.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Scripted {
        Response(CompletionResponse),
        Events(Vec<StreamEvent>),
        Failure(String),
    }

    /// Returns pre-configured replies in FIFO order and records every request.
    pub struct MockCompletionClient {
        replies: Mutex<VecDeque<Scripted>>,
        requests: Mutex<Vec<CompletionRequest>>,
        dialect: ToolDialect,
    }

    impl MockCompletionClient {
        pub fn new() -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
                dialect: ToolDialect::OpenAi,
            }
        }

        pub fn with_dialect(mut self, dialect: ToolDialect) -> Self {
            self.dialect = dialect;
            self
        }

        pub fn queue_response(&self, response: CompletionResponse) {
            self.replies
                .lock()
                .unwrap()
                .push_back(Scripted::Response(response));
        }

        /// Queue a simple text reply with a normal stop.
        pub fn queue_text(&self, text: &str) {
            self.queue_response(CompletionResponse {
                choices: vec![CompletionChoice {
                    finish_reason: Some(FinishReason::Stop),
                    content: Some(text.to_string()),
                    tool_calls: None,
                }],
            });
        }

        /// Queue a reply requesting tool calls.
        pub fn queue_tool_calls(&self, text: Option<&str>, calls: Vec<ToolCall>, finish: FinishReason) {
            self.queue_response(CompletionResponse {
                choices: vec![CompletionChoice {
                    finish_reason: Some(finish),
                    content: text.map(String::from),
                    tool_calls: Some(calls),
                }],
            });
        }

        pub fn queue_stream(&self, events: Vec<StreamEvent>) {
            self.replies
                .lock()
                .unwrap()
                .push_back(Scripted::Events(events));
        }

        pub fn queue_error(&self, message: &str) {
            self.replies
                .lock()
                .unwrap()
                .push_back(Scripted::Failure(message.to_string()));
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn next(&self, request: CompletionRequest) -> Result<Scripted, LlmError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::InvalidResponse("no scripted reply left".into()))
        }
    }

    impl Default for MockCompletionClient {
        fn default() -> Self {
            Self::new()
        }
    }

    fn response_to_events(response: CompletionResponse) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let Some(choice) = response.choices.into_iter().next() else {
            return events;
        };
        if let Some(text) = choice.content {
            events.push(StreamEvent::TextDelta { text });
        }
        for (index, call) in choice.tool_calls.unwrap_or_default().into_iter().enumerate() {
            events.push(StreamEvent::ToolCallDelta {
                index,
                id: Some(call.id),
                name: Some(call.name),
                arguments_delta: call.arguments,
            });
        }
        events.push(StreamEvent::MessageEnd {
            finish_reason: choice.finish_reason.unwrap_or(FinishReason::Stop),
        });
        events
    }

    #[async_trait]
    impl CompletionClient for MockCompletionClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            match self.next(request)? {
                Scripted::Response(r) => Ok(r),
                Scripted::Events(_) => Err(LlmError::InvalidResponse(
                    "stream scripted for a single-shot call".into(),
                )),
                Scripted::Failure(m) => Err(LlmError::NetworkError(m)),
            }
        }

        async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream, LlmError> {
            let events = match self.next(request)? {
                Scripted::Response(r) => response_to_events(r),
                Scripted::Events(e) => e,
                Scripted::Failure(m) => return Err(LlmError::NetworkError(m)),
            };
            Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
        }

        fn provider_name(&self) -> &str {
            "mock"
        }

        fn dialect(&self) -> ToolDialect {
            self.dialect
        }
    }
}
