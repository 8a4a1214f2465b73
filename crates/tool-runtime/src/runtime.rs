use crate::conversation::{AssistantContent, Conversation};
use crate::dialect::ToolDialect;
use crate::provider::{CompletionClient, CompletionRequest, LlmError, ToolChoice};
use crate::registry::ToolRegistry;
use crate::stream::{FinishReason, StreamEvent};
use crate::tool::{ToolCall, ToolContext, ToolInvocation, ToolResult};
use async_trait::async_trait;
use futures::StreamExt;
use rx_core::{InferenceConfig, RxError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument, Span};

/// Dispatch rounds allowed per turn unless the tool config overrides it.
pub const DEFAULT_RECURSION_BUDGET: usize = 5;

/// Receives streamed text chunks as they arrive.
pub trait TokenSink: Send + Sync {
    fn on_token(&self, agent: &str, token: &str);
}

/// Anything that can describe tool schemas and run a tool invocation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn describe(&self, dialect: ToolDialect) -> Vec<Value>;

    /// Must not fail: negative outcomes are error-flagged results.
    async fn handle(&self, invocation: &ToolInvocation, context: &ToolContext) -> ToolResult;
}

/// Tool setup for an agent.
#[derive(Clone, Default)]
pub enum ToolConfig {
    #[default]
    NoTools,
    Registry {
        registry: Arc<ToolRegistry>,
        /// Overrides the agent's recursion budget when set.
        max_rounds: Option<usize>,
    },
    CustomHandler {
        handler: Arc<dyn ToolHandler>,
        max_rounds: Option<usize>,
    },
}

impl ToolConfig {
    pub fn registry(registry: Arc<ToolRegistry>) -> Self {
        ToolConfig::Registry {
            registry,
            max_rounds: None,
        }
    }

    pub fn with_max_rounds(self, rounds: usize) -> Self {
        match self {
            ToolConfig::NoTools => ToolConfig::NoTools,
            ToolConfig::Registry { registry, .. } => ToolConfig::Registry {
                registry,
                max_rounds: Some(rounds),
            },
            ToolConfig::CustomHandler { handler, .. } => ToolConfig::CustomHandler {
                handler,
                max_rounds: Some(rounds),
            },
        }
    }

    pub fn handler(&self) -> Option<&dyn ToolHandler> {
        match self {
            ToolConfig::NoTools => None,
            ToolConfig::Registry { registry, .. } => Some(registry.as_ref() as &dyn ToolHandler),
            ToolConfig::CustomHandler { handler, .. } => Some(handler.as_ref()),
        }
    }

    pub fn max_rounds(&self) -> Option<usize> {
        match self {
            ToolConfig::NoTools => None,
            ToolConfig::Registry { max_rounds, .. } | ToolConfig::CustomHandler { max_rounds, .. } => {
                *max_rounds
            }
        }
    }

    pub fn has_tools(&self) -> bool {
        !matches!(self, ToolConfig::NoTools)
    }
}

impl fmt::Debug for ToolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolConfig::NoTools => f.write_str("NoTools"),
            ToolConfig::Registry {
                registry,
                max_rounds,
            } => f
                .debug_struct("Registry")
                .field("tools", &registry.len())
                .field("max_rounds", max_rounds)
                .finish(),
            ToolConfig::CustomHandler { max_rounds, .. } => f
                .debug_struct("CustomHandler")
                .field("max_rounds", max_rounds)
                .finish(),
        }
    }
}

/// Result of one completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Last assistant text of the turn (prefixed with the agent name when streamed)
    pub text: String,
    /// Tool-dispatch rounds performed
    pub rounds: usize,
    pub finish_reason: FinishReason,
}

/// One completion, normalised across streaming and single-shot mode.
#[derive(Debug)]
struct RoundReply {
    text: Option<String>,
    tool_calls: Vec<ToolCall>,
    finish_reason: FinishReason,
}

#[derive(Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Drives one user turn: completion, tool dispatch, completion, ... until the
/// model stops asking for tools or the recursion budget runs out.
pub struct RecursiveToolLoop {
    client: Arc<dyn CompletionClient>,
    tools: ToolConfig,
    model: String,
    display_name: String,
    inference: InferenceConfig,
    streaming: bool,
    recursion_budget: usize,
    tool_choice: Option<ToolChoice>,
    sink: Option<Arc<dyn TokenSink>>,
    span: Span,
}

impl RecursiveToolLoop {
    pub fn new(client: Arc<dyn CompletionClient>, model: impl Into<String>, display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        Self {
            client,
            tools: ToolConfig::NoTools,
            model: model.into(),
            span: info_span!("tool_loop", agent = %display_name),
            display_name,
            inference: InferenceConfig::default(),
            streaming: false,
            recursion_budget: DEFAULT_RECURSION_BUDGET,
            tool_choice: None,
            sink: None,
        }
    }

    pub fn with_tools(mut self, tools: ToolConfig) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_inference(mut self, inference: InferenceConfig) -> Self {
        self.inference = inference;
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_recursion_budget(mut self, budget: usize) -> Self {
        self.recursion_budget = budget;
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn with_token_sink(mut self, sink: Arc<dyn TokenSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Effective budget: the tool config's override, else the agent default.
    pub fn budget(&self) -> usize {
        self.tools.max_rounds().unwrap_or(self.recursion_budget)
    }

    /// Run one turn. `conversation` must already hold the system prompt,
    /// history and the user message; assistant and tool messages are appended.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        context: &ToolContext,
    ) -> Result<TurnOutcome, ToolLoopError> {
        let span = self.span.clone();
        self.run_turn(conversation, context).instrument(span).await
    }

    async fn run_turn(
        &self,
        conversation: &mut Conversation,
        context: &ToolContext,
    ) -> Result<TurnOutcome, ToolLoopError> {
        let started = Instant::now();
        let handler = self.tools.handler();
        let schemas = handler
            .map(|h| h.describe(self.client.dialect()))
            .unwrap_or_default();
        let mut remaining = self.budget();
        let mut rounds = 0usize;
        let mut last_text: Option<String> = None;

        loop {
            let request = self.build_request(conversation, &schemas);
            let reply = if self.streaming {
                self.stream_round(request).await?
            } else {
                self.complete_round(request).await?
            };
            debug!(
                round = rounds + 1,
                tool_calls = reply.tool_calls.len(),
                finish_reason = ?reply.finish_reason,
                "completion received"
            );
            if let Some(text) = reply.text.as_ref().filter(|t| !t.is_empty()) {
                last_text = Some(text.clone());
            }

            let handler = match handler {
                Some(h) if !reply.tool_calls.is_empty() => h,
                _ => {
                    if !reply.tool_calls.is_empty() {
                        warn!("model requested tools but none are configured");
                    }
                    conversation.add_assistant_response(AssistantContent {
                        text: reply.text.clone(),
                        tool_calls: Vec::new(),
                    });
                    info!(rounds, elapsed_ms = started.elapsed().as_millis() as u64, "turn complete");
                    return Ok(TurnOutcome {
                        text: reply.text.unwrap_or_default(),
                        rounds,
                        finish_reason: reply.finish_reason,
                    });
                }
            };

            conversation.add_assistant_response(AssistantContent {
                text: reply.text.clone(),
                tool_calls: reply.tool_calls.clone(),
            });

            if remaining == 0 {
                info!(rounds, "recursion budget exhausted, returning partial content");
                return Ok(TurnOutcome {
                    text: last_text.unwrap_or_default(),
                    rounds,
                    finish_reason: reply.finish_reason,
                });
            }

            rounds += 1;
            for call in &reply.tool_calls {
                let result = match ToolInvocation::from_call(call, rounds) {
                    Ok(invocation) => handler.handle(&invocation, context).await,
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "unparsable tool arguments");
                        ToolResult::error(
                            &call.id,
                            &call.name,
                            format!("Tool '{}' received unparsable arguments: {}", call.name, e),
                        )
                    }
                };
                conversation.add_tool_result(result);
            }
            remaining -= 1;

            if remaining == 0 || !reply.finish_reason.is_tool_calls() {
                info!(
                    rounds,
                    remaining,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "turn complete after tool dispatch"
                );
                return Ok(TurnOutcome {
                    text: last_text.unwrap_or_default(),
                    rounds,
                    finish_reason: reply.finish_reason,
                });
            }
        }
    }

    fn build_request(&self, conversation: &Conversation, schemas: &[Value]) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: conversation.messages().to_vec(),
            inference: self.inference.clone(),
            tools: schemas.to_vec(),
            tool_choice: if schemas.is_empty() {
                None
            } else {
                self.tool_choice.clone()
            },
            stream: self.streaming,
        }
    }

    async fn complete_round(&self, request: CompletionRequest) -> Result<RoundReply, ToolLoopError> {
        let response = self.client.complete(request).await?;
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            ToolLoopError::UnrecoverableResponse("no choices returned".to_string())
        })?;
        let tool_calls = choice.tool_calls.unwrap_or_default();
        if choice.content.is_none() && tool_calls.is_empty() {
            return Err(ToolLoopError::UnrecoverableResponse(
                "choice carried neither text nor tool calls".to_string(),
            ));
        }
        let finish_reason = choice.finish_reason.unwrap_or(if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        });
        Ok(RoundReply {
            text: choice.content,
            tool_calls,
            finish_reason,
        })
    }

    async fn stream_round(&self, request: CompletionRequest) -> Result<RoundReply, ToolLoopError> {
        let mut stream = self.client.stream(request).await?;
        let mut text = String::new();
        let mut first_chunk = true;
        let mut partial: BTreeMap<usize, PartialCall> = BTreeMap::new();
        let mut finish_reason = None;

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::TextDelta { text: chunk } => {
                    if chunk.is_empty() {
                        continue;
                    }
                    let chunk = if first_chunk {
                        first_chunk = false;
                        format!("[{}]: {}", self.display_name, chunk)
                    } else {
                        chunk
                    };
                    if let Some(sink) = &self.sink {
                        sink.on_token(&self.display_name, &chunk);
                    }
                    text.push_str(&chunk);
                }
                StreamEvent::ToolCallDelta {
                    index,
                    id,
                    name,
                    arguments_delta,
                } => {
                    let entry = partial.entry(index).or_default();
                    if let Some(id) = id.filter(|_| entry.id.is_empty()) {
                        entry.id = id;
                    }
                    if let Some(name) = name.filter(|_| entry.name.is_empty()) {
                        entry.name = name;
                    }
                    entry.arguments.push_str(&arguments_delta);
                }
                StreamEvent::MessageEnd { finish_reason: r } => finish_reason = Some(r),
                StreamEvent::Error { message } => {
                    return Err(ToolLoopError::Upstream(LlmError::StreamError(message)));
                }
            }
        }

        let tool_calls: Vec<ToolCall> = partial
            .into_iter()
            .map(|(index, call)| ToolCall {
                id: if call.id.is_empty() {
                    format!("call_{index}")
                } else {
                    call.id
                },
                name: call.name,
                arguments: call.arguments,
            })
            .collect();

        if text.is_empty() && tool_calls.is_empty() {
            return Err(ToolLoopError::UnrecoverableResponse(
                "stream ended without text or tool calls".to_string(),
            ));
        }

        let finish_reason = finish_reason.unwrap_or(if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        });
        Ok(RoundReply {
            text: (!text.is_empty()).then_some(text),
            tool_calls,
            finish_reason,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolLoopError {
    #[error("LLM error: {0}")]
    Upstream(#[from] LlmError),
    #[error("Unrecoverable response: {0}")]
    UnrecoverableResponse(String),
}

impl From<ToolLoopError> for RxError {
    fn from(e: ToolLoopError) -> Self {
        match e {
            ToolLoopError::Upstream(inner) => inner.into(),
            ToolLoopError::UnrecoverableResponse(m) => RxError::UnrecoverableResponse(m),
        }
    }
}
