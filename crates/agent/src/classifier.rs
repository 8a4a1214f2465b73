//! Model-backed routing: the model must answer through the `analyzePrompt`
//! tool, naming one of the registered agents.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info_span, Instrument, Span};

use rx_core::config::ClassifierConfig;
use rx_core::{InferenceConfig, RxError};
use rx_tool_runtime::{
    AssistantContent, CompletionClient, CompletionRequest, ConversationMessage, LlmError,
    ParamType, ToolChoice, ToolDefinition,
};

use crate::agent::agent_id_from_name;
use crate::storage::{ChatMessage, ChatRole};

pub const ANALYZE_PROMPT_TOOL: &str = "analyzePrompt";

const SYSTEM_PROMPT: &str = "You are an AI assistant. Based on the chat history and the user's \
request, select the most suitable agent for this context.";

/// A routable target as the classifier sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDescriptor {
    pub id: String,
    pub description: String,
}

impl AgentDescriptor {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierResult {
    /// Id of the selected target; always one of the descriptors passed in.
    pub selected_agent: String,
    pub confidence: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("classifier call failed: {0}")]
    Upstream(#[from] LlmError),
    #[error("no valid tool call found in the response")]
    MissingToolCall,
    #[error("unexpected tool '{0}' in classifier response")]
    WrongTool(String),
    #[error("tool input is not valid JSON: {0}")]
    InvalidArguments(String),
    #[error("tool input is missing '{0}'")]
    MissingField(&'static str),
    #[error("selected agent '{0}' is not registered")]
    UnknownAgent(String),
}

impl From<ClassificationError> for RxError {
    fn from(e: ClassificationError) -> Self {
        RxError::Classification(e.to_string())
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        input: &str,
        history: &[ChatMessage],
        agents: &[AgentDescriptor],
    ) -> Result<ClassifierResult, ClassificationError>;
}

/// Classifier backed by a chat-completions model.
pub struct ModelClassifier {
    client: Arc<dyn CompletionClient>,
    model: String,
    inference: InferenceConfig,
    tool_choice: ToolChoice,
    span: Span,
}

impl ModelClassifier {
    /// A classifier that forces the `analyzePrompt` tool.
    pub fn new(client: Arc<dyn CompletionClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            inference: InferenceConfig {
                max_tokens: 1000,
                temperature: Some(0.0),
                top_p: Some(0.9),
                stop_sequences: Vec::new(),
            },
            tool_choice: ToolChoice::Tool(ANALYZE_PROMPT_TOOL.to_string()),
            span: info_span!("classifier"),
        }
    }

    /// Custom endpoints get `tool_choice: auto`; many compatible servers
    /// reject a forced function choice.
    pub fn from_config(client: Arc<dyn CompletionClient>, config: &ClassifierConfig) -> Self {
        let mut classifier = Self::new(client, config.model.clone()).with_inference(InferenceConfig {
            max_tokens: config.max_tokens,
            temperature: Some(config.temperature),
            top_p: Some(config.top_p),
            stop_sequences: Vec::new(),
        });
        if config.base_url.is_some() {
            classifier.tool_choice = ToolChoice::Auto;
        }
        classifier
    }

    pub fn with_inference(mut self, inference: InferenceConfig) -> Self {
        self.inference = inference;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn tool_choice(&self) -> &ToolChoice {
        &self.tool_choice
    }

    fn build_request(&self, input: &str, history: &[ChatMessage], agents: &[AgentDescriptor]) -> CompletionRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ConversationMessage::System(system_prompt(agents)));
        for message in history {
            messages.push(match message.role {
                ChatRole::User => ConversationMessage::User(message.content.clone()),
                ChatRole::Assistant => {
                    ConversationMessage::Assistant(AssistantContent::text(message.content.clone()))
                }
            });
        }
        messages.push(ConversationMessage::User(input.to_string()));

        CompletionRequest {
            model: self.model.clone(),
            messages,
            inference: self.inference.clone(),
            tools: vec![self.client.dialect().render(&analyze_prompt_tool())],
            tool_choice: Some(self.tool_choice.clone()),
            stream: false,
        }
    }
}

#[async_trait]
impl Classifier for ModelClassifier {
    async fn classify(
        &self,
        input: &str,
        history: &[ChatMessage],
        agents: &[AgentDescriptor],
    ) -> Result<ClassifierResult, ClassificationError> {
        let request = self.build_request(input, history, agents);
        let response = self
            .client
            .complete(request)
            .instrument(self.span.clone())
            .await?;

        let call = response
            .choices
            .first()
            .and_then(|c| c.tool_calls.as_ref())
            .and_then(|calls| calls.first())
            .ok_or(ClassificationError::MissingToolCall)?;
        if call.name != ANALYZE_PROMPT_TOOL {
            return Err(ClassificationError::WrongTool(call.name.clone()));
        }
        let arguments = call
            .parse_arguments()
            .map_err(|e| ClassificationError::InvalidArguments(e.to_string()))?;

        let result = interpret(&arguments, agents)?;
        debug!(parent: &self.span, selected = %result.selected_agent, confidence = result.confidence, "classified");
        Ok(result)
    }
}

fn analyze_prompt_tool() -> ToolDefinition {
    ToolDefinition::new(
        ANALYZE_PROMPT_TOOL,
        "Analyze the user input, and the chat history to determine which agent to select",
    )
    .param("userinput", ParamType::String, "The original user input")
    .param("selected_agent", ParamType::String, "The name of the selected agent")
    .param("confidence", ParamType::Number, "Confidence level between 0 and 1")
    .required(&["userinput", "selected_agent", "confidence"])
}

fn system_prompt(agents: &[AgentDescriptor]) -> String {
    let mut prompt = format!("{SYSTEM_PROMPT}\n\nAvailable agents:\n");
    for agent in agents {
        prompt.push_str(&format!("{}: {}\n", agent.id, agent.description));
    }
    prompt
}

fn interpret(
    arguments: &Map<String, Value>,
    agents: &[AgentDescriptor],
) -> Result<ClassifierResult, ClassificationError> {
    arguments
        .get("userinput")
        .and_then(Value::as_str)
        .ok_or(ClassificationError::MissingField("userinput"))?;
    let selected = arguments
        .get("selected_agent")
        .and_then(Value::as_str)
        .ok_or(ClassificationError::MissingField("selected_agent"))?;
    let confidence = match arguments.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or(ClassificationError::MissingField("confidence"))?;

    // Models sometimes answer with the display name instead of the id.
    let normalized = agent_id_from_name(selected);
    let agent = agents
        .iter()
        .find(|a| a.id == selected || a.id == normalized)
        .ok_or_else(|| ClassificationError::UnknownAgent(selected.to_string()))?;

    Ok(ClassifierResult {
        selected_agent: agent.id.clone(),
        confidence,
    })
}
