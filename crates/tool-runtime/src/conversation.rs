use crate::tool::{ToolCall, ToolResult};
use serde::{Deserialize, Serialize};

/// A role-tagged message in a turn's transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConversationMessage {
    System(String),
    /// User's text input
    User(String),
    /// Assistant's response (may contain text and/or tool calls)
    Assistant(AssistantContent),
    /// Result of a tool execution
    ToolResult(ToolResult),
}

/// Content from the assistant that can contain mixed text and tool calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantContent {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// Append-only transcript for one request. Owned by the request task.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ConversationMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a transcript with a system prompt.
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ConversationMessage::System(prompt.into())],
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        match self.messages.first() {
            Some(ConversationMessage::System(p)) => Some(p),
            _ => None,
        }
    }

    pub fn add_user_message(&mut self, text: impl Into<String>) {
        self.messages.push(ConversationMessage::User(text.into()));
    }

    pub fn add_assistant_response(&mut self, content: AssistantContent) {
        self.messages.push(ConversationMessage::Assistant(content));
    }

    pub fn add_tool_result(&mut self, result: ToolResult) {
        self.messages.push(ConversationMessage::ToolResult(result));
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Tool results in transcript order.
    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResult> {
        self.messages.iter().filter_map(|m| match m {
            ConversationMessage::ToolResult(r) => Some(r),
            _ => None,
        })
    }
}
