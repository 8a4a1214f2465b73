pub mod conversation;
pub mod dialect;
pub mod provider;
pub mod registry;
pub mod runtime;
pub mod stream;
pub mod tool;
pub mod tools;

pub use conversation::{AssistantContent, Conversation, ConversationMessage};
pub use dialect::{DialectFormat, ToolDialect};
pub use provider::{
    CompletionChoice, CompletionClient, CompletionRequest, CompletionResponse, CompletionStream,
    LlmError, ToolChoice,
};
pub use registry::{RegistryError, ToolRegistry};
pub use runtime::{
    RecursiveToolLoop, TokenSink, ToolConfig, ToolHandler, ToolLoopError, TurnOutcome,
    DEFAULT_RECURSION_BUDGET,
};
pub use stream::{FinishReason, StreamEvent};
pub use tool::{
    ParamType, ParameterSpec, Tool, ToolCall, ToolContext, ToolDefinition, ToolError,
    ToolInvocation, ToolResult,
};
pub use tools::PostXTool;
