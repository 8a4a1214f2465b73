//! OpenAI-compatible implementation of [`CompletionClient`].
//!
//! Talks to `/chat/completions` on any OpenAI-compatible endpoint (OpenAI,
//! DeepInfra), single-shot or streaming via SSE, translating between the wire
//! format and the provider-agnostic [`StreamEvent`] / [`ConversationMessage`]
//! types.
//!
//! [`CompletionClient`]: rx_tool_runtime::CompletionClient
//! [`StreamEvent`]: rx_tool_runtime::StreamEvent
//! [`ConversationMessage`]: rx_tool_runtime::ConversationMessage

mod client;
mod sse;
mod translate;

pub use self::client::OpenAiCompletionClient;
