use serde::{Deserialize, Serialize};

/// Events emitted during streaming completions.
/// Provider-agnostic: translated from the wire format in the provider layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// A chunk of text from the assistant
    TextDelta { text: String },
    /// Fragment of a tool call. Fragments sharing an `index` belong to one
    /// call; `id` and `name` usually arrive only on the first one.
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments_delta: String,
    },
    /// The entire message is complete
    MessageEnd { finish_reason: FinishReason },
    /// An error occurred during streaming
    Error { message: String },
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Normal end of response
    Stop,
    /// Model wants to use tools
    ToolCalls,
    /// Hit max tokens limit
    Length,
    StopSequence,
    ContentFilter,
}

impl FinishReason {
    /// Map a wire finish reason. Unrecognised values count as a normal stop.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "tool_calls" | "function_call" | "tool_use" => FinishReason::ToolCalls,
            "length" | "max_tokens" => FinishReason::Length,
            "stop_sequence" => FinishReason::StopSequence,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        }
    }

    pub fn is_tool_calls(self) -> bool {
        self == FinishReason::ToolCalls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_finish_reason() {
        assert_eq!(FinishReason::parse("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::parse("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::parse("length"), FinishReason::Length);
        assert_eq!(FinishReason::parse("something_new"), FinishReason::Stop);
        assert!(FinishReason::parse("function_call").is_tool_calls());
    }
}
