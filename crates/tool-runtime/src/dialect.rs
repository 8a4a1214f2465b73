//! Provider-specific envelopes for tool definitions and tool results.
//!
//! Every dialect encodes the same canonical schema; only the wrapping and
//! key casing differ.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::tool::{ToolDefinition, ToolResult};

/// Completion-provider schema dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolDialect {
    Claude,
    Bedrock,
    OpenAi,
    DeepInfra,
}

impl ToolDialect {
    /// Render one item in this dialect.
    pub fn render<T: DialectFormat + ?Sized>(self, item: &T) -> Value {
        match self {
            ToolDialect::Claude => item.to_claude_format(),
            ToolDialect::Bedrock => item.to_bedrock_format(),
            ToolDialect::OpenAi => item.to_openai_format(),
            ToolDialect::DeepInfra => item.to_deepinfra_format(),
        }
    }
}

impl std::fmt::Display for ToolDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ToolDialect::Claude => "claude",
            ToolDialect::Bedrock => "bedrock",
            ToolDialect::OpenAi => "openai",
            ToolDialect::DeepInfra => "deepinfra",
        };
        f.write_str(s)
    }
}

/// Implemented once per wire type that has a dialect-specific shape.
pub trait DialectFormat {
    fn to_claude_format(&self) -> Value;
    fn to_bedrock_format(&self) -> Value;
    fn to_openai_format(&self) -> Value;
    fn to_deepinfra_format(&self) -> Value;
}

impl DialectFormat for ToolDefinition {
    fn to_claude_format(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.input_schema(),
        })
    }

    fn to_bedrock_format(&self) -> Value {
        json!({
            "toolSpec": {
                "name": self.name,
                "description": self.description,
                "inputSchema": { "json": self.input_schema() },
            }
        })
    }

    fn to_openai_format(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": self.properties(),
                    "required": self.required,
                    "additionalProperties": false,
                },
                "strict": self.strict,
            }
        })
    }

    // DeepInfra speaks the OpenAI function envelope.
    fn to_deepinfra_format(&self) -> Value {
        self.to_openai_format()
    }
}

impl DialectFormat for ToolResult {
    fn to_claude_format(&self) -> Value {
        let mut v = json!({
            "type": "tool_result",
            "tool_use_id": self.tool_call_id,
            "content": self.content,
        });
        if self.is_error {
            v["is_error"] = Value::Bool(true);
        }
        v
    }

    fn to_bedrock_format(&self) -> Value {
        let mut inner = json!({
            "toolUseId": self.tool_call_id,
            "content": [{ "text": self.content }],
        });
        if self.is_error {
            inner["status"] = Value::String("error".into());
        }
        json!({ "toolResult": inner })
    }

    fn to_openai_format(&self) -> Value {
        json!({
            "role": "tool",
            "name": self.tool_name,
            "tool_call_id": self.tool_call_id,
            "content": self.content,
        })
    }

    fn to_deepinfra_format(&self) -> Value {
        json!({
            "tool_call_id": self.tool_call_id,
            "role": "tool",
            "content": self.content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ParamType;

    fn sample() -> ToolDefinition {
        ToolDefinition::new("post_x", "Post a message")
            .param("tweet_text", ParamType::String, "Text to post")
            .required(&["tweet_text"])
            .strict(true)
    }

    #[test]
    fn test_claude_definition() {
        let v = ToolDialect::Claude.render(&sample());
        assert_eq!(v["name"], "post_x");
        assert_eq!(v["input_schema"]["type"], "object");
        assert_eq!(v["input_schema"]["required"][0], "tweet_text");
    }

    #[test]
    fn test_bedrock_definition() {
        let v = ToolDialect::Bedrock.render(&sample());
        let schema = &v["toolSpec"]["inputSchema"]["json"];
        assert_eq!(v["toolSpec"]["name"], "post_x");
        assert_eq!(schema["properties"]["tweet_text"]["type"], "string");
    }

    #[test]
    fn test_openai_and_deepinfra_definitions_match() {
        let def = sample();
        let openai = ToolDialect::OpenAi.render(&def);
        assert_eq!(openai["type"], "function");
        assert_eq!(openai["function"]["name"], "post_x");
        assert_eq!(openai["function"]["parameters"]["additionalProperties"], false);
        assert_eq!(openai["function"]["strict"], true);
        assert_eq!(openai, ToolDialect::DeepInfra.render(&def));
    }

    #[test]
    fn test_result_envelopes() {
        let result = ToolResult::error("call_9", "post_x", "Tool 'post_x' failed: boom");

        let claude = ToolDialect::Claude.render(&result);
        assert_eq!(claude["type"], "tool_result");
        assert_eq!(claude["tool_use_id"], "call_9");
        assert_eq!(claude["is_error"], true);

        let bedrock = ToolDialect::Bedrock.render(&result);
        assert_eq!(bedrock["toolResult"]["toolUseId"], "call_9");
        assert_eq!(bedrock["toolResult"]["content"][0]["text"], "Tool 'post_x' failed: boom");
        assert_eq!(bedrock["toolResult"]["status"], "error");

        let openai = ToolDialect::OpenAi.render(&result);
        assert_eq!(openai["role"], "tool");
        assert_eq!(openai["name"], "post_x");

        let deepinfra = ToolDialect::DeepInfra.render(&result);
        assert_eq!(deepinfra["role"], "tool");
        assert!(deepinfra.get("name").is_none());
    }

    #[test]
    fn test_success_result_has_no_error_marker() {
        let result = ToolResult::ok("c", "echo", "fine");
        assert!(ToolDialect::Claude.render(&result).get("is_error").is_none());
        assert!(ToolDialect::Bedrock.render(&result)["toolResult"].get("status").is_none());
    }
}
