use async_trait::async_trait;
use indexmap::IndexMap;
use rx_core::Credential;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// JSON Schema primitive accepted for a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

/// One entry of a tool's parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub description: String,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

/// Describes a tool's interface for LLM consumption.
///
/// This is the canonical form; provider-specific envelopes are produced by
/// [`crate::dialect::DialectFormat`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name within a registry (e.g. "post_x")
    pub name: String,
    /// Human-readable description for the LLM
    pub description: String,
    /// Parameters in declaration order
    pub parameters: IndexMap<String, ParameterSpec>,
    pub required: Vec<String>,
    #[serde(default)]
    pub strict: bool,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: IndexMap::new(),
            required: Vec::new(),
            strict: false,
        }
    }

    pub fn param(mut self, name: &str, kind: ParamType, description: &str) -> Self {
        self.parameters.insert(
            name.to_string(),
            ParameterSpec {
                kind,
                description: description.to_string(),
                enum_values: None,
            },
        );
        self
    }

    pub fn enum_param(mut self, name: &str, description: &str, values: &[&str]) -> Self {
        self.parameters.insert(
            name.to_string(),
            ParameterSpec {
                kind: ParamType::String,
                description: description.to_string(),
                enum_values: Some(values.iter().map(|v| v.to_string()).collect()),
            },
        );
        self
    }

    pub fn required(mut self, names: &[&str]) -> Self {
        self.required = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Check that every required name is a declared parameter.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("tool name must not be empty".to_string());
        }
        let undeclared: Vec<&str> = self
            .required
            .iter()
            .filter(|r| !self.parameters.contains_key(r.as_str()))
            .map(String::as_str)
            .collect();
        if undeclared.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "required parameters not declared: {}",
                undeclared.join(", ")
            ))
        }
    }

    /// The `properties` object of the JSON Schema.
    pub fn properties(&self) -> Value {
        serde_json::to_value(&self.parameters).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// Plain JSON Schema object: `{type, properties, required}`.
    pub fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": self.properties(),
            "required": self.required,
        })
    }
}

impl fmt::Display for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.description)
    }
}

/// Represents an LLM requesting execution of a tool, as delivered on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this invocation (used to match results)
    pub id: String,
    /// Tool name to execute
    pub name: String,
    /// Raw JSON argument payload
    pub arguments: String,
}

impl ToolCall {
    /// Parse the argument payload. An empty payload is an empty map.
    pub fn parse_arguments(&self) -> Result<Map<String, Value>, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&self.arguments)
    }
}

/// A tool call with parsed arguments, alive for one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
    /// 1-based dispatch round within the turn
    pub round: usize,
}

impl ToolInvocation {
    pub fn from_call(call: &ToolCall, round: usize) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.parse_arguments()?,
            round,
        })
    }

    /// String argument lookup.
    pub fn str_arg(&self, key: &str) -> Result<&str, ToolError> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput(format!("missing '{key}' field")))
    }
}

/// Result of executing a tool, sent back to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Must match the ToolCall id
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: String,
    /// Whether this result represents an error
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(invocation_id: &str, tool_name: &str, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: invocation_id.to_string(),
            tool_name: tool_name.to_string(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(invocation_id: &str, tool_name: &str, content: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::ok(invocation_id, tool_name, content)
        }
    }
}

/// Per-request context handed to every tool.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Display name of the agent running the turn
    pub agent_name: String,
    /// Credential captured when the request started
    pub credential: Option<Credential>,
}

impl ToolContext {
    pub fn new(agent_name: impl Into<String>, credential: Option<Credential>) -> Self {
        Self {
            agent_name: agent_name.into(),
            credential,
        }
    }
}

/// The primary extension point: all tools implement this trait.
///
/// Tools are object-safe, Send + Sync, and async. The returned string is the
/// tool's textual result; a negative outcome the model should react to is
/// still `Ok`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn execute(
        &self,
        invocation: &ToolInvocation,
        context: &ToolContext,
    ) -> Result<String, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("No credential available for agent '{0}'")]
    MissingCredential(String),
}

/// Simple echo tool for testing purposes.
#[cfg(any(test, feature = "test-utils"))]
pub struct EchoTool;

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("echo", "Echoes back the input message. For testing.")
            .param("message", ParamType::String, "The message to echo back")
            .required(&["message"])
    }

    async fn execute(
        &self,
        invocation: &ToolInvocation,
        _context: &ToolContext,
    ) -> Result<String, ToolError> {
        Ok(invocation.str_arg("message")?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_undeclared_required() {
        let def = ToolDefinition::new("bad", "broken")
            .param("a", ParamType::String, "a")
            .required(&["a", "b"]);
        let err = def.validate().unwrap_err();
        assert!(err.contains("b"));
    }

    #[test]
    fn test_input_schema_shape() {
        let def = ToolDefinition::new("pick", "Pick one")
            .enum_param("color", "A color", &["red", "blue"])
            .param("count", ParamType::Integer, "How many")
            .required(&["color"]);
        let schema = def.input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["color"]["enum"][1], "blue");
        assert_eq!(schema["properties"]["count"]["type"], "integer");
        assert!(schema["properties"]["count"].get("enum").is_none());
        assert_eq!(schema["required"], serde_json::json!(["color"]));
    }

    #[test]
    fn test_parameters_keep_declaration_order() {
        let def = ToolDefinition::new("t", "t")
            .param("zeta", ParamType::String, "z")
            .param("alpha", ParamType::String, "a");
        let names: Vec<_> = def.parameters.keys().cloned().collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_parse_arguments() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: r#"{"message": "hi"}"#.into(),
        };
        let inv = ToolInvocation::from_call(&call, 1).unwrap();
        assert_eq!(inv.str_arg("message").unwrap(), "hi");

        let empty = ToolCall {
            arguments: "  ".into(),
            ..call.clone()
        };
        assert!(empty.parse_arguments().unwrap().is_empty());

        let broken = ToolCall {
            arguments: r#"{"message": "#.into(),
            ..call
        };
        assert!(broken.parse_arguments().is_err());
    }

    #[tokio::test]
    async fn test_echo_tool() {
        let tool = EchoTool;
        assert_eq!(tool.definition().name, "echo");
        let inv = ToolInvocation {
            id: "c".into(),
            name: "echo".into(),
            arguments: serde_json::from_str(r#"{"message": "hello world"}"#).unwrap(),
            round: 1,
        };
        let out = tool.execute(&inv, &ToolContext::default()).await.unwrap();
        assert_eq!(out, "hello world");
    }
}
