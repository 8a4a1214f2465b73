//! Translation between provider-agnostic conversation types and the
//! OpenAI chat-completions format.

use serde_json::{json, Value};

use rx_tool_runtime::{
    CompletionChoice, CompletionRequest, CompletionResponse, ConversationMessage, DialectFormat,
    FinishReason, LlmError, ToolCall, ToolChoice, ToolDialect,
};

/// Translate a [`ConversationMessage`] into an OpenAI message object.
pub(super) fn message_to_openai(msg: &ConversationMessage, dialect: ToolDialect) -> Value {
    match msg {
        ConversationMessage::System(text) => json!({
            "role": "system",
            "content": text,
        }),
        ConversationMessage::User(text) => json!({
            "role": "user",
            "content": text,
        }),
        ConversationMessage::Assistant(content) => {
            let mut message = json!({
                "role": "assistant",
                "content": content.text,
            });
            if !content.tool_calls.is_empty() {
                let calls: Vec<Value> = content
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": { "name": tc.name, "arguments": tc.arguments },
                        })
                    })
                    .collect();
                message["tool_calls"] = Value::Array(calls);
            }
            message
        }
        ConversationMessage::ToolResult(result) => match dialect {
            ToolDialect::DeepInfra => result.to_deepinfra_format(),
            _ => result.to_openai_format(),
        },
    }
}

fn tool_choice_to_openai(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Tool(name) => json!({ "type": "function", "function": { "name": name } }),
    }
}

/// Build the request body for `/chat/completions`.
pub(super) fn build_body(request: &CompletionRequest, dialect: ToolDialect) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| message_to_openai(m, dialect))
        .collect();

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "max_tokens": request.inference.max_tokens,
        "stream": request.stream,
    });
    if let Some(t) = request.inference.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(p) = request.inference.top_p {
        body["top_p"] = json!(p);
    }
    if !request.inference.stop_sequences.is_empty() {
        body["stop"] = json!(request.inference.stop_sequences);
    }
    if !request.tools.is_empty() {
        body["tools"] = Value::Array(request.tools.clone());
        if let Some(choice) = &request.tool_choice {
            body["tool_choice"] = tool_choice_to_openai(choice);
        }
    }
    body
}

fn tool_call_from_openai(raw: &Value) -> ToolCall {
    let function = &raw["function"];
    // Some compatible servers send arguments as an object rather than a string.
    let arguments = match &function["arguments"] {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    ToolCall {
        id: raw["id"].as_str().unwrap_or_default().to_string(),
        name: function["name"].as_str().unwrap_or_default().to_string(),
        arguments,
    }
}

/// Parse a non-streaming `/chat/completions` response body.
pub(super) fn parse_completion(body: &Value) -> Result<CompletionResponse, LlmError> {
    let choices = body["choices"]
        .as_array()
        .ok_or_else(|| LlmError::InvalidResponse("missing 'choices' array".into()))?;

    let choices = choices
        .iter()
        .map(|choice| {
            let message = &choice["message"];
            CompletionChoice {
                finish_reason: choice["finish_reason"].as_str().map(FinishReason::parse),
                content: message["content"].as_str().map(String::from),
                tool_calls: message["tool_calls"]
                    .as_array()
                    .map(|calls| calls.iter().map(tool_call_from_openai).collect()),
            }
        })
        .collect();

    Ok(CompletionResponse { choices })
}

/// Map a non-success HTTP status to an [`LlmError`].
pub(super) fn status_error(status: u16, body: String, retry_after: Option<u64>) -> LlmError {
    match status {
        401 | 403 => LlmError::AuthError,
        429 => LlmError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(30),
        },
        _ => LlmError::ApiError {
            status,
            message: body,
        },
    }
}
