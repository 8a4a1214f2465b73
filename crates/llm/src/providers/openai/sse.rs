//! SSE framing and chunk parsing for the OpenAI streaming API.

use serde_json::Value;
use tracing::trace;

use rx_tool_runtime::{FinishReason, LlmError, StreamEvent};

/// One complete SSE frame.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum SseFrame {
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Reassembles SSE lines from arbitrarily split byte chunks. Lines are only
/// decoded once complete, so multi-byte characters may straddle chunks.
#[derive(Default)]
pub(super) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every frame completed by it.
    pub(super) fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = parse_line(line.trim_end_matches(['\n', '\r'])) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing line that had no newline.
    pub(super) fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(String::from_utf8_lossy(&rest).trim())
    }
}

fn parse_line(line: &str) -> Option<SseFrame> {
    // Comments (":"), "event:" and "id:" lines carry nothing we use.
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseFrame::Done);
    }
    Some(SseFrame::Data(data.to_string()))
}

/// Parse one `chat.completion.chunk` payload into zero or more [`StreamEvent`]s.
pub(super) fn parse_chunk(data: &str) -> Result<Vec<StreamEvent>, LlmError> {
    let parsed: Value = serde_json::from_str(data)
        .map_err(|e| LlmError::StreamError(format!("malformed chunk: {e}")))?;

    if let Some(error) = parsed.get("error") {
        let message = error["message"]
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| error.to_string());
        return Ok(vec![StreamEvent::Error { message }]);
    }

    let mut events = Vec::new();
    let Some(choice) = parsed["choices"].get(0) else {
        trace!("chunk without choices");
        return Ok(events);
    };
    let delta = &choice["delta"];

    if let Some(text) = delta["content"].as_str() {
        if !text.is_empty() {
            events.push(StreamEvent::TextDelta {
                text: text.to_string(),
            });
        }
    }

    if let Some(calls) = delta["tool_calls"].as_array() {
        for (position, call) in calls.iter().enumerate() {
            let index = call["index"].as_u64().map(|i| i as usize).unwrap_or(position);
            events.push(StreamEvent::ToolCallDelta {
                index,
                id: call["id"].as_str().map(String::from),
                name: call["function"]["name"].as_str().map(String::from),
                arguments_delta: call["function"]["arguments"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
            });
        }
    }

    if let Some(reason) = choice["finish_reason"].as_str() {
        events.push(StreamEvent::MessageEnd {
            finish_reason: FinishReason::parse(reason),
        });
    }

    Ok(events)
}
