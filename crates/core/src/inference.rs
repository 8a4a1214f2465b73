use serde::{Deserialize, Serialize};

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: None,
            top_p: None,
            stop_sequences: Vec::new(),
        }
    }
}

impl InferenceConfig {
    /// Settings used by the team's posting agents.
    pub fn posting() -> Self {
        Self {
            max_tokens: 500,
            temperature: Some(0.5),
            top_p: Some(0.8),
            stop_sequences: Vec::new(),
        }
    }
}
