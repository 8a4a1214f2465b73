use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use rx_core::{InferenceConfig, RxError};

use crate::template::TemplateVariables;

/// Agent definition loaded from a .md file with YAML frontmatter.
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub name: String,
    pub description: String,
    /// Falls back to the configured LLM model when absent.
    pub model: Option<String>,
    pub streaming: bool,
    pub inference: InferenceConfig,
    pub max_recursions: Option<usize>,
    /// Names of registry tools this agent may call.
    pub tools: Vec<String>,
    pub share_global_memory: bool,
    pub variables: TemplateVariables,
    pub prompt_template: String,
}

#[derive(Debug, Deserialize)]
struct Frontmatter {
    name: Option<String>,
    #[serde(default)]
    description: String,
    model: Option<String>,
    #[serde(default)]
    streaming: bool,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    #[serde(default)]
    stop_sequences: Vec<String>,
    max_recursions: Option<usize>,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    share_global_memory: bool,
    #[serde(default)]
    variables: TemplateVariables,
}

/// Load all agent definitions from a directory of .md files, sorted by name.
pub fn load_agents(agents_dir: &Path) -> Result<Vec<AgentDefinition>, AgentConfigError> {
    if !agents_dir.exists() {
        return Err(AgentConfigError::DirNotFound(agents_dir.to_path_buf()));
    }

    let entries = std::fs::read_dir(agents_dir)
        .map_err(|e| AgentConfigError::IoError(agents_dir.to_path_buf(), e))?;

    let mut agents = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "md") {
            match load_agent_file(&path) {
                Ok(def) => {
                    info!(agent = %def.name, streaming = def.streaming, "loaded agent definition");
                    agents.push(def);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping agent file");
                }
            }
        }
    }

    agents.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(agents)
}

/// Load a single agent definition from a .md file.
pub fn load_agent_file(path: &Path) -> Result<AgentDefinition, AgentConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AgentConfigError::IoError(path.to_path_buf(), e))?;
    parse_definition(&content, path)
}

fn parse_definition(content: &str, path: &Path) -> Result<AgentDefinition, AgentConfigError> {
    let raw = frontmatter_block(content)
        .ok_or_else(|| AgentConfigError::NoFrontmatter(path.to_path_buf()))?;
    let fm: Frontmatter = serde_yaml::from_str(raw)
        .map_err(|e| AgentConfigError::InvalidFrontmatter(path.to_path_buf(), e.to_string()))?;

    let name = fm
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AgentConfigError::MissingField(path.to_path_buf(), "name"))?;

    let defaults = InferenceConfig::default();
    Ok(AgentDefinition {
        name,
        description: fm.description,
        model: fm.model,
        streaming: fm.streaming,
        inference: InferenceConfig {
            max_tokens: fm.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: fm.temperature,
            top_p: fm.top_p,
            stop_sequences: fm.stop_sequences,
        },
        max_recursions: fm.max_recursions,
        tools: fm.tools,
        share_global_memory: fm.share_global_memory,
        variables: fm.variables,
        prompt_template: extract_body(content),
    })
}

/// The YAML between the leading `---` delimiters.
fn frontmatter_block(content: &str) -> Option<&str> {
    let after_first = content.trim_start().strip_prefix("---")?;
    let end = after_first.find("\n---")?;
    Some(&after_first[..end])
}

/// Extract the body content after the YAML frontmatter.
fn extract_body(content: &str) -> String {
    let trimmed = content.trim_start();
    let Some(after_first) = trimmed.strip_prefix("---") else {
        return content.trim().to_string();
    };
    match after_first.find("\n---") {
        Some(end) => after_first[end + 4..].trim().to_string(),
        None => content.trim().to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentConfigError {
    #[error("agents directory not found: {0}")]
    DirNotFound(PathBuf),
    #[error("I/O error reading {0}: {1}")]
    IoError(PathBuf, std::io::Error),
    #[error("no YAML frontmatter in {0}")]
    NoFrontmatter(PathBuf),
    #[error("invalid frontmatter in {0}: {1}")]
    InvalidFrontmatter(PathBuf, String),
    #[error("missing field '{1}' in {0}")]
    MissingField(PathBuf, &'static str),
}

impl From<AgentConfigError> for RxError {
    fn from(e: AgentConfigError) -> Self {
        RxError::Configuration(e.to_string())
    }
}
