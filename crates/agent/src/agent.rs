use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, info_span};

use rx_core::{Credential, InferenceConfig, RxError};
use rx_tool_runtime::{
    AssistantContent, CompletionClient, Conversation, RecursiveToolLoop, TokenSink, ToolConfig,
    ToolContext, DEFAULT_RECURSION_BUDGET,
};

use crate::config::AgentDefinition;
use crate::storage::{ChatMessage, ChatRole};
use crate::template::{render_template, TemplateVariables};

/// Global-history messages appended to the system prompt.
pub const GLOBAL_CONTEXT_LIMIT: usize = 10;

/// Supplies extra context for a request (e.g. a knowledge-base lookup).
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, input: &str) -> Result<String, RxError>;
}

/// Derive an agent id from its display name: lowercase, whitespace becomes
/// `-`, every other non-alphanumeric character is dropped.
pub fn agent_id_from_name(name: &str) -> String {
    name.chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('-')
            } else if c.is_alphanumeric() {
                Some(c.to_ascii_lowercase())
            } else {
                None
            }
        })
        .collect()
}

/// Everything needed to build an [`Agent`].
#[derive(Clone)]
pub struct AgentOptions {
    pub name: String,
    pub description: String,
    pub model: String,
    pub prompt_template: String,
    pub variables: TemplateVariables,
    pub inference: InferenceConfig,
    pub streaming: bool,
    pub recursion_budget: usize,
    pub tools: ToolConfig,
    pub credential: Option<Credential>,
    pub retriever: Option<Arc<dyn Retriever>>,
    pub token_sink: Option<Arc<dyn TokenSink>>,
    pub share_global_memory: bool,
}

impl AgentOptions {
    pub fn new(name: impl Into<String>, description: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            model: model.into(),
            prompt_template: String::new(),
            variables: TemplateVariables::new(),
            inference: InferenceConfig::default(),
            streaming: false,
            recursion_budget: DEFAULT_RECURSION_BUDGET,
            tools: ToolConfig::NoTools,
            credential: None,
            retriever: None,
            token_sink: None,
            share_global_memory: false,
        }
    }

    /// Options for a Markdown-defined agent. `default_model` applies when the
    /// definition names none.
    pub fn from_definition(def: &AgentDefinition, default_model: &str, tools: ToolConfig) -> Self {
        Self {
            prompt_template: def.prompt_template.clone(),
            variables: def.variables.clone(),
            inference: def.inference.clone(),
            streaming: def.streaming,
            recursion_budget: def.max_recursions.unwrap_or(DEFAULT_RECURSION_BUDGET),
            tools,
            share_global_memory: def.share_global_memory,
            ..Self::new(
                def.name.clone(),
                def.description.clone(),
                def.model.clone().unwrap_or_else(|| default_model.to_string()),
            )
        }
    }

    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = template.into();
        self
    }

    pub fn with_inference(mut self, inference: InferenceConfig) -> Self {
        self.inference = inference;
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_recursion_budget(mut self, budget: usize) -> Self {
        self.recursion_budget = budget;
        self
    }

    pub fn with_tools(mut self, tools: ToolConfig) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_token_sink(mut self, sink: Arc<dyn TokenSink>) -> Self {
        self.token_sink = Some(sink);
        self
    }

    pub fn with_global_memory(mut self, share: bool) -> Self {
        self.share_global_memory = share;
        self
    }
}

/// Reply of one agent turn.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
    pub agent_name: String,
    pub output: String,
    pub rounds: usize,
    pub execution_time_ms: u64,
}

/// A language-model agent bound to one completion client.
///
/// The credential is the only mutable state and is swapped wholesale through
/// [`Agent::update_credential`].
pub struct Agent {
    id: String,
    options: AgentOptions,
    client: Arc<dyn CompletionClient>,
    system_prompt: String,
    credential: RwLock<Option<Credential>>,
}

impl Agent {
    pub fn new(options: AgentOptions, client: Arc<dyn CompletionClient>) -> Self {
        let id = agent_id_from_name(&options.name);
        let system_prompt = render_template(&options.prompt_template, &options.variables);
        let credential = RwLock::new(options.credential.clone());
        Self {
            id,
            options,
            client,
            system_prompt,
            credential,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn description(&self) -> &str {
        &self.options.description
    }

    pub fn model(&self) -> &str {
        &self.options.model
    }

    pub fn is_streaming(&self) -> bool {
        self.options.streaming
    }

    pub fn shares_global_memory(&self) -> bool {
        self.options.share_global_memory
    }

    pub fn recursion_budget(&self) -> usize {
        self.options.tools.max_rounds().unwrap_or(self.options.recursion_budget)
    }

    /// The rendered system prompt, before any per-request context.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Replace the credential. Requests already running keep the one they captured.
    pub fn update_credential(&self, credential: Credential) {
        match self.credential.write() {
            Ok(mut slot) => *slot = Some(credential),
            Err(poisoned) => *poisoned.into_inner() = Some(credential),
        }
    }

    pub fn credential(&self) -> Option<Credential> {
        match self.credential.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Run one turn for `input`.
    ///
    /// `history` is this agent's own conversation; `global_history` is the
    /// whole session and is only used when global memory is shared.
    pub async fn process_request(
        &self,
        input: &str,
        history: &[ChatMessage],
        global_history: &[ChatMessage],
    ) -> Result<AgentResponse, RxError> {
        let started = Instant::now();
        let context = ToolContext::new(self.name(), self.credential());

        let mut system_prompt = self.system_prompt.clone();
        if let Some(global) = self.history_context(global_history) {
            system_prompt.push_str(&global);
        }
        if let Some(retriever) = &self.options.retriever {
            let extra = retriever.retrieve(input).await?;
            system_prompt.push_str("\nHere is the context to use to answer the user's question:\n");
            system_prompt.push_str(&extra);
        }

        let mut conversation = Conversation::with_system_prompt(system_prompt);
        for message in history {
            match message.role {
                ChatRole::User => conversation.add_user_message(message.content.clone()),
                ChatRole::Assistant => {
                    conversation.add_assistant_response(AssistantContent::text(message.content.clone()))
                }
            }
        }
        conversation.add_user_message(input);

        let tool_loop = self.tool_loop();
        let outcome = tool_loop.run(&mut conversation, &context).await?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(agent = %self.name(), rounds = outcome.rounds, elapsed_ms, "agent turn complete");

        Ok(AgentResponse {
            agent_name: self.name().to_string(),
            output: outcome.text,
            rounds: outcome.rounds,
            execution_time_ms: elapsed_ms,
        })
    }

    fn tool_loop(&self) -> RecursiveToolLoop {
        let mut tool_loop =
            RecursiveToolLoop::new(self.client.clone(), self.options.model.clone(), self.name())
                .with_tools(self.options.tools.clone())
                .with_inference(self.options.inference.clone())
                .with_streaming(self.options.streaming)
                .with_recursion_budget(self.options.recursion_budget)
                .with_span(info_span!("agent", agent = %self.name(), id = %self.id));
        if let Some(sink) = &self.options.token_sink {
            tool_loop = tool_loop.with_token_sink(sink.clone());
        }
        tool_loop
    }

    fn history_context(&self, global_history: &[ChatMessage]) -> Option<String> {
        if !self.options.share_global_memory || global_history.is_empty() {
            return None;
        }
        let start = global_history.len().saturating_sub(GLOBAL_CONTEXT_LIMIT);
        let mut context = String::from("\n\nGLOBAL CONVERSATION CONTEXT:\n");
        for message in &global_history[start..] {
            context.push_str(&format!("{}: {}\n", message.role, message.content));
        }
        Some(context)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.options.name)
            .field("model", &self.options.model)
            .field("streaming", &self.options.streaming)
            .field("tools", &self.options.tools)
            .field("credential", &self.credential())
            .finish()
    }
}
