use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use rx_agent::{
    load_agents, Agent, AgentDefinition, AgentOptions, HttpCredentialSource, ModelClassifier,
    Orchestrator, PostingAgentFactory, RefreshSchedule, TeamLifecycleManager,
};
use rx_core::Config;
use rx_llm::create_client;
use rx_publish::XPublisher;
use rx_tool_runtime::{CompletionClient, PostXTool, TokenSink, ToolConfig, ToolRegistry};

use crate::cli::CliArgs;

pub const TEAM_NAME: &str = "RX Team";
const TEAM_DESCRIPTION: &str = "Social media (Twitter/X) posting team - writes and publishes posts on X, \
including long posts continued as replies.";

/// Registry holding every tool an agent definition may name.
pub fn shared_tools(config: &Config) -> Result<Arc<ToolRegistry>> {
    let publisher = XPublisher::from_config(&config.publish).context("invalid X API configuration")?;
    let mut registry = ToolRegistry::new();
    registry.register(PostXTool::new(Arc::new(publisher)))?;
    Ok(Arc::new(registry))
}

/// The subset of `shared` a definition asks for.
pub fn select_tools(def: &AgentDefinition, shared: &ToolRegistry) -> Result<ToolConfig> {
    if def.tools.is_empty() {
        return Ok(ToolConfig::NoTools);
    }
    let mut registry = ToolRegistry::new();
    for name in &def.tools {
        let Some(tool) = shared.get(name) else {
            bail!("agent '{}' names unknown tool '{}'", def.name, name);
        };
        registry.register_arc(tool)?;
    }
    Ok(ToolConfig::registry(Arc::new(registry)))
}

fn classifier_client(config: &Config) -> Result<Arc<dyn CompletionClient>> {
    let mut llm = config.llm.clone();
    llm.api_key = config.classifier.api_key.clone();
    if let Some(url) = &config.classifier.base_url {
        llm.base_url = url.clone();
    }
    Ok(create_client(&llm)?)
}

/// Build the orchestrator: agents from definitions, plus the posting team
/// unless disabled or unconfigured.
pub async fn build_orchestrator(
    config: &Config,
    args: &CliArgs,
    sink: Arc<dyn TokenSink>,
) -> Result<Orchestrator> {
    let client = create_client(&config.llm).context("failed to create completion client")?;
    let classifier = ModelClassifier::from_config(classifier_client(config)?, &config.classifier);
    let mut orchestrator = Orchestrator::new(config.orchestrator.clone(), Arc::new(classifier));
    let tools = shared_tools(config)?;

    let agents_dir = args.agents_dir.as_ref().unwrap_or(&config.agents.dir);
    let definitions = load_agents(agents_dir)
        .with_context(|| format!("failed to load agents from {}", agents_dir.display()))?;
    for def in &definitions {
        let mut options = AgentOptions::from_definition(def, &config.llm.model, select_tools(def, &tools)?);
        if def.streaming {
            options = options.with_token_sink(sink.clone());
        }
        orchestrator.add_agent(Agent::new(options, client.clone()))?;
    }
    info!(agents = definitions.len(), "agents registered");

    if args.no_team {
        info!("posting team disabled by flag");
    } else if !config.team.is_configured() {
        warn!("RX_TEAM_AUTH_KEY not set, posting team disabled");
    } else {
        let factory = PostingAgentFactory::new(client.clone(), config.llm.model.clone(), tools, &config.team)
            .with_token_sink(sink);
        let team = TeamLifecycleManager::new(
            TEAM_NAME,
            TEAM_DESCRIPTION,
            Arc::new(HttpCredentialSource::from_config(&config.team)?),
            Arc::new(factory),
            RefreshSchedule::from_config(&config.team),
        );
        team.initialize().await.context("posting team authentication failed")?;
        orchestrator.add_team(Arc::new(team), args.team_dispatch.into())?;
    }

    Ok(orchestrator)
}
