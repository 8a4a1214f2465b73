use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use rx_core::config::OrchestratorConfig;
use rx_core::RxError;

use crate::agent::{agent_id_from_name, Agent, AgentResponse};
use crate::classifier::{AgentDescriptor, Classifier};
use crate::storage::{ChatMessage, InMemoryChatStorage};
use crate::team::TeamLifecycleManager;

/// How a request routed to a team is spread over its roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamDispatch {
    /// Every roster agent answers, one after another; outputs are joined.
    Broadcast,
    /// The next agent by a rotating counter answers alone.
    RoundRobin,
}

/// Something the classifier can select.
pub enum RouteTarget {
    Agent(Arc<Agent>),
    Team {
        manager: Arc<TeamLifecycleManager>,
        dispatch: TeamDispatch,
        cursor: AtomicUsize,
    },
}

impl RouteTarget {
    fn descriptor(&self, id: &str) -> AgentDescriptor {
        match self {
            RouteTarget::Agent(agent) => AgentDescriptor::new(id, agent.description()),
            RouteTarget::Team { manager, .. } => AgentDescriptor::new(id, manager.description()),
        }
    }
}

/// Final answer for one routed request.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResponse {
    /// Id of the selected target
    pub target_id: String,
    /// Display name of the answering agent, or of the team
    pub agent_name: String,
    pub output: String,
    /// `None` when the default agent was used after a classification failure
    pub confidence: Option<f64>,
    pub agents_used: Vec<String>,
    pub execution_time_ms: u64,
}

/// Routes requests to registered agents and teams, keeping per-agent history.
pub struct Orchestrator {
    config: OrchestratorConfig,
    classifier: Arc<dyn Classifier>,
    storage: Arc<InMemoryChatStorage>,
    targets: Vec<(String, RouteTarget)>,
    span: Span,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            config,
            classifier,
            storage: Arc::new(InMemoryChatStorage::new()),
            targets: Vec::new(),
            span: info_span!("orchestrator"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_storage(mut self, storage: Arc<InMemoryChatStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn add_agent(&mut self, agent: Agent) -> Result<(), RxError> {
        let id = agent.id().to_string();
        self.insert(id, RouteTarget::Agent(Arc::new(agent)))
    }

    pub fn add_team(&mut self, manager: Arc<TeamLifecycleManager>, dispatch: TeamDispatch) -> Result<(), RxError> {
        let id = agent_id_from_name(manager.name());
        self.insert(
            id,
            RouteTarget::Team {
                manager,
                dispatch,
                cursor: AtomicUsize::new(0),
            },
        )
    }

    fn insert(&mut self, id: String, target: RouteTarget) -> Result<(), RxError> {
        if self.targets.iter().any(|(existing, _)| *existing == id) {
            return Err(RxError::Configuration(format!("duplicate agent id '{id}'")));
        }
        info!(agent = %id, "registered route target");
        self.targets.push((id, target));
        Ok(())
    }

    pub fn descriptors(&self) -> Vec<AgentDescriptor> {
        self.targets.iter().map(|(id, t)| t.descriptor(id)).collect()
    }

    pub fn teams(&self) -> impl Iterator<Item = &Arc<TeamLifecycleManager>> {
        self.targets.iter().filter_map(|(_, t)| match t {
            RouteTarget::Team { manager, .. } => Some(manager),
            RouteTarget::Agent(_) => None,
        })
    }

    pub fn storage(&self) -> &Arc<InMemoryChatStorage> {
        &self.storage
    }

    /// Open a new session id, force-refreshing every team's credentials first.
    pub async fn start_session(&self) -> String {
        for team in self.teams() {
            if let Err(e) = team.force_refresh().await {
                warn!(team = %team.name(), error = %e, "session start refresh failed");
            }
        }
        Uuid::new_v4().to_string()
    }

    fn target(&self, id: &str) -> Option<&RouteTarget> {
        self.targets.iter().find(|(t, _)| t == id).map(|(_, t)| t)
    }

    /// Classify `input`, run the chosen agent or team and record the exchange.
    pub async fn route_request(
        &self,
        input: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<RouteResponse, RxError> {
        self.route(input, user_id, session_id)
            .instrument(self.span.clone())
            .await
    }

    async fn route(&self, input: &str, user_id: &str, session_id: &str) -> Result<RouteResponse, RxError> {
        let started = Instant::now();
        let global = self.storage.fetch_all_chats(user_id, session_id).await;

        let (target_id, confidence) = match self
            .classifier
            .classify(input, &global, &self.descriptors())
            .await
        {
            Ok(result) => {
                if self.config.log_classifier_output {
                    info!(selected = %result.selected_agent, confidence = result.confidence, "classifier output");
                }
                (result.selected_agent, Some(result.confidence))
            }
            Err(e) if self.config.use_default_agent_if_none_identified => {
                warn!(error = %e, default = %self.config.default_agent, "classification failed, using default agent");
                (self.config.default_agent.clone(), None)
            }
            Err(e) => return Err(e.into()),
        };

        let target = self
            .target(&target_id)
            .ok_or_else(|| RxError::AgentNotFound(target_id.clone()))?;

        let (agent_name, output, agents_used) = match target {
            RouteTarget::Agent(agent) => {
                let response = self.run_agent(agent, input, user_id, session_id, &global).await?;
                self.record(user_id, session_id, agent, input, &response).await;
                (response.agent_name.clone(), response.output, vec![response.agent_name])
            }
            RouteTarget::Team {
                manager,
                dispatch,
                cursor,
            } => {
                let roster = manager.roster();
                if roster.is_empty() {
                    return Err(RxError::AgentNotFound(format!(
                        "team '{}' has no agents",
                        manager.name()
                    )));
                }
                let members: Vec<Arc<Agent>> = match dispatch {
                    TeamDispatch::Broadcast => roster.to_vec(),
                    TeamDispatch::RoundRobin => {
                        let idx = cursor.fetch_add(1, Ordering::Relaxed) % roster.len();
                        vec![roster[idx].clone()]
                    }
                };

                let mut responses = Vec::with_capacity(members.len());
                for agent in &members {
                    responses.push(self.run_agent(agent, input, user_id, session_id, &global).await?);
                }
                for (agent, response) in members.iter().zip(&responses) {
                    self.record(user_id, session_id, agent, input, response).await;
                }

                let name = match dispatch {
                    TeamDispatch::Broadcast => manager.name().to_string(),
                    TeamDispatch::RoundRobin => responses[0].agent_name.clone(),
                };
                let output = responses
                    .iter()
                    .map(|r| r.output.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                let used = responses.into_iter().map(|r| r.agent_name).collect();
                (name, output, used)
            }
        };

        let execution_time_ms = started.elapsed().as_millis() as u64;
        if self.config.log_execution_times {
            info!(agent = %target_id, elapsed_ms = execution_time_ms, "request routed");
        }

        Ok(RouteResponse {
            target_id,
            agent_name,
            output,
            confidence,
            agents_used,
            execution_time_ms,
        })
    }

    async fn run_agent(
        &self,
        agent: &Agent,
        input: &str,
        user_id: &str,
        session_id: &str,
        global: &[ChatMessage],
    ) -> Result<AgentResponse, RxError> {
        let history = self.storage.fetch_chat(user_id, session_id, agent.id()).await;
        let response = agent.process_request(input, &history, global).await?;
        if self.config.log_agent_chat {
            info!(agent = %agent.name(), input = %input, output = %response.output, "agent chat");
        }
        Ok(response)
    }

    async fn record(&self, user_id: &str, session_id: &str, agent: &Agent, input: &str, response: &AgentResponse) {
        self.storage
            .save_pair(
                user_id,
                session_id,
                agent.id(),
                input,
                &response.output,
                self.config.max_message_pairs_per_agent,
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentOptions;
    use crate::classifier::{ClassificationError, ClassifierResult};
    use crate::credentials::{AuthenticationError, CredentialSource, IdentityCredential};
    use crate::team::{AgentFactory, RefreshSchedule};
    use async_trait::async_trait;
    use rx_core::Credential;
    use rx_tool_runtime::provider::mock::MockCompletionClient;
    use std::sync::Mutex;

    /// Returns the scripted selection, or a failure when `None`.
    struct FixedClassifier {
        selection: Option<&'static str>,
        seen_history: Mutex<Vec<usize>>,
    }

    impl FixedClassifier {
        fn new(selection: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                selection,
                seen_history: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(
            &self,
            _input: &str,
            history: &[ChatMessage],
            _agents: &[AgentDescriptor],
        ) -> Result<ClassifierResult, ClassificationError> {
            self.seen_history.lock().unwrap().push(history.len());
            match self.selection {
                Some(id) => Ok(ClassifierResult {
                    selected_agent: id.to_string(),
                    confidence: 0.9,
                }),
                None => Err(ClassificationError::MissingToolCall),
            }
        }
    }

    struct CountingSource {
        calls: AtomicUsize,
        size: usize,
    }

    #[async_trait]
    impl CredentialSource for CountingSource {
        async fn fetch(&self) -> Result<Vec<IdentityCredential>, AuthenticationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((1..=self.size)
                .map(|i| IdentityCredential {
                    identity: format!("id-{i}"),
                    credential: Credential::new(format!("tok-{n}-{i}")),
                })
                .collect())
        }
    }

    /// Team members that echo a fixed reply per position.
    struct EchoFactory(Arc<MockCompletionClient>);

    impl AgentFactory for EchoFactory {
        fn build(&self, position: usize, credential: Credential) -> Agent {
            Agent::new(
                AgentOptions::new(format!("RX_Agent_{position}"), "poster", "m").with_credential(credential),
                self.0.clone(),
            )
        }
    }

    fn agent(client: &Arc<MockCompletionClient>, name: &str) -> Agent {
        Agent::new(AgentOptions::new(name, format!("{name} desc"), "m"), client.clone())
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            max_message_pairs_per_agent: 2,
            ..OrchestratorConfig::default()
        }
    }

    async fn team(client: &Arc<MockCompletionClient>, size: usize) -> (Arc<TeamLifecycleManager>, Arc<CountingSource>) {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            size,
        });
        let manager = Arc::new(TeamLifecycleManager::new(
            "RX Team",
            "Posts to X",
            source.clone(),
            Arc::new(EchoFactory(client.clone())),
            RefreshSchedule::default(),
        ));
        manager.initialize().await.unwrap();
        (manager, source)
    }

    #[tokio::test]
    async fn test_routes_to_selected_agent_and_stores_history() {
        let client = Arc::new(MockCompletionClient::new());
        client.queue_text("Rome in May");
        client.queue_text("Bring sunscreen");
        let classifier = FixedClassifier::new(Some("travel-agent"));
        let mut orchestrator = Orchestrator::new(config(), classifier.clone());
        orchestrator.add_agent(agent(&client, "Travel Agent")).unwrap();
        orchestrator.add_agent(agent(&client, "General Agent")).unwrap();

        let first = orchestrator.route_request("Where to?", "u1", "s1").await.unwrap();
        assert_eq!(first.target_id, "travel-agent");
        assert_eq!(first.output, "Rome in May");
        assert_eq!(first.confidence, Some(0.9));

        orchestrator.route_request("What to pack?", "u1", "s1").await.unwrap();

        // Second turn saw the first exchange, both in classifier and agent history.
        assert_eq!(*classifier.seen_history.lock().unwrap(), vec![0, 2]);
        assert_eq!(client.requests()[1].messages.len(), 4);
        let chat = orchestrator.storage().fetch_chat("u1", "s1", "travel-agent").await;
        assert_eq!(chat.len(), 4);
    }

    #[tokio::test]
    async fn test_classification_failure_falls_back_to_default() {
        let client = Arc::new(MockCompletionClient::new());
        client.queue_text("Hello there");
        let mut orchestrator = Orchestrator::new(config(), FixedClassifier::new(None));
        orchestrator.add_agent(agent(&client, "General Agent")).unwrap();

        let response = orchestrator.route_request("hi", "u", "s").await.unwrap();
        assert_eq!(response.target_id, "general-agent");
        assert_eq!(response.confidence, None);
    }

    #[tokio::test]
    async fn test_classification_failure_surfaces_without_default() {
        let client = Arc::new(MockCompletionClient::new());
        let mut orchestrator = Orchestrator::new(
            OrchestratorConfig {
                use_default_agent_if_none_identified: false,
                ..config()
            },
            FixedClassifier::new(None),
        );
        orchestrator.add_agent(agent(&client, "General Agent")).unwrap();

        let err = orchestrator.route_request("hi", "u", "s").await.unwrap_err();
        assert!(matches!(err, RxError::Classification(_)));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_target_and_duplicate_ids() {
        let client = Arc::new(MockCompletionClient::new());
        let mut orchestrator = Orchestrator::new(config(), FixedClassifier::new(Some("chef")));
        orchestrator.add_agent(agent(&client, "General Agent")).unwrap();
        assert!(matches!(
            orchestrator.add_agent(agent(&client, "general agent")),
            Err(RxError::Configuration(_))
        ));
        let err = orchestrator.route_request("hi", "u", "s").await.unwrap_err();
        assert!(matches!(err, RxError::AgentNotFound(id) if id == "chef"));
    }

    #[tokio::test]
    async fn test_team_broadcast_joins_outputs() {
        let client = Arc::new(MockCompletionClient::new());
        client.queue_text("one");
        client.queue_text("two");
        let (manager, _) = team(&client, 2).await;
        let mut orchestrator = Orchestrator::new(config(), FixedClassifier::new(Some("rx-team")));
        orchestrator.add_team(manager, TeamDispatch::Broadcast).unwrap();

        let response = orchestrator.route_request("post gm", "u", "s").await.unwrap();
        assert_eq!(response.output, "one\n\ntwo");
        assert_eq!(response.agent_name, "RX Team");
        assert_eq!(response.agents_used, vec!["RX_Agent_1", "RX_Agent_2"]);
        assert_eq!(orchestrator.storage().fetch_all_chats("u", "s").await.len(), 4);
    }

    #[tokio::test]
    async fn test_team_round_robin_rotates() {
        let client = Arc::new(MockCompletionClient::new());
        for reply in ["a", "b", "c"] {
            client.queue_text(reply);
        }
        let (manager, _) = team(&client, 2).await;
        let mut orchestrator = Orchestrator::new(config(), FixedClassifier::new(Some("rx-team")));
        orchestrator.add_team(manager, TeamDispatch::RoundRobin).unwrap();

        let mut used = Vec::new();
        for _ in 0..3 {
            used.push(orchestrator.route_request("post", "u", "s").await.unwrap().agent_name);
        }
        assert_eq!(used, vec!["RX_Agent_1", "RX_Agent_2", "RX_Agent_1"]);
    }

    #[tokio::test]
    async fn test_start_session_force_refreshes_teams() {
        let client = Arc::new(MockCompletionClient::new());
        let (manager, source) = team(&client, 1).await;
        let mut orchestrator = Orchestrator::new(config(), FixedClassifier::new(None));
        orchestrator.add_team(manager.clone(), TeamDispatch::RoundRobin).unwrap();

        let a = orchestrator.start_session().await;
        let b = orchestrator.start_session().await;
        assert_ne!(a, b);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(manager.roster()[0].credential().unwrap().expose(), "tok-2-1");
        manager.teardown();
    }
}
