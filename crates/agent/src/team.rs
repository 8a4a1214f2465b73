//! Credentialed posting team with timed refresh.
//!
//! The manager owns one background task that sleeps until the next refresh
//! deadline, re-authenticates and reconciles the roster. Readers always get
//! an immutable snapshot ([`Roster`]); a refresh builds the next roster on the
//! side and publishes it in a single swap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{info, info_span, warn, Instrument, Span};

use rx_core::config::TeamConfig;
use rx_core::{Credential, InferenceConfig, RxError};
use rx_tool_runtime::{CompletionClient, TokenSink, ToolConfig, ToolRegistry};

use crate::agent::{Agent, AgentOptions};
use crate::credentials::{CredentialSource, IdentityCredential};
use crate::template::TemplateVariables;

/// Immutable roster snapshot. Position `i` is agent `#i+1`.
pub type Roster = Arc<[Arc<Agent>]>;

/// Builds the agent at a 1-based roster position.
pub trait AgentFactory: Send + Sync {
    fn build(&self, position: usize, credential: Credential) -> Agent;
}

const POSTING_PROMPT: &str = "You are {{name}}. {{description}}

Answer helpfully and accurately. Follow the user across topic changes and keep
a consistent, respectful tone.

When the user asks for a post on X:
- Base the content on the full conversation, including what the user discussed with other agents.
- Keep the user's wording when it is already clear; otherwise improve it in your own style.
- Ask for clarification when the request is ambiguous.
- Publish with the post_x tool, then report the outcome: the link when the post succeeded, the error otherwise.

The global conversation history is provided separately from your direct conversation history.";

/// Builds `{prefix}_{n}` posting agents that share one client and tool registry.
pub struct PostingAgentFactory {
    client: Arc<dyn CompletionClient>,
    model: String,
    prefix: String,
    tools: Arc<ToolRegistry>,
    max_recursions: usize,
    token_sink: Option<Arc<dyn TokenSink>>,
    streaming: bool,
}

impl PostingAgentFactory {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        config: &TeamConfig,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            prefix: config.agent_prefix.clone(),
            tools,
            max_recursions: config.max_recursions as usize,
            token_sink: None,
            streaming: false,
        }
    }

    pub fn with_token_sink(mut self, sink: Arc<dyn TokenSink>) -> Self {
        self.token_sink = Some(sink);
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

impl AgentFactory for PostingAgentFactory {
    fn build(&self, position: usize, credential: Credential) -> Agent {
        let name = format!("{}_{}", self.prefix, position);
        let description = format!(
            "Social media (Twitter/X) posting agent #{position} - can post tweets and handle replies."
        );
        let mut variables = TemplateVariables::new();
        variables.insert("name".into(), name.as_str().into());
        variables.insert("description".into(), description.as_str().into());

        let mut options = AgentOptions::new(name, description, self.model.clone())
            .with_prompt_template(POSTING_PROMPT)
            .with_inference(InferenceConfig::posting())
            .with_streaming(self.streaming)
            .with_recursion_budget(self.max_recursions)
            .with_tools(ToolConfig::registry(self.tools.clone()).with_max_rounds(self.max_recursions))
            .with_credential(credential)
            .with_global_memory(true);
        options.variables = variables;
        if let Some(sink) = &self.token_sink {
            options = options.with_token_sink(sink.clone());
        }
        Agent::new(options, self.client.clone())
    }
}

/// Refresh cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSchedule {
    pub interval: Duration,
    /// Delay before retrying a failed refresh.
    pub retry_backoff: Duration,
}

impl RefreshSchedule {
    pub fn from_config(config: &TeamConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.refresh_interval_secs),
            retry_backoff: Duration::from_secs(config.retry_backoff_secs),
        }
    }
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            retry_backoff: Duration::from_secs(30),
        }
    }
}

struct TeamShared {
    name: String,
    source: Arc<dyn CredentialSource>,
    factory: Arc<dyn AgentFactory>,
    schedule: RefreshSchedule,
    roster: RwLock<Roster>,
    /// Serialises scheduled and forced refreshes.
    refresh_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

impl TeamShared {
    fn snapshot(&self) -> Roster {
        match self.roster.read() {
            Ok(r) => r.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn publish(&self, next: Roster) {
        match self.roster.write() {
            Ok(mut r) => *r = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    async fn refresh(&self) -> Result<usize, RxError> {
        let _guard = self.refresh_lock.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(RxError::Configuration(format!("team '{}' has been torn down", self.name)));
        }

        let identities = self.source.fetch().await?;
        let current = self.snapshot();
        let next = reconcile(&current, identities, self.factory.as_ref());
        let size = next.len();
        info!(team = %self.name, before = current.len(), after = size, "roster refreshed");
        self.publish(next.into());
        Ok(size)
    }
}

/// Swap credentials on the agents that stay, truncate or extend to the new size.
fn reconcile(
    current: &[Arc<Agent>],
    identities: Vec<IdentityCredential>,
    factory: &dyn AgentFactory,
) -> Vec<Arc<Agent>> {
    identities
        .into_iter()
        .enumerate()
        .map(|(idx, identity)| match current.get(idx) {
            Some(agent) => {
                agent.update_credential(identity.credential);
                agent.clone()
            }
            None => {
                info!(position = idx + 1, identity = %identity.identity, "adding team agent");
                Arc::new(factory.build(idx + 1, identity.credential))
            }
        })
        .collect()
}

async fn refresh_loop(shared: Arc<TeamShared>, first_deadline: Instant) {
    let mut deadline = first_deadline;
    loop {
        sleep_until(deadline).await;
        deadline = match shared.refresh().await {
            Ok(_) => Instant::now() + shared.schedule.interval,
            Err(e) => {
                warn!(team = %shared.name, error = %e, kind = e.kind(), "scheduled refresh failed, retrying");
                Instant::now() + shared.schedule.retry_backoff
            }
        };
    }
}

/// Owns a dynamic, credentialed roster of agents.
pub struct TeamLifecycleManager {
    shared: Arc<TeamShared>,
    description: String,
    timer: Mutex<Option<JoinHandle<()>>>,
    span: Span,
}

impl TeamLifecycleManager {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        source: Arc<dyn CredentialSource>,
        factory: Arc<dyn AgentFactory>,
        schedule: RefreshSchedule,
    ) -> Self {
        let name = name.into();
        let span = info_span!("team", team = %name);
        let empty: Vec<Arc<Agent>> = Vec::new();
        Self {
            shared: Arc::new(TeamShared {
                name,
                source,
                factory,
                schedule,
                roster: RwLock::new(empty.into()),
                refresh_lock: tokio::sync::Mutex::new(()),
                closed: AtomicBool::new(false),
            }),
            description: description.into(),
            timer: Mutex::new(None),
            span,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Authenticate, build one agent per identity and arm the first refresh.
    pub async fn initialize(&self) -> Result<(), RxError> {
        let size = self.shared.refresh().instrument(self.span.clone()).await?;
        info!(parent: &self.span, agents = size, "team initialized");
        self.arm(self.shared.schedule.interval);
        Ok(())
    }

    /// Re-authenticate and reconcile now. The pending timer is left alone.
    pub async fn refresh(&self) -> Result<usize, RxError> {
        self.shared.refresh().instrument(self.span.clone()).await
    }

    /// Cancel the pending timer, refresh now, then re-arm.
    pub async fn force_refresh(&self) -> Result<usize, RxError> {
        self.cancel_timer();
        let result = self.shared.refresh().instrument(self.span.clone()).await;
        if !self.shared.closed.load(Ordering::Acquire) {
            let delay = match &result {
                Ok(_) => self.shared.schedule.interval,
                Err(_) => self.shared.schedule.retry_backoff,
            };
            self.arm(delay);
        }
        result
    }

    /// Stop refreshing. No authentication call happens after this returns.
    pub fn teardown(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.cancel_timer();
        info!(parent: &self.span, "team torn down");
    }

    pub fn roster(&self) -> Roster {
        self.shared.snapshot()
    }

    pub fn len(&self) -> usize {
        self.roster().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster().is_empty()
    }

    fn arm(&self, delay: Duration) {
        let shared = self.shared.clone();
        let span = info_span!(parent: &self.span, "scheduled_refresh");
        let handle = tokio::spawn(refresh_loop(shared, Instant::now() + delay).instrument(span));
        let previous = match self.timer.lock() {
            Ok(mut slot) => slot.replace(handle),
            Err(poisoned) => poisoned.into_inner().replace(handle),
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn cancel_timer(&self) {
        let handle = match self.timer.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for TeamLifecycleManager {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::AuthenticationError;
    use async_trait::async_trait;
    use rx_tool_runtime::provider::mock::MockCompletionClient;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    type Reply = Result<Vec<IdentityCredential>, AuthenticationError>;

    /// Returns scripted replies in order and counts calls.
    struct ScriptedSource {
        replies: Mutex<VecDeque<Reply>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialSource for ScriptedSource {
        async fn fetch(&self) -> Reply {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(AuthenticationError::Unreachable("script exhausted".into())))
        }
    }

    fn tokens(prefix: &str, n: usize) -> Reply {
        Ok((1..=n)
            .map(|i| IdentityCredential {
                identity: format!("id-{i}"),
                credential: Credential::new(format!("{prefix}-{i}")),
            })
            .collect())
    }

    fn factory() -> Arc<dyn AgentFactory> {
        let config = rx_core::Config::for_profile("RXTEAMTEST").team;
        Arc::new(PostingAgentFactory::new(
            Arc::new(MockCompletionClient::new()),
            "gpt-4o",
            Arc::new(ToolRegistry::new()),
            &config,
        ))
    }

    fn manager(source: Arc<ScriptedSource>) -> TeamLifecycleManager {
        TeamLifecycleManager::new(
            "RX Team",
            "Posts to X",
            source,
            factory(),
            RefreshSchedule::default(),
        )
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn names(roster: &Roster) -> Vec<String> {
        roster.iter().map(|a| a.name().to_string()).collect()
    }

    fn tokens_of(roster: &Roster) -> Vec<String> {
        roster
            .iter()
            .map(|a| a.credential().map(|c| c.expose().to_string()).unwrap_or_default())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_builds_numbered_agents() {
        let source = ScriptedSource::new(vec![tokens("a", 3)]);
        let team = manager(source.clone());
        team.initialize().await.unwrap();

        let roster = team.roster();
        assert_eq!(names(&roster), vec!["RX_Agent_1", "RX_Agent_2", "RX_Agent_3"]);
        assert_eq!(tokens_of(&roster), vec!["a-1", "a-2", "a-3"]);
        assert_eq!(roster[0].recursion_budget(), 5);
        assert!(roster[0].shares_global_memory());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_fails_without_identities() {
        let source = ScriptedSource::new(vec![Err(AuthenticationError::NoIdentities)]);
        let team = manager(source);
        let err = team.initialize().await.unwrap_err();
        assert!(matches!(err, RxError::Authentication(_)));
        assert!(team.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_shrinks_roster() {
        let source = ScriptedSource::new(vec![tokens("a", 3), tokens("b", 2)]);
        let team = manager(source);
        team.initialize().await.unwrap();
        let before = team.roster();

        assert_eq!(team.refresh().await.unwrap(), 2);

        let after = team.roster();
        assert_eq!(names(&after), vec!["RX_Agent_1", "RX_Agent_2"]);
        assert_eq!(tokens_of(&after), vec!["b-1", "b-2"]);
        assert!(Arc::ptr_eq(&before[0], &after[0]));
        assert!(Arc::ptr_eq(&before[1], &after[1]));
        // The old snapshot is untouched in size.
        assert_eq!(before.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_grows_roster() {
        let source = ScriptedSource::new(vec![tokens("a", 2), tokens("b", 4)]);
        let team = manager(source);
        team.initialize().await.unwrap();
        let before = team.roster();

        team.refresh().await.unwrap();

        let after = team.roster();
        assert_eq!(
            names(&after),
            vec!["RX_Agent_1", "RX_Agent_2", "RX_Agent_3", "RX_Agent_4"]
        );
        assert_eq!(tokens_of(&after), vec!["b-1", "b-2", "b-3", "b-4"]);
        assert!(Arc::ptr_eq(&before[1], &after[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_refresh_and_retry_backoff() {
        let source = ScriptedSource::new(vec![
            tokens("a", 2),
            Err(AuthenticationError::Rejected(503)),
            tokens("c", 3),
        ]);
        let team = manager(source.clone());
        team.initialize().await.unwrap();

        tokio::time::advance(Duration::from_secs(3599)).await;
        settle().await;
        assert_eq!(source.calls(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(source.calls(), 2);
        // Failed refresh leaves the roster as it was.
        assert_eq!(tokens_of(&team.roster()), vec!["a-1", "a-2"]);

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(source.calls(), 3);
        assert_eq!(team.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_refresh_cancels_pending_timer() {
        let source = ScriptedSource::new(vec![tokens("a", 1), tokens("b", 1), tokens("c", 1)]);
        let team = manager(source.clone());
        team.initialize().await.unwrap();

        tokio::time::advance(Duration::from_secs(1800)).await;
        team.force_refresh().await.unwrap();
        assert_eq!(source.calls(), 2);

        // Past the original deadline: the cancelled timer must not fire.
        tokio::time::advance(Duration::from_secs(1801)).await;
        settle().await;
        assert_eq!(source.calls(), 2);

        // The re-armed timer fires a full interval after the forced refresh.
        tokio::time::advance(Duration::from_secs(1800)).await;
        settle().await;
        assert_eq!(source.calls(), 3);
        assert_eq!(tokens_of(&team.roster()), vec!["c-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_stops_authentication() {
        let source = ScriptedSource::new(vec![tokens("a", 1), tokens("b", 1)]);
        let team = manager(source.clone());
        team.initialize().await.unwrap();
        team.teardown();

        tokio::time::advance(Duration::from_secs(7200)).await;
        settle().await;
        assert_eq!(source.calls(), 1);
        assert!(team.force_refresh().await.is_err());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timer() {
        let source = ScriptedSource::new(vec![tokens("a", 1), tokens("b", 1)]);
        {
            let team = manager(source.clone());
            team.initialize().await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(7200)).await;
        settle().await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_snapshot_keeps_captured_credential() {
        let source = ScriptedSource::new(vec![tokens("a", 1), tokens("b", 1)]);
        let team = manager(source);
        team.initialize().await.unwrap();

        let agent = team.roster()[0].clone();
        let captured = agent.credential();
        team.refresh().await.unwrap();

        assert_eq!(captured.unwrap().expose(), "a-1");
        assert_eq!(agent.credential().unwrap().expose(), "b-1");
    }
}
