pub mod agent;
pub mod classifier;
pub mod config;
pub mod credentials;
pub mod orchestrator;
pub mod storage;
pub mod team;
pub mod template;

pub use agent::{agent_id_from_name, Agent, AgentOptions, AgentResponse, Retriever};
pub use classifier::{AgentDescriptor, ClassificationError, Classifier, ClassifierResult, ModelClassifier};
pub use config::{load_agents, AgentConfigError, AgentDefinition};
pub use credentials::{
    AuthenticationError, CredentialSource, HttpCredentialSource, IdentityCredential,
};
pub use orchestrator::{Orchestrator, RouteResponse, RouteTarget, TeamDispatch};
pub use storage::{ChatMessage, ChatRole, InMemoryChatStorage};
pub use team::{AgentFactory, PostingAgentFactory, RefreshSchedule, Roster, TeamLifecycleManager};
pub use template::{render_template, TemplateValue, TemplateVariables};
