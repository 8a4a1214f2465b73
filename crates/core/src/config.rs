use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::RxError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key).as_deref() {
        Some("1") | Some("true") | Some("yes") => true,
        Some("0") | Some("false") | Some("no") => false,
        _ => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub llm: LlmConfig,
    pub classifier: ClassifierConfig,
    pub team: TeamConfig,
    pub publish: PublishConfig,
    pub orchestrator: OrchestratorConfig,
    pub agents: AgentsConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RX_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("RX_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let llm = LlmConfig::from_env_profiled(p);
        let classifier = ClassifierConfig::from_env_profiled(p, &llm);
        Self {
            profile: p.to_string(),
            llm,
            classifier,
            team: TeamConfig::from_env_profiled(p),
            publish: PublishConfig::from_env_profiled(p),
            orchestrator: OrchestratorConfig::from_env_profiled(p),
            agents: AgentsConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  llm:          provider={}, model={}, base_url={}",
            self.llm.provider,
            self.llm.model,
            self.llm.base_url
        );
        tracing::info!(
            "  classifier:   model={}, base_url={}",
            self.classifier.model,
            self.classifier.base_url.as_deref().unwrap_or("(default)")
        );
        tracing::info!(
            "  team:         enabled={}, refresh={}s, retry={}s",
            self.team.is_configured(),
            self.team.refresh_interval_secs,
            self.team.retry_backoff_secs
        );
        tracing::info!("  publish:      api_url={}", self.publish.api_url);
        tracing::info!("  agents:       dir={}", self.agents.dir.display());
    }

    /// Return a redacted view safe for display (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "llm": {
                "provider": self.llm.provider,
                "model": self.llm.model,
                "base_url": self.llm.base_url,
                "configured": self.llm.is_configured(),
            },
            "classifier": {
                "model": self.classifier.model,
                "base_url": self.classifier.base_url,
                "configured": self.classifier.api_key.is_some(),
            },
            "team": {
                "api_url": self.team.api_url,
                "agent_prefix": self.team.agent_prefix,
                "refresh_interval_secs": self.team.refresh_interval_secs,
                "retry_backoff_secs": self.team.retry_backoff_secs,
                "configured": self.team.is_configured(),
            },
            "publish": { "api_url": self.publish.api_url },
            "orchestrator": {
                "max_message_pairs_per_agent": self.orchestrator.max_message_pairs_per_agent,
                "use_default_agent": self.orchestrator.use_default_agent_if_none_identified,
                "default_agent": self.orchestrator.default_agent,
            },
            "agents": { "dir": self.agents.dir },
        })
    }
}

// ── LLM (OpenAI-compatible) ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai" or "deepinfra"
    pub provider: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        let provider = profiled_env_or(p, "LLM_PROVIDER", "openai").to_lowercase();
        let (key_var, default_url) = match provider.as_str() {
            "deepinfra" => ("DEEPINFRA_API_KEY", "https://api.deepinfra.com/v1/openai"),
            _ => ("OPENAI_API_KEY", "https://api.openai.com/v1"),
        };
        Self {
            api_key: profiled_env_opt(p, key_var),
            base_url: profiled_env_opt(p, "OPENAI_BASE_URL")
                .unwrap_or_else(|| default_url.to_string()),
            model: profiled_env_or(p, "OPENAI_MODEL", "gpt-4o"),
            provider,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// The API key, or a configuration error naming the missing variable.
    pub fn require_api_key(&self) -> Result<&str, RxError> {
        self.api_key.as_deref().ok_or_else(|| {
            RxError::Configuration(format!("API key for provider '{}' is not set", self.provider))
        })
    }
}

// ── Classifier ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub api_key: Option<String>,
    /// Custom endpoint. When set, the classifier uses `tool_choice: auto`.
    pub base_url: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl ClassifierConfig {
    fn from_env_profiled(p: &str, llm: &LlmConfig) -> Self {
        Self {
            api_key: profiled_env_opt(p, "CLASSIFIER_API_KEY").or_else(|| llm.api_key.clone()),
            base_url: profiled_env_opt(p, "CLASSIFIER_BASE_URL"),
            model: profiled_env_or(p, "CLASSIFIER_MODEL", "gpt-4o-mini"),
            max_tokens: profiled_env_u32(p, "CLASSIFIER_MAX_TOKENS", 500),
            temperature: profiled_env_or(p, "CLASSIFIER_TEMPERATURE", "0.0")
                .parse()
                .unwrap_or(0.0),
            top_p: profiled_env_or(p, "CLASSIFIER_TOP_P", "0.9")
                .parse()
                .unwrap_or(0.9),
        }
    }
}

// ── Team (credential source + refresh schedule) ───────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    pub auth_key: Option<String>,
    pub api_url: String,
    pub refresh_interval_secs: u64,
    pub retry_backoff_secs: u64,
    pub agent_prefix: String,
    pub max_recursions: u32,
}

impl TeamConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            auth_key: profiled_env_opt(p, "RX_TEAM_AUTH_KEY"),
            api_url: profiled_env_or(p, "RX_TEAM_API_URL", "https://rome-api-v2.rivalz.ai/agent"),
            refresh_interval_secs: profiled_env_u64(p, "RX_TEAM_REFRESH_SECS", 3600),
            retry_backoff_secs: profiled_env_u64(p, "RX_TEAM_RETRY_SECS", 30),
            agent_prefix: profiled_env_or(p, "RX_TEAM_AGENT_PREFIX", "RX_Agent"),
            max_recursions: profiled_env_u32(p, "RX_TEAM_MAX_RECURSIONS", 5),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.auth_key.is_some()
    }
}

// ── Publish (X API) ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    pub api_url: String,
}

impl PublishConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            api_url: profiled_env_or(p, "X_API_URL", "https://api.twitter.com"),
        }
    }
}

// ── Orchestrator ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub max_message_pairs_per_agent: usize,
    pub use_default_agent_if_none_identified: bool,
    pub default_agent: String,
    pub log_agent_chat: bool,
    pub log_classifier_output: bool,
    pub log_execution_times: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_message_pairs_per_agent: 10,
            use_default_agent_if_none_identified: true,
            default_agent: "general-agent".to_string(),
            log_agent_chat: false,
            log_classifier_output: false,
            log_execution_times: false,
        }
    }
}

impl OrchestratorConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            max_message_pairs_per_agent: profiled_env_u32(
                p,
                "RX_MAX_MESSAGE_PAIRS",
                defaults.max_message_pairs_per_agent as u32,
            ) as usize,
            use_default_agent_if_none_identified: profiled_env_bool(
                p,
                "RX_USE_DEFAULT_AGENT",
                defaults.use_default_agent_if_none_identified,
            ),
            default_agent: profiled_env_or(p, "RX_DEFAULT_AGENT", &defaults.default_agent),
            log_agent_chat: profiled_env_bool(p, "RX_LOG_AGENT_CHAT", false),
            log_classifier_output: profiled_env_bool(p, "RX_LOG_CLASSIFIER_OUTPUT", false),
            log_execution_times: profiled_env_bool(p, "RX_LOG_EXECUTION_TIMES", false),
        }
    }
}

// ── Agent definitions ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    pub dir: PathBuf,
}

impl AgentsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            dir: PathBuf::from(profiled_env_or(p, "RX_AGENTS_DIR", "agents")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiled_lookup_prefers_prefixed_key() {
        std::env::set_var("RXTESTA_RX_TEAM_REFRESH_SECS", "120");
        let config = Config::for_profile("rxtesta");
        assert_eq!(config.profile, "RXTESTA");
        assert_eq!(config.team.refresh_interval_secs, 120);
        std::env::remove_var("RXTESTA_RX_TEAM_REFRESH_SECS");
    }

    #[test]
    fn test_classifier_falls_back_to_llm_key() {
        std::env::set_var("RXTESTB_OPENAI_API_KEY", "sk-test");
        let config = Config::for_profile("RXTESTB");
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert!(config.classifier.api_key.is_some());
        std::env::remove_var("RXTESTB_OPENAI_API_KEY");
    }

    #[test]
    fn test_redacted_summary_has_no_secrets() {
        std::env::set_var("RXTESTC_OPENAI_API_KEY", "sk-very-secret");
        std::env::set_var("RXTESTC_RX_TEAM_AUTH_KEY", "team-secret");
        let config = Config::for_profile("RXTESTC");
        let rendered = config.redacted_summary().to_string();
        assert!(!rendered.contains("sk-very-secret"));
        assert!(!rendered.contains("team-secret"));
        assert_eq!(config.redacted_summary()["team"]["configured"], true);
        std::env::remove_var("RXTESTC_OPENAI_API_KEY");
        std::env::remove_var("RXTESTC_RX_TEAM_AUTH_KEY");
    }

    #[test]
    fn test_require_api_key_missing() {
        let llm = LlmConfig {
            provider: "openai".into(),
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o".into(),
        };
        let err = llm.require_api_key().unwrap_err();
        assert!(matches!(err, RxError::Configuration(_)));
    }
}
