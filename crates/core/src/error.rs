use thiserror::Error;

/// Terminal failure of a single request, or of a component at construction.
///
/// Crate-local error enums convert into this at the request boundary so the
/// caller always sees exactly one of these kinds.
#[derive(Error, Debug)]
pub enum RxError {
    /// Missing or invalid configuration. Fatal, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A completion or publish call failed.
    #[error("Upstream call failed: {0}")]
    UpstreamCall(String),

    /// The completion response had no choices, or content that was neither
    /// text nor a tool-call list.
    #[error("Unrecoverable response shape: {0}")]
    UnrecoverableResponse(String),

    /// The credential source was unreachable or rejected the key.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),
}

impl RxError {
    /// Short machine-readable kind, used as a tracing field.
    pub fn kind(&self) -> &'static str {
        match self {
            RxError::Configuration(_) => "configuration",
            RxError::UpstreamCall(_) => "upstream_call",
            RxError::UnrecoverableResponse(_) => "unrecoverable_response",
            RxError::Authentication(_) => "authentication",
            RxError::Classification(_) => "classification",
            RxError::AgentNotFound(_) => "agent_not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_display() {
        let err = RxError::Authentication("status 401".into());
        assert_eq!(err.kind(), "authentication");
        assert_eq!(err.to_string(), "Authentication failed: status 401");
    }
}
