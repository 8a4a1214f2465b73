//! Publisher trait definition and shared error types.

use rx_core::Credential;

/// Transport-level failures. A non-success HTTP status is not an error here;
/// it comes back as [`PublishResponse::Rejected`].
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// What the platform answered for a single post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResponse {
    Created { id: String },
    Rejected { status: u16, body: String },
}

/// The outbound posting capability.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    /// Post `text` (at most [`crate::POST_LIMIT`] units) with the given bearer
    /// credential, optionally as a reply to an earlier post.
    async fn publish(
        &self,
        text: &str,
        credential: &Credential,
        reply_to: Option<&str>,
    ) -> Result<PublishResponse, PublishError>;

    /// Human-readable name for this channel (e.g., "x").
    fn channel_name(&self) -> &str;
}
