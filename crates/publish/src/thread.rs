//! Posting a message that may need a continuation reply.

use rx_core::Credential;

use crate::split::split_post;
use crate::traits::{PublishError, PublishResponse, Publisher};

/// Overall result of posting one (possibly split) message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Posted in one piece.
    Posted { id: String },
    /// Primary posted and the remainder posted as a reply.
    PostedWithReply { id: String, reply_id: String },
    /// Primary posted; the remainder was too long and discarded.
    Truncated { id: String },
    /// Primary posted; the reply was rejected.
    ReplyFailed { id: String, status: u16, body: String },
    /// The primary post was rejected.
    Failed { status: u16, body: String },
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            PublishOutcome::Posted { .. } | PublishOutcome::PostedWithReply { .. }
        )
    }

    /// Text handed back to the model. Rejections quote the status code and
    /// the platform's diagnostic body verbatim.
    pub fn describe(&self) -> String {
        match self {
            PublishOutcome::Posted { id } => format!(
                "Tweet posted success with id: {id}, track the tweet at {}",
                status_url(id)
            ),
            PublishOutcome::PostedWithReply { id, reply_id } => format!(
                "Tweet posted with id: {id} and replied with id: {reply_id}, track the tweet at {}",
                status_url(id)
            ),
            PublishOutcome::Truncated { id } => format!(
                "Tweet posted with id: {id}, but the remainder was too long to post as a reply and was dropped, track the tweet at {}",
                status_url(id)
            ),
            PublishOutcome::ReplyFailed { id, status, body } => format!(
                "Posted part of the tweet with id: {id}, but the rest failed to post with error: {body} and status code: {status}, track the tweet at {}",
                status_url(id)
            ),
            PublishOutcome::Failed { status, body } => format!(
                "Post to Twitter failed with error: {body} and status code: {status}"
            ),
        }
    }
}

fn status_url(id: &str) -> String {
    format!("https://twitter.com/i/web/status/{id}")
}

/// Post `text`, splitting it and threading the remainder as a reply when it
/// exceeds the post limit.
pub async fn post_with_continuation(
    publisher: &dyn Publisher,
    text: &str,
    credential: &Credential,
) -> Result<PublishOutcome, PublishError> {
    let split = split_post(text);

    let id = match publisher.publish(&split.primary, credential, None).await? {
        PublishResponse::Created { id } => id,
        PublishResponse::Rejected { status, body } => {
            tracing::warn!(status, channel = publisher.channel_name(), "post rejected");
            return Ok(PublishOutcome::Failed { status, body });
        }
    };
    tracing::info!(id = %id, channel = publisher.channel_name(), "post published");

    if split.secondary.is_empty() {
        return Ok(if split.dropped {
            PublishOutcome::Truncated { id }
        } else {
            PublishOutcome::Posted { id }
        });
    }

    match publisher
        .publish(&split.secondary, credential, Some(&id))
        .await?
    {
        PublishResponse::Created { id: reply_id } => {
            tracing::info!(id = %id, reply_id = %reply_id, "continuation reply published");
            Ok(PublishOutcome::PostedWithReply { id, reply_id })
        }
        PublishResponse::Rejected { status, body } => {
            tracing::warn!(id = %id, status, "continuation reply rejected");
            Ok(PublishOutcome::ReplyFailed { id, status, body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted responses and records (text, reply_to) per call.
    struct ScriptedPublisher {
        responses: Mutex<VecDeque<PublishResponse>>,
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl ScriptedPublisher {
        fn new(responses: Vec<PublishResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Publisher for ScriptedPublisher {
        async fn publish(
            &self,
            text: &str,
            _credential: &Credential,
            reply_to: Option<&str>,
        ) -> Result<PublishResponse, PublishError> {
            self.calls
                .lock()
                .unwrap()
                .push((text.to_string(), reply_to.map(String::from)));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| PublishError::InvalidResponse("unscripted call".into()))
        }

        fn channel_name(&self) -> &str {
            "scripted"
        }
    }

    fn created(id: &str) -> PublishResponse {
        PublishResponse::Created { id: id.into() }
    }

    #[tokio::test]
    async fn test_short_post() {
        let publisher = ScriptedPublisher::new(vec![created("1")]);
        let outcome = post_with_continuation(&publisher, "hello", &Credential::from("t"))
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Posted { id: "1".into() });
        assert!(outcome.describe().contains("https://twitter.com/i/web/status/1"));
        assert_eq!(publisher.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_long_post_threads_reply() {
        let publisher = ScriptedPublisher::new(vec![created("10"), created("11")]);
        let text = "y".repeat(300);
        let outcome = post_with_continuation(&publisher, &text, &Credential::from("t"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PublishOutcome::PostedWithReply {
                id: "10".into(),
                reply_id: "11".into()
            }
        );
        let calls = publisher.calls.lock().unwrap();
        assert!(calls[0].0.ends_with("..."));
        assert_eq!(calls[1].1.as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn test_rejection_is_reported_verbatim() {
        let body = r#"{"detail":"You are not permitted to perform this action.","status":403}"#;
        let publisher = ScriptedPublisher::new(vec![PublishResponse::Rejected {
            status: 403,
            body: body.into(),
        }]);
        let outcome = post_with_continuation(&publisher, "hi", &Credential::from("t"))
            .await
            .unwrap();
        assert!(!outcome.is_success());
        let text = outcome.describe();
        assert!(text.contains("403"));
        assert!(text.contains(body));
    }

    #[tokio::test]
    async fn test_reply_failure_is_partial() {
        let publisher = ScriptedPublisher::new(vec![
            created("20"),
            PublishResponse::Rejected {
                status: 429,
                body: "Too Many Requests".into(),
            },
        ]);
        let outcome = post_with_continuation(&publisher, &"z".repeat(290), &Credential::from("t"))
            .await
            .unwrap();
        assert!(matches!(outcome, PublishOutcome::ReplyFailed { ref id, status: 429, .. } if id == "20"));
        assert!(outcome.describe().contains("Too Many Requests"));
    }

    #[tokio::test]
    async fn test_dropped_remainder_is_truncated() {
        let publisher = ScriptedPublisher::new(vec![created("30")]);
        let text = format!("{}. {}", "a".repeat(10), "b".repeat(400));
        let outcome = post_with_continuation(&publisher, &text, &Credential::from("t"))
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Truncated { id: "30".into() });
        assert_eq!(publisher.calls.lock().unwrap().len(), 1);
    }
}
