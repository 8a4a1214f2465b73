//! Post to X on behalf of the agent running the turn.
//!
//! The bearer credential is never a model-visible argument: it comes from the
//! [`ToolContext`] captured when the request started.

use std::sync::Arc;

use async_trait::async_trait;
use rx_publish::{post_with_continuation, Publisher};
use tracing::info;

use crate::tool::{ParamType, Tool, ToolContext, ToolDefinition, ToolError, ToolInvocation};

pub struct PostXTool {
    publisher: Arc<dyn Publisher>,
}

impl PostXTool {
    pub const NAME: &'static str = "post_x";

    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl Tool for PostXTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(Self::NAME, "Post the specific content to a X account.")
            .param("tweet_text", ParamType::String, "The content of the tweet")
            .required(&["tweet_text"])
            .strict(true)
    }

    async fn execute(
        &self,
        invocation: &ToolInvocation,
        context: &ToolContext,
    ) -> Result<String, ToolError> {
        let text = invocation.str_arg("tweet_text")?;
        let credential = context
            .credential
            .as_ref()
            .ok_or_else(|| ToolError::MissingCredential(context.agent_name.clone()))?;

        info!(agent = %context.agent_name, len = text.chars().count(), "posting to X");
        let outcome = post_with_continuation(self.publisher.as_ref(), text, credential)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(outcome.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockCompletionClient;
    use crate::registry::ToolRegistry;
    use crate::runtime::{RecursiveToolLoop, ToolConfig};
    use crate::stream::FinishReason;
    use crate::tool::ToolCall;
    use crate::Conversation;
    use rx_core::Credential;
    use rx_publish::{PublishError, PublishResponse};
    use std::sync::Mutex;

    struct FixedPublisher {
        response: PublishResponse,
        seen_tokens: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Publisher for FixedPublisher {
        async fn publish(
            &self,
            _text: &str,
            credential: &Credential,
            _reply_to: Option<&str>,
        ) -> Result<PublishResponse, PublishError> {
            self.seen_tokens
                .lock()
                .unwrap()
                .push(credential.expose().to_string());
            Ok(self.response.clone())
        }

        fn channel_name(&self) -> &str {
            "fixed"
        }
    }

    fn publisher(response: PublishResponse) -> Arc<FixedPublisher> {
        Arc::new(FixedPublisher {
            response,
            seen_tokens: Mutex::new(Vec::new()),
        })
    }

    fn invocation(text: &str) -> ToolInvocation {
        let mut arguments = serde_json::Map::new();
        arguments.insert("tweet_text".into(), text.into());
        ToolInvocation {
            id: "c1".into(),
            name: PostXTool::NAME.into(),
            arguments,
            round: 1,
        }
    }

    #[tokio::test]
    async fn test_posts_with_context_credential() {
        let fixed = publisher(PublishResponse::Created { id: "77".into() });
        let tool = PostXTool::new(fixed.clone());
        let ctx = ToolContext::new("RX_Agent_1", Some(Credential::from("tok-1")));

        let out = tool.execute(&invocation("gm"), &ctx).await.unwrap();
        assert!(out.contains("77"));
        assert_eq!(*fixed.seen_tokens.lock().unwrap(), vec!["tok-1"]);
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let tool = PostXTool::new(publisher(PublishResponse::Created { id: "1".into() }));
        let err = tool
            .execute(&invocation("gm"), &ToolContext::new("lonely", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::MissingCredential(name) if name == "lonely"));
    }

    #[tokio::test]
    async fn test_forbidden_post_feeds_back_into_next_round() {
        let diagnostic = r#"{"detail":"You are not allowed to create a Tweet with duplicate content.","status":403}"#;
        let fixed = publisher(PublishResponse::Rejected {
            status: 403,
            body: diagnostic.into(),
        });
        let mut registry = ToolRegistry::new();
        registry.register(PostXTool::new(fixed)).unwrap();

        let client = Arc::new(MockCompletionClient::new());
        client.queue_tool_calls(
            None,
            vec![ToolCall {
                id: "call_x".into(),
                name: PostXTool::NAME.into(),
                arguments: r#"{"tweet_text":"gm"}"#.into(),
            }],
            FinishReason::ToolCalls,
        );
        client.queue_text("The post was rejected as a duplicate.");

        let tool_loop = RecursiveToolLoop::new(client.clone(), "m", "RX_Agent_1")
            .with_tools(ToolConfig::registry(Arc::new(registry)));
        let mut conv = Conversation::with_system_prompt("post things");
        conv.add_user_message("post gm");
        let ctx = ToolContext::new("RX_Agent_1", Some(Credential::from("tok")));

        let outcome = tool_loop.run(&mut conv, &ctx).await.unwrap();

        assert_eq!(outcome.text, "The post was rejected as a duplicate.");
        assert_eq!(client.call_count(), 2);
        let result = conv.tool_results().next().unwrap();
        assert!(!result.is_error);
        assert!(result.content.contains("403"));
        assert!(result.content.contains(diagnostic));
    }
}
