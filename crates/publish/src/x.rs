//! X API v2 publisher.
//!
//! Posts through `POST {api_url}/2/tweets` with the agent's bearer token.
//! A `201 Created` carries the new post id at `data.id`.

use rx_core::config::PublishConfig;
use rx_core::Credential;

use crate::traits::{PublishError, PublishResponse, Publisher};

/// Sends posts via the X API.
#[derive(Debug, Clone)]
pub struct XPublisher {
    api_url: String,
    client: reqwest::Client,
}

impl XPublisher {
    pub fn new(api_url: impl Into<String>) -> Result<Self, PublishError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        if api_url.is_empty() {
            return Err(PublishError::Config("X API URL must not be empty".to_string()));
        }
        Ok(Self {
            api_url,
            client: reqwest::Client::new(),
        })
    }

    pub fn from_config(config: &PublishConfig) -> Result<Self, PublishError> {
        Self::new(config.api_url.clone())
    }

    fn endpoint(&self) -> String {
        format!("{}/2/tweets", self.api_url)
    }
}

/// Request body for a post, optionally replying to `reply_to`.
pub fn build_payload(text: &str, reply_to: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({ "text": text });
    if let Some(id) = reply_to {
        body["reply"] = serde_json::json!({ "in_reply_to_tweet_id": id });
    }
    body
}

/// Interpret the status and raw body of a post response.
pub fn parse_response(status: u16, body: &str) -> Result<PublishResponse, PublishError> {
    if status != 201 {
        return Ok(PublishResponse::Rejected {
            status,
            body: body.to_string(),
        });
    }
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| PublishError::InvalidResponse(format!("malformed JSON: {e}")))?;
    let id = value
        .get("data")
        .and_then(|d| d.get("id"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| PublishError::InvalidResponse("missing data.id".to_string()))?;
    Ok(PublishResponse::Created { id: id.to_string() })
}

#[async_trait::async_trait]
impl Publisher for XPublisher {
    async fn publish(
        &self,
        text: &str,
        credential: &Credential,
        reply_to: Option<&str>,
    ) -> Result<PublishResponse, PublishError> {
        tracing::debug!(len = text.chars().count(), reply = reply_to.is_some(), "Sending post");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(credential.expose())
            .json(&build_payload(text, reply_to))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        if status != 201 {
            tracing::warn!(status, detail = %body, "X API rejected post");
        }
        parse_response(status, &body)
    }

    fn channel_name(&self) -> &str {
        "x"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_plain_and_reply() {
        let plain = build_payload("hello", None);
        assert_eq!(plain, serde_json::json!({"text": "hello"}));

        let reply = build_payload("more", Some("123"));
        assert_eq!(reply["reply"]["in_reply_to_tweet_id"], "123");
    }

    #[test]
    fn test_parse_created() {
        let body = r#"{"data":{"id":"1445880548472328192","text":"hello"}}"#;
        assert_eq!(
            parse_response(201, body).unwrap(),
            PublishResponse::Created {
                id: "1445880548472328192".into()
            }
        );
    }

    #[test]
    fn test_parse_rejected_keeps_body() {
        let body = r#"{"title":"Forbidden","status":403}"#;
        assert_eq!(
            parse_response(403, body).unwrap(),
            PublishResponse::Rejected {
                status: 403,
                body: body.into()
            }
        );
    }

    #[test]
    fn test_parse_created_without_id() {
        assert!(matches!(
            parse_response(201, r#"{"data":{}}"#),
            Err(PublishError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_endpoint_and_empty_url() {
        let publisher = XPublisher::new("https://api.twitter.com/").unwrap();
        assert_eq!(publisher.endpoint(), "https://api.twitter.com/2/tweets");
        assert_eq!(publisher.channel_name(), "x");
        assert!(XPublisher::new("").is_err());
    }
}
