//! Fetching per-identity bearer credentials from the team credential source.
//!
//! The source answers `GET {api_url}?authen_key=<key>` with
//! `{"data": [{"access_token": "...", ...}, ...]}`. Each entry with a token
//! becomes one [`IdentityCredential`]; the order of `data` fixes the roster order.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use rx_core::config::TeamConfig;
use rx_core::{Credential, RxError};

/// One identity returned by the credential source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityCredential {
    /// Stable reference for logs; never the token itself.
    pub identity: String,
    pub credential: Credential,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    #[error("credential source unreachable: {0}")]
    Unreachable(String),
    #[error("credential source rejected the key with status {0}")]
    Rejected(u16),
    #[error("invalid credential source response: {0}")]
    InvalidResponse(String),
    #[error("credential source returned no usable access tokens")]
    NoIdentities,
}

impl From<AuthenticationError> for RxError {
    fn from(e: AuthenticationError) -> Self {
        RxError::Authentication(e.to_string())
    }
}

/// Something that can exchange the team key for identity credentials.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Ordered identities. An empty list is an error, never `Ok(vec![])`.
    async fn fetch(&self) -> Result<Vec<IdentityCredential>, AuthenticationError>;
}

/// HTTP credential source.
pub struct HttpCredentialSource {
    client: reqwest::Client,
    api_url: String,
    auth_key: String,
}

impl HttpCredentialSource {
    pub fn new(api_url: impl Into<String>, auth_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim().to_string(),
            auth_key: auth_key.into(),
        }
    }

    /// Build from the team config; the auth key is required.
    pub fn from_config(config: &TeamConfig) -> Result<Self, RxError> {
        let key = config
            .auth_key
            .as_deref()
            .ok_or_else(|| RxError::Configuration("RX_TEAM_AUTH_KEY is not set".into()))?;
        Ok(Self::new(config.api_url.clone(), key))
    }
}

#[async_trait]
impl CredentialSource for HttpCredentialSource {
    async fn fetch(&self) -> Result<Vec<IdentityCredential>, AuthenticationError> {
        debug!(url = %self.api_url, "requesting team credentials");
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("authen_key", self.auth_key.as_str())])
            .send()
            .await
            .map_err(|e| AuthenticationError::Unreachable(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(AuthenticationError::Rejected(status));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AuthenticationError::InvalidResponse(e.to_string()))?;
        parse_identities(&body)
    }
}

/// Parse the credential source's JSON body.
pub fn parse_identities(body: &Value) -> Result<Vec<IdentityCredential>, AuthenticationError> {
    let entries = body["data"]
        .as_array()
        .ok_or_else(|| AuthenticationError::InvalidResponse("missing 'data' array".into()))?;

    let mut identities = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        let Some(token) = entry["access_token"].as_str().filter(|t| !t.is_empty()) else {
            warn!(entry = idx + 1, "skipping identity without access token");
            continue;
        };
        identities.push(IdentityCredential {
            identity: identity_ref(entry, idx),
            credential: Credential::new(token),
        });
    }

    if identities.is_empty() {
        return Err(AuthenticationError::NoIdentities);
    }
    Ok(identities)
}

fn identity_ref(entry: &Value, idx: usize) -> String {
    ["id", "_id", "username", "name"]
        .iter()
        .find_map(|key| match &entry[*key] {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| format!("identity-{}", idx + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_skips_entries_without_token() {
        let body = json!({
            "data": [
                {"access_token": "tok-a", "_id": "65f0"},
                {"refresh_token": "only-refresh"},
                {"access_token": "", "username": "empty"},
                {"access_token": "tok-b", "id": 42},
                {"access_token": "tok-c"}
            ]
        });
        let ids = parse_identities(&body).unwrap();
        let refs: Vec<_> = ids.iter().map(|i| i.identity.as_str()).collect();
        assert_eq!(refs, vec!["65f0", "42", "identity-5"]);
        assert_eq!(ids[1].credential.expose(), "tok-b");
    }

    #[test]
    fn test_parse_no_identities() {
        let err = parse_identities(&json!({"data": []})).unwrap_err();
        assert!(matches!(err, AuthenticationError::NoIdentities));

        let err = parse_identities(&json!({"data": [{"name": "x"}]})).unwrap_err();
        assert!(matches!(err, AuthenticationError::NoIdentities));
    }

    #[test]
    fn test_parse_missing_data() {
        let err = parse_identities(&json!({"message": "bad key"})).unwrap_err();
        assert!(matches!(err, AuthenticationError::InvalidResponse(_)));
        assert!(matches!(RxError::from(err), RxError::Authentication(_)));
    }

    #[test]
    fn test_from_config_requires_key() {
        let mut config = rx_core::Config::for_profile("RXCREDTEST").team;
        config.auth_key = None;
        assert!(matches!(
            HttpCredentialSource::from_config(&config),
            Err(RxError::Configuration(_))
        ));
        config.auth_key = Some("k".into());
        assert!(HttpCredentialSource::from_config(&config).is_ok());
    }
}
