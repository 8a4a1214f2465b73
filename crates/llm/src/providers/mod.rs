pub mod openai;

use std::sync::Arc;

use rx_core::config::LlmConfig;
use rx_core::RxError;
use rx_tool_runtime::CompletionClient;

/// Create the completion client selected by config.
pub fn create_client(llm_config: &LlmConfig) -> Result<Arc<dyn CompletionClient>, RxError> {
    let api_key = llm_config.require_api_key()?.to_string();
    let base_url = llm_config.base_url.clone();
    match llm_config.provider.as_str() {
        "openai" => Ok(Arc::new(openai::OpenAiCompletionClient::new(api_key, base_url))),
        "deepinfra" => Ok(Arc::new(openai::OpenAiCompletionClient::deepinfra(
            api_key, base_url,
        ))),
        other => Err(RxError::Configuration(format!(
            "unknown LLM provider: '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider: provider.to_string(),
            api_key: api_key.map(String::from),
            base_url: "https://example.test/v1".to_string(),
            model: "m".to_string(),
        }
    }

    #[test]
    fn test_create_known_providers() {
        let client = create_client(&config("openai", Some("k"))).unwrap();
        assert_eq!(client.provider_name(), "openai");
        let client = create_client(&config("deepinfra", Some("k"))).unwrap();
        assert_eq!(client.provider_name(), "deepinfra");
    }

    #[test]
    fn test_missing_key_and_unknown_provider() {
        assert!(matches!(
            create_client(&config("openai", None)),
            Err(RxError::Configuration(_))
        ));
        let err = create_client(&config("gemini", Some("k"))).err().unwrap();
        assert!(err.to_string().contains("gemini"));
    }
}
