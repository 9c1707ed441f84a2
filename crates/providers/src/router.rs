//! Backend selection from configuration.

use std::sync::Arc;

use tandem_config::ChatConfig;
use tandem_core::backend::ModelBackend;
use tandem_core::error::BackendError;

use crate::anthropic::AnthropicBackend;
use crate::openai::OpenAiBackend;

/// Build the backend named by `provider` (or the config's default).
///
/// `anthropic` gets the native Messages backend; everything else is
/// assumed OpenAI-compatible.
pub fn build_backend(
    config: &ChatConfig,
    provider: Option<&str>,
) -> Result<Arc<dyn ModelBackend>, BackendError> {
    let name = provider.unwrap_or(&config.default_provider);
    let provider_config = config.providers.get(name);

    let api_key = provider_config
        .and_then(|p| p.api_key.clone())
        .or_else(|| config.api_key.clone())
        .ok_or_else(|| {
            BackendError::NotConfigured(format!("no API key configured for provider '{name}'"))
        })?;

    let api_url = provider_config.and_then(|p| p.api_url.clone());

    let backend: Arc<dyn ModelBackend> = if name == "anthropic" {
        let mut backend = AnthropicBackend::new(&api_key);
        if let Some(url) = api_url {
            backend = backend.with_base_url(url);
        }
        Arc::new(backend)
    } else {
        let base_url = api_url.unwrap_or_else(|| default_base_url(name));
        Arc::new(OpenAiBackend::new(name, base_url, &api_key))
    };

    Ok(backend)
}

/// Default base URL for well-known OpenAI-compatible providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_gets_native_backend() {
        let config = ChatConfig {
            api_key: Some("sk-test".into()),
            ..ChatConfig::default()
        };
        let backend = build_backend(&config, Some("anthropic")).unwrap();
        assert_eq!(backend.name(), "anthropic");
    }

    #[test]
    fn unknown_provider_is_openai_compatible() {
        let config = ChatConfig {
            api_key: Some("sk-test".into()),
            ..ChatConfig::default()
        };
        let backend = build_backend(&config, Some("groq")).unwrap();
        assert_eq!(backend.name(), "groq");
    }

    #[test]
    fn missing_key_is_not_configured() {
        let config = ChatConfig::default();
        let Err(err) = build_backend(&config, Some("openai")) else {
            panic!("backend built without an API key");
        };
        assert!(matches!(err, BackendError::NotConfigured(_)));
    }

    #[test]
    fn per_provider_key_wins_over_global() {
        let mut config = ChatConfig {
            api_key: Some("global-key".into()),
            ..ChatConfig::default()
        };
        config.providers.insert(
            "openai".into(),
            tandem_config::ProviderConfig {
                api_key: Some("provider-key".into()),
                api_url: None,
                default_model: None,
            },
        );
        assert!(build_backend(&config, Some("openai")).is_ok());
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }
}
