pub mod openai_compat;

use zeroize::Zeroizing;

/// A single prompt/answer exchange with a text-completion service.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<String>;

    fn name(&self) -> &str;
}

const GEMINI_OPENAI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const OPENAI_BASE: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE: &str = "https://openrouter.ai/api/v1";
const OLLAMA_BASE: &str = "http://localhost:11434/v1";

/// Factory: create the configured provider. All supported services speak the
/// OpenAI chat-completions dialect, so they share one client.
pub fn create_provider(config: &crate::config::Config) -> anyhow::Result<Box<dyn LlmProvider>> {
    let provider = &config.provider;
    let timeout = provider.timeout_seconds;
    match provider.default.as_str() {
        "gemini" => {
            let auth = provider.gemini.clone().unwrap_or_default();
            Ok(Box::new(openai_compat::OpenAICompatProvider::new(
                "gemini",
                auth.resolve_api_key("gemini")?,
                auth.base_url.unwrap_or_else(|| GEMINI_OPENAI_BASE.into()),
                timeout,
            )?))
        }
        "openai" => {
            let auth = provider
                .openai
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("OpenAI not configured"))?;
            Ok(Box::new(openai_compat::OpenAICompatProvider::new(
                "openai",
                auth.resolve_api_key("openai")?,
                auth.base_url.clone().unwrap_or_else(|| OPENAI_BASE.into()),
                timeout,
            )?))
        }
        "openrouter" => {
            let auth = provider.openrouter.clone().unwrap_or_default();
            Ok(Box::new(openai_compat::OpenAICompatProvider::new(
                "openrouter",
                auth.resolve_api_key("openrouter")?,
                auth.base_url.unwrap_or_else(|| OPENROUTER_BASE.into()),
                timeout,
            )?))
        }
        "ollama" => {
            let auth = provider.ollama.as_ref();
            let base_url = auth
                .and_then(|a| a.base_url.clone())
                .unwrap_or_else(|| OLLAMA_BASE.into());
            let api_key = auth
                .and_then(|a| a.resolve_api_key("ollama").ok())
                .unwrap_or_else(|| Zeroizing::new("ollama".into()));
            Ok(Box::new(openai_compat::OpenAICompatProvider::new(
                "ollama", api_key, base_url, timeout,
            )?))
        }
        other => anyhow::bail!("Unknown provider: {other}"),
    }
}

/// Pull the assistant text out of an OpenAI-format completion response.
pub fn parse_openai_response(json: &serde_json::Value) -> anyhow::Result<String> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| anyhow::anyhow!("No choices in response"))?;
    choice["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Response has no text content"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ProviderAuth};

    #[test]
    fn test_parse_openai_response_text() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"command\":\"ls\"}"}}]
        });
        assert_eq!(parse_openai_response(&json).unwrap(), "{\"command\":\"ls\"}");
    }

    #[test]
    fn test_parse_openai_response_no_choices() {
        let json = serde_json::json!({"choices": []});
        assert!(parse_openai_response(&json).is_err());
    }

    #[test]
    fn test_parse_openai_response_null_content() {
        let json = serde_json::json!({"choices": [{"message": {"content": null}}]});
        assert!(parse_openai_response(&json).is_err());
    }

    #[test]
    fn test_create_provider_unknown() {
        let mut config = Config::default();
        config.provider.default = "nope".into();
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn test_create_provider_gemini_with_inline_key() {
        let mut config = Config::default();
        config.provider.gemini = Some(ProviderAuth {
            api_key: Some("k".into()),
            ..Default::default()
        });
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "gemini");
    }

    #[test]
    fn test_create_provider_openai_requires_section() {
        let mut config = Config::default();
        config.provider.default = "openai".into();
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn test_create_provider_ollama_without_key() {
        let mut config = Config::default();
        config.provider.default = "ollama".into();
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
    }
}
