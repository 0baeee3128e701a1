use reqwest::Client;
use serde_json::json;
use zeroize::Zeroizing;

use crate::provider::{parse_openai_response, CompletionRequest, LlmProvider};

pub struct OpenAICompatProvider {
    name: String,
    client: Client,
    api_key: Zeroizing<String>,
    base_url: String,
}

impl OpenAICompatProvider {
    pub fn new(
        name: &str,
        api_key: Zeroizing<String>,
        base_url: String,
        timeout_seconds: u64,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            name: name.to_string(),
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_seconds))
                .build()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut messages = Vec::new();
        if !request.system.is_empty() {
            messages.push(json!({"role": "system", "content": request.system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));
        json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": false,
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAICompatProvider {
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<String> {
        let body = self.build_request_body(&request);
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", &*self.api_key))
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("API error ({status}): {text}");
        }
        parse_openai_response(&resp.json().await?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
