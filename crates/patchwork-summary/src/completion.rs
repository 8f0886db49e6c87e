use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::time::Duration;

/// Something that turns a prompt into a short piece of text.
#[async_trait::async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Inactive completions are skipped without being called.
    fn is_active(&self) -> bool {
        true
    }
}

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct HttpCompletion {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpCompletion {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl TextCompletion for HttpCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("summary request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("summary endpoint returned {status}: {text}");
        }
        let reply: Value = response
            .json()
            .await
            .context("summary endpoint returned malformed JSON")?;
        let text = reply
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .context("summary response has no message content")?;
        Ok(text.trim().to_string())
    }

    fn is_active(&self) -> bool {
        !self.endpoint.is_empty()
    }
}
