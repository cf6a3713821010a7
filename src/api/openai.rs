use crate::api::{ChatMessage, TextCompletion};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::{logi, logw};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const MAX_BODY_SNIPPET: usize = 800;

/// Chat-completions client for OpenAI or any API-compatible provider.
pub struct OpenAiChat {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiChat {
    pub fn new(client: Client, cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            client,
            api_key: cfg.require_openai_key()?.to_string(),
            model: cfg.openai_model.clone(),
            base_url: cfg.openai_base_url.trim_end_matches('/').to_string(),
            timeout: cfg.request_timeout(),
        })
    }
}

/// Pull `choices[0].message.content` out of a response body, or the
/// service's own error message.
fn extract_message_text(resp_json: &str) -> std::result::Result<String, String> {
    let root: serde_json::Value =
        serde_json::from_str(resp_json).map_err(|e| format!("unparseable response: {}", e))?;

    if let Some(err) = root.get("error") {
        let msg = err
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error");
        return match err.get("code").and_then(|v| v.as_str()) {
            Some(code) => Err(format!("{} ({})", msg, code)),
            None => Err(msg.to_string()),
        };
    }

    let content = root
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| "response has no choices[0].message.content".to_string())?;

    Ok(content.to_string())
}

fn snippet(raw: &str) -> String {
    raw.chars().take(MAX_BODY_SNIPPET).collect()
}

#[async_trait]
impl TextCompletion for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": messages,
        });

        logi(format!("Requesting completion from {} ({})", self.base_url, self.model));
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Generation(format!("OpenAI request failed: {}", e)))?;

        let status = resp.status();
        let raw = resp
            .text()
            .await
            .map_err(|e| Error::Generation(format!("OpenAI response read failed: {}", e)))?;

        if !status.is_success() {
            logw(format!("OpenAI HTTP {}", status.as_u16()));
            if !raw.is_empty() {
                logw(format!("OpenAI raw body: {}", snippet(&raw)));
            }
            let reason = extract_message_text(&raw)
                .err()
                .unwrap_or_else(|| "no error detail".to_string());
            return Err(Error::Generation(format!("HTTP {}: {}", status.as_u16(), reason)));
        }

        extract_message_text(&raw).map_err(|reason| {
            logw(format!("OpenAI raw body: {}", snippet(&raw)));
            Error::Generation(reason)
        })
    }
}
