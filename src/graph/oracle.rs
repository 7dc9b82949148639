//! Classification oracle: an LLM chat-completions endpoint answering in JSON.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{LexigraphError, Result};

/// Something that answers a classification prompt with free text.
///
/// `Err` means the oracle could not be reached (transport, HTTP status, timeout).
/// A reply that arrived but says nothing usable is returned as text and left to
/// the verdict parser.
#[async_trait]
pub trait RelationOracle: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// OpenAI-compatible chat-completions client in JSON mode
pub struct OpenAIOracle {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

impl OpenAIOracle {
    pub fn new(api_key: String, model: String, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LexigraphError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }

    fn request_body(&self, system_prompt: &str, user_prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "temperature": 0.1,
            "response_format": {"type": "json_object"}
        })
    }
}

#[async_trait]
impl RelationOracle for OpenAIOracle {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(system_prompt, user_prompt))
            .send()
            .await
            .map_err(|e| LexigraphError::Oracle(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LexigraphError::Oracle(format!("Oracle API error {}: {}", status, body)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LexigraphError::Oracle(format!("Failed to read response: {}", e)))?;

        Ok(message_content(&body))
    }
}

/// The first choice's message text, or the raw body when the envelope is not a
/// chat completion. A missing or null content (e.g. a refusal) reads as empty.
fn message_content(body: &str) -> String {
    match serde_json::from_str::<ChatResponse>(body) {
        Ok(chat) => chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default(),
        Err(e) => {
            log::warn!("Unexpected oracle response envelope: {}", e);
            body.to_string()
        }
    }
}
