//! `OpenAI` chat completions backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{Assistant, send_json};
use crate::config::AssistantConfig;
use crate::{Error, Result};

/// Single-request chat completions assistant
pub struct ChatCompletionsAssistant {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl ChatCompletionsAssistant {
    /// Create a new chat completions client
    #[must_use]
    pub fn new(config: AssistantConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key,
            model: config.model,
            base_url: config.base_url,
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl Assistant for ChatCompletionsAssistant {
    fn name(&self) -> &'static str {
        "openai-chat"
    }

    async fn respond(&self, prompt: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "requesting completion");

        let response: ChatCompletionResponse = send_json(
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(self.api_key.expose_secret())
                .timeout(self.timeout)
                .json(&request),
        )
        .await?;

        completion_text(&response)
    }
}

fn completion_text(response: &ChatCompletionResponse) -> Result<String> {
    response
        .choices
        .first()
        .and_then(|c| c.message.content.as_deref())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(String::from)
        .ok_or_else(|| Error::Assistant("no response content".to_string()))
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
