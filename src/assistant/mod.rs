//! Language-model assistant clients
//!
//! The relay only needs "prompt in, text out". Two `OpenAI` backends are
//! provided: the Assistants API (thread + polled run) when an assistant id is
//! configured, and plain chat completions otherwise.

mod completions;
mod threads;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

use crate::config::AssistantConfig;
use crate::{Error, Result};

pub use completions::ChatCompletionsAssistant;
pub use threads::ThreadsAssistant;

/// A language-model assistant
#[async_trait]
pub trait Assistant: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Produce a response for `prompt`
    ///
    /// Returns an error rather than placeholder text when no answer is available.
    async fn respond(&self, prompt: &str) -> Result<String>;
}

/// Build the assistant backend selected by `config`
#[must_use]
pub fn from_config(config: AssistantConfig) -> Arc<dyn Assistant> {
    if config.assistant_id.is_some() {
        Arc::new(ThreadsAssistant::new(config))
    } else {
        Arc::new(ChatCompletionsAssistant::new(config))
    }
}

/// Send a request and decode a JSON body, turning non-2xx into an error
pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::Assistant(format!("request failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Assistant(format!("API error: {status} - {body}")));
    }

    response
        .json()
        .await
        .map_err(|e| Error::Assistant(format!("failed to parse response: {e}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;

    use super::*;

    fn config(assistant_id: Option<&str>) -> AssistantConfig {
        AssistantConfig {
            api_key: SecretString::from("sk-test".to_string()),
            assistant_id: assistant_id.map(String::from),
            model: "gpt-4o-mini".to_string(),
            base_url: "http://localhost:1".to_string(),
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn selects_backend_by_assistant_id() {
        assert_eq!(from_config(config(Some("asst_1"))).name(), "openai-assistant");
        assert_eq!(from_config(config(None)).name(), "openai-chat");
    }

    #[tokio::test]
    async fn unreachable_api_is_an_error() {
        let assistant = from_config(config(None));
        let err = assistant.respond("Bing").await.unwrap_err();
        assert!(matches!(err, Error::Assistant(_)));
    }
}
