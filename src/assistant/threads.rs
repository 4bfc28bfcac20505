//! `OpenAI` Assistants API backend
//!
//! Each prompt gets a fresh thread: post the message, start a run, poll the
//! run until it leaves `queued`/`in_progress`, then read the newest assistant
//! message.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Assistant, send_json};
use crate::config::AssistantConfig;
use crate::{Error, Result};

/// Assistants API client bound to one assistant
pub struct ThreadsAssistant {
    client: Client,
    api_key: SecretString,
    assistant_id: String,
    base_url: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl ThreadsAssistant {
    /// Create a new Assistants API client
    ///
    /// An unset assistant id yields runs the API will reject.
    #[must_use]
    pub fn new(config: AssistantConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key,
            assistant_id: config.assistant_id.unwrap_or_default(),
            base_url: config.base_url,
            poll_interval: config.poll_interval,
            timeout: config.timeout,
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(self.api_key.expose_secret())
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);
        send_json(self.authorized(self.client.post(url)).json(body)).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);
        send_json(self.authorized(self.client.get(url))).await
    }

    async fn run_thread(&self, prompt: &str) -> Result<String> {
        let thread: ApiObject = self.post("threads", &serde_json::json!({})).await?;
        tracing::debug!(thread_id = %thread.id, "thread created");

        let message: ApiObject = self
            .post(
                &format!("threads/{}/messages", thread.id),
                &CreateMessage {
                    role: "user",
                    content: prompt,
                },
            )
            .await?;
        tracing::debug!(message_id = %message.id, "message submitted");

        let mut run: Run = self
            .post(
                &format!("threads/{}/runs", thread.id),
                &CreateRun {
                    assistant_id: &self.assistant_id,
                },
            )
            .await?;
        tracing::debug!(run_id = %run.id, status = %run.status, "run created");

        while run.is_pending() {
            tokio::time::sleep(self.poll_interval).await;
            run = self
                .get(&format!("threads/{}/runs/{}", thread.id, run.id))
                .await?;
            tracing::trace!(run_id = %run.id, status = %run.status, "run polled");
        }

        if run.status != "completed" {
            let reason = run
                .last_error
                .map(|e| e.message)
                .unwrap_or_default();
            return Err(Error::Assistant(format!(
                "run {} ended with status {}: {reason}",
                run.id, run.status
            )));
        }

        let messages: MessageList = self
            .get(&format!("threads/{}/messages", thread.id))
            .await?;
        tracing::debug!(count = messages.data.len(), "messages retrieved");

        assistant_reply(&messages)
    }
}

#[async_trait]
impl Assistant for ThreadsAssistant {
    fn name(&self) -> &'static str {
        "openai-assistant"
    }

    async fn respond(&self, prompt: &str) -> Result<String> {
        tokio::time::timeout(self.timeout, self.run_thread(prompt))
            .await
            .map_err(|_| {
                Error::Assistant(format!("no answer within {}s", self.timeout.as_secs()))
            })?
    }
}

/// Text of the newest assistant message; the list is newest first
fn assistant_reply(messages: &MessageList) -> Result<String> {
    let text = messages
        .data
        .iter()
        .find(|m| m.role == "assistant")
        .map(|m| {
            m.content
                .iter()
                .filter(|part| part.kind == "text")
                .filter_map(|part| part.text.as_ref().map(|t| t.value.as_str()))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(Error::Assistant("no response content".to_string()));
    }
    Ok(text.to_string())
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct CreateRun<'a> {
    assistant_id: &'a str,
}

#[derive(Deserialize)]
struct ApiObject {
    id: String,
}

#[derive(Deserialize)]
struct Run {
    id: String,
    status: String,
    #[serde(default)]
    last_error: Option<RunError>,
}

impl Run {
    fn is_pending(&self) -> bool {
        matches!(self.status.as_str(), "queued" | "in_progress")
    }
}

#[derive(Deserialize)]
struct RunError {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<TextValue>,
}

#[derive(Deserialize)]
struct TextValue {
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(json: &str) -> MessageList {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn joins_text_parts_of_newest_assistant_message() {
        let list = messages(
            r#"{"data":[
                {"role":"assistant","content":[
                    {"type":"text","text":{"value":"Bong","annotations":[]}},
                    {"type":"image_file","image_file":{"file_id":"f1"}},
                    {"type":"text","text":{"value":"again"}}
                ]},
                {"role":"user","content":[{"type":"text","text":{"value":"Bing"}}]},
                {"role":"assistant","content":[{"type":"text","text":{"value":"older"}}]}
            ]}"#,
        );
        assert_eq!(assistant_reply(&list).unwrap(), "Bong again");
    }

    #[test]
    fn missing_assistant_message_is_an_error() {
        let list = messages(r#"{"data":[{"role":"user","content":[]}]}"#);
        assert!(assistant_reply(&list).is_err());

        let list = messages(r#"{"data":[{"role":"assistant","content":[]}]}"#);
        assert!(assistant_reply(&list).is_err());
    }

    #[test]
    fn pending_statuses() {
        let run = |status: &str| Run {
            id: "run_1".to_string(),
            status: status.to_string(),
            last_error: None,
        };
        assert!(run("queued").is_pending());
        assert!(run("in_progress").is_pending());
        assert!(!run("completed").is_pending());
        assert!(!run("failed").is_pending());
        assert!(!run("requires_action").is_pending());
    }
}
