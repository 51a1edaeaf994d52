//! Chat completion client
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint.

use crate::error::ChatError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Trait for chat completion backends
pub trait ChatCompleter: Send + Sync {
    /// Return the assistant's answer to `messages`
    fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ChatError>;
}

/// OpenAI-compatible chat completion client
pub struct OpenAiChat {
    /// Base URL, e.g. "https://api.openai.com/v1"
    endpoint: String,
    /// Local servers often run without one
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiChat {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            endpoint: normalize_endpoint(endpoint),
            api_key,
            timeout,
        }
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }
}

/// Accept both the API base and a pasted full completions URL
fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    trimmed
        .strip_suffix("/chat/completions")
        .unwrap_or(trimmed)
        .to_string()
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatCompleter for OpenAiChat {
    fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ChatError> {
        if self.api_key.is_none() && self.endpoint.contains("api.openai.com") {
            return Err(ChatError::MissingApiKey(
                "set OPENAI_API_KEY or create OPENAI_API_KEY.txt".into(),
            ));
        }

        let client = ureq::AgentBuilder::new().timeout(self.timeout).build();

        tracing::debug!(
            "Calling chat completion: endpoint={}, model={}, {} messages",
            self.endpoint,
            model,
            messages.len()
        );
        let start = std::time::Instant::now();

        let mut request = client
            .post(&self.url())
            .set("Content-Type", "application/json");
        if let Some(ref key) = self.api_key {
            request = request.set("Authorization", &format!("Bearer {}", key));
        }

        let response = request
            .send_json(ChatRequest { model, messages })
            .map_err(|e| match e {
                ureq::Error::Status(status, resp) => {
                    let body = resp.into_string().unwrap_or_default();
                    ChatError::Request(format!("API returned status {}: {}", status, body))
                }
                ureq::Error::Transport(t) => ChatError::Request(t.to_string()),
            })?;

        let parsed: ChatResponse = response
            .into_json()
            .map_err(|e| ChatError::Parse(format!("Failed to parse API response: {}", e)))?;

        let answer = extract_answer(parsed)?;
        tracing::info!(
            "Chat completion finished in {:.2}s ({} chars)",
            start.elapsed().as_secs_f32(),
            answer.chars().count()
        );
        Ok(answer)
    }
}

fn extract_answer(response: ChatResponse) -> Result<String, ChatError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::Parse("API response has no choices".into()))?
        .message
        .content
        .unwrap_or_default();

    let answer = content.trim();
    if answer.is_empty() {
        return Err(ChatError::EmptyAnswer);
    }
    Ok(answer.to_string())
}
