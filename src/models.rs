use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::session::{Message, Role};
use crate::settings::Settings;

pub const SYSTEM_PROMPT: &str =
    "Tu es le Quiet Observer, un assistant calme et attentif. Réponds brièvement, avec clarté et douceur.";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model endpoint returned {status}: {detail}")]
    Remote { status: u16, detail: String },
    #[error("request cancelled")]
    Cancelled,
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produce the assistant's reply to the conversation so far. An empty
    /// reply is valid; callers substitute a placeholder.
    async fn complete(
        &self,
        history: &[Message],
        cancel: CancellationToken,
    ) -> Result<String, ModelError>;
}

#[derive(Clone)]
pub struct OpenAICompatible {
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    history_limit: usize,
    client: reqwest::Client,
}

impl OpenAICompatible {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            history_limit: settings.history_limit,
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OaiChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OaiChatResponse {
    #[serde(default)]
    choices: Vec<OaiChoice>,
}

#[derive(Debug, Deserialize, Default)]
struct OaiChoice {
    #[serde(default)]
    message: Option<OaiContent>,
    #[serde(default)]
    delta: Option<OaiContent>,
}

#[derive(Debug, Deserialize, Default)]
struct OaiContent {
    #[serde(default)]
    content: Option<String>,
}

/// Wire view of the conversation: the system instruction first, then the most
/// recent `limit` turns in their original order.
fn wire_history(history: &[Message], limit: usize) -> Vec<WireMessage<'_>> {
    let tail = &history[history.len().saturating_sub(limit)..];
    let mut out = Vec::with_capacity(tail.len() + 1);
    out.push(WireMessage { role: "system", content: SYSTEM_PROMPT });
    out.extend(tail.iter().map(|m| WireMessage {
        role: match m.role {
            Role::Assistant => "assistant",
            Role::User => "user",
        },
        content: m.content.as_str(),
    }));
    out
}

fn extract_reply(resp: OaiChatResponse) -> String {
    let Some(choice) = resp.choices.into_iter().next() else {
        return String::new();
    };
    choice
        .message
        .and_then(|m| m.content)
        .or_else(|| choice.delta.and_then(|d| d.content))
        .map(|c| c.trim().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl LanguageModel for OpenAICompatible {
    async fn complete(
        &self,
        history: &[Message],
        cancel: CancellationToken,
    ) -> Result<String, ModelError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = OaiChatRequest {
            model: &self.model,
            messages: wire_history(history, self.history_limit),
            temperature: self.temperature,
        };
        let mut rb = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            rb = rb.bearer_auth(key);
        }
        let exchange = async move {
            let resp = rb.send().await?;
            let status = resp.status();
            if !status.is_success() {
                let detail = match resp.text().await {
                    Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
                    _ => status.canonical_reason().unwrap_or("unknown error").to_string(),
                };
                return Err(ModelError::Remote { status: status.as_u16(), detail });
            }
            let parsed: OaiChatResponse = resp.json().await?;
            Ok(extract_reply(parsed))
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(ModelError::Cancelled),
            res = exchange => res,
        }
    }
}
