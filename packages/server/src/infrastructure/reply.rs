//! Reply generators.
//!
//! [`OpenAiReplyGenerator`] calls an OpenAI-compatible `chat/completions`
//! endpoint. [`CannedReplyGenerator`] answers locally and is used when no
//! endpoint is configured.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ReplyError, ReplyGenerator, UserProfile};

const PREFIXES: [&str; 4] = ["Bot", "AI", "System", "Assistant"];

/// Bio used for a bot without a personal message
const DEFAULT_BIO: &str = "Online";

/// System prompt that makes the model play `bot`.
///
/// Fails when the profile lacks the archetype or typing style to play.
pub fn persona_prompt(bot: &UserProfile) -> Result<String, ReplyError> {
    let (Some(archetype), Some(style)) = (bot.archetype.as_deref(), bot.typing_style.as_deref())
    else {
        return Err(ReplyError::MissingPersonality(bot.id.to_string()));
    };
    let name = &bot.display_name;
    let bio = bot.personal_message.as_deref().unwrap_or(DEFAULT_BIO);
    Ok(format!(
        "You are {name}, a regular in a casual instant messenger chat room. \
         You are a peer chatting with friends, not an assistant.\n\
         Bio: {bio}\n\
         Archetype: {archetype}\n\
         Typing style: {style}\n\
         Match the typing style exactly. Keep replies under two sentences, \
         in plain text, and never prefix them with your name or a label."
    ))
}

/// Clean generated text: drop a leading `Name:` / `Bot:` / `AI:` style label
/// and wrapping quotes.
pub fn strip_bot_prefix(text: &str, persona: &str) -> String {
    let mut cleaned = text.trim();
    loop {
        let Some((label, rest)) = cleaned.split_once(':') else {
            break;
        };
        let label = label.trim();
        let is_label = label.eq_ignore_ascii_case(persona)
            || PREFIXES.iter().any(|p| label.eq_ignore_ascii_case(p));
        if !is_label {
            break;
        }
        cleaned = rest.trim_start();
    }
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”')] {
        if cleaned.len() >= 2
            && let Some(inner) = cleaned
                .strip_prefix(open)
                .and_then(|s| s.strip_suffix(close))
        {
            cleaned = inner.trim();
            break;
        }
    }
    cleaned.to_string()
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatTurn<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible HTTP reply generator.
pub struct OpenAiReplyGenerator {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiReplyGenerator {
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ReplyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReplyError::Failed(e.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.into(),
            api_key,
            model: model.into(),
        })
    }
}

#[async_trait]
impl ReplyGenerator for OpenAiReplyGenerator {
    async fn generate(&self, bot: &UserProfile, prompt: &str) -> Result<String, ReplyError> {
        let system = persona_prompt(bot)?;
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatTurn {
                    role: "system",
                    content: system,
                },
                ChatTurn {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
            max_tokens: 200,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ReplyError::Timeout
            } else {
                ReplyError::Failed(e.to_string())
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReplyError::Failed(format!("upstream returned {status}")));
        }
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ReplyError::Failed(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| strip_bot_prefix(&content, &bot.display_name))
            .unwrap_or_default();
        if text.is_empty() {
            return Err(ReplyError::Empty);
        }
        Ok(text)
    }
}

/// Offline generator answering with a fixed greeting.
#[derive(Debug, Default, Clone)]
pub struct CannedReplyGenerator;

#[async_trait]
impl ReplyGenerator for CannedReplyGenerator {
    async fn generate(&self, bot: &UserProfile, _prompt: &str) -> Result<String, ReplyError> {
        Ok(format!("Hello! I am {}.", bot.display_name))
    }
}
