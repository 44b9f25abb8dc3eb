//! Answer generation backends.
//!
//! A [`Generator`] turns a question, optional retrieved context and prior
//! conversation into an answer. Every backend sends the same message list
//! built by [`build_messages`]: a system prompt (with the context appended
//! under a `DOCUMENT CONTEXT:` heading), then the history, then the user
//! prompt.
//!
//! | Config Value | Generator |
//! |-------------|-----------|
//! | `"disabled"` | [`DisabledGenerator`] |
//! | `"openai"` | [`OpenAIGenerator`] (`/v1/chat/completions`) |
//! | `"ollama"` | [`OllamaGenerator`] (`/api/chat`) |
//! | `"cohere"` | [`CohereGenerator`] (`/v2/chat`) |

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::cache::{ChatMessage, Role};
use crate::config::GenerationConfig;
use crate::embedding::send_with_retry;

pub const SYSTEM_PROMPT: &str = "You are an assistant that answers questions using the provided document context.

RULES:
1. Answer ONLY from information in the provided context.
2. If the context does not contain the answer, say \"Sorry, I could not find that information in the documents.\"
3. Do not invent or add information that is not in the context.
4. Reply in the same language as the question.
5. Keep answers concise and to the point.";

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const COHERE_CHAT_URL: &str = "https://api.cohere.com/v2/chat";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        context: Option<&str>,
        history: &[ChatMessage],
    ) -> Result<String>;
}

/// A chat message as sent to a provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptMessage {
    pub role: &'static str,
    pub content: String,
}

pub fn build_messages(
    prompt: &str,
    context: Option<&str>,
    history: &[ChatMessage],
) -> Vec<PromptMessage> {
    let mut system = SYSTEM_PROMPT.to_string();
    if let Some(ctx) = context {
        system.push_str("\n\nDOCUMENT CONTEXT:\n");
        system.push_str(ctx);
    }

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(PromptMessage {
        role: Role::System.as_str(),
        content: system,
    });
    messages.extend(history.iter().map(|m| PromptMessage {
        role: m.role.as_str(),
        content: m.content.clone(),
    }));
    messages.push(PromptMessage {
        role: Role::User.as_str(),
        content: prompt.to_string(),
    });
    messages
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn require_model(config: &GenerationConfig, provider: &str) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| anyhow!("generation.model required for {} provider", provider))
}

fn text_at<'a>(json: &'a Value, pointer: &str, label: &str) -> Result<&'a str> {
    json.pointer(pointer)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Invalid {} response: missing {}", label, pointer))
}

// ============ Disabled ============

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _context: Option<&str>,
        _history: &[ChatMessage],
    ) -> Result<String> {
        bail!("Generation provider is disabled")
    }
}

// ============ OpenAI ============

/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIGenerator {
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = require_model(config, "OpenAI")?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model,
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        context: Option<&str>,
        history: &[ChatMessage],
    ) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": build_messages(prompt, context, history),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        let json = send_with_retry(
            &self.client,
            OPENAI_CHAT_URL,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        Ok(text_at(&json, "/choices/0/message/content", "OpenAI")?.to_string())
    }
}

// ============ Ollama ============

pub struct OllamaGenerator {
    model: String,
    url: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: require_model(config, "Ollama")?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        context: Option<&str>,
        history: &[ChatMessage],
    ) -> Result<String> {
        let url = format!("{}/api/chat", self.url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": build_messages(prompt, context, history),
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        });
        let json =
            send_with_retry(&self.client, &url, None, &body, self.max_retries, "Ollama").await?;
        Ok(text_at(&json, "/message/content", "Ollama")?.to_string())
    }
}

// ============ Cohere ============

/// Requires the `COHERE_API_KEY` environment variable.
pub struct CohereGenerator {
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    client: reqwest::Client,
}

impl CohereGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = require_model(config, "Cohere")?;
        let api_key = std::env::var("COHERE_API_KEY")
            .map_err(|_| anyhow!("COHERE_API_KEY environment variable not set"))?;
        Ok(Self {
            model,
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Generator for CohereGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        context: Option<&str>,
        history: &[ChatMessage],
    ) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": build_messages(prompt, context, history),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        let json = send_with_retry(
            &self.client,
            COHERE_CHAT_URL,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "Cohere",
        )
        .await?;
        Ok(text_at(&json, "/message/content/0/text", "Cohere")?.to_string())
    }
}

/// Create the [`Generator`] named by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "cohere" => Ok(Arc::new(CohereGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
