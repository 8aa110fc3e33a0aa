//! OpenAI-compatible chat completion backend.

use std::time::Duration;

use async_trait::async_trait;
use nl2sparql_ir::{parse_ir_lists, QueryIr};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{system_prompt, LlmError, QueryParser};

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_MODEL_ENV: &str = "OPENAI_MODEL";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    /// Fixed sampling seed, so the same question parses the same way.
    pub seed: u64,
    pub timeout: Option<Duration>,
}

impl LlmConfig {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            max_tokens: 1000,
            seed: 42,
            timeout: Some(Duration::from_secs(60)),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = normalize_base_url(url);
        self
    }

    /// `OPENAI_API_KEY` and `OPENAI_MODEL` are required, `OPENAI_BASE_URL`
    /// defaults to the public endpoint.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, LlmError> {
        let required = |key: &'static str| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(LlmError::MissingEnv(key))
        };
        let config = Self::new(&required(OPENAI_API_KEY_ENV)?, &required(OPENAI_MODEL_ENV)?);
        Ok(match get(OPENAI_BASE_URL_ENV) {
            Some(url) => config.with_base_url(&url),
            None => config,
        })
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let mut host = base_url.trim().to_string();
    if host.is_empty() {
        host = DEFAULT_OPENAI_BASE_URL.to_string();
    }
    if !host.starts_with("http://") && !host.starts_with("https://") {
        host = format!("https://{host}");
    }
    host.trim_end_matches('/').to_string()
}

pub struct ChatQueryParser {
    client: reqwest::Client,
    config: LlmConfig,
    wordlist: Option<String>,
}

impl ChatQueryParser {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| LlmError::Http(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            config,
            wordlist: None,
        })
    }

    /// Guide the model with the schema's multi-word names
    /// (see [`crate::annotated_wordlist`]).
    pub fn with_wordlist(mut self, wordlist: String) -> Self {
        self.wordlist = Some(wordlist).filter(|w| !w.is_empty());
        self
    }

    pub fn request_body(&self, question: &str) -> Value {
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system_prompt(self.wordlist.as_deref()) },
                { "role": "user", "content": question },
            ],
            "max_tokens": self.config.max_tokens,
            "seed": self.config.seed,
        })
    }
}

/// `choices[0].message.content` of a chat completion.
pub fn message_content(response: &Value) -> Option<String> {
    let content = response
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()?
        .trim();
    (!content.is_empty()).then(|| content.to_string())
}

#[async_trait]
impl QueryParser for ChatQueryParser {
    async fn parse_query(&self, question: &str) -> Result<QueryIr, LlmError> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        debug!(%url, model = %self.config.model, "requesting question parse");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(question))
            .send()
            .await
            .map_err(|e| LlmError::Http(format!("failed to reach {url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "chat completion failed");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| LlmError::Http(format!("invalid JSON response: {e}")))?;
        let lists = message_content(&value).ok_or(LlmError::EmptyResponse)?;
        debug!(%lists, "model answered");
        Ok(parse_ir_lists(&lists)?)
    }
}
