//! Engine clients: the trait seam, the Anthropic-backed provider, and the
//! disabled fallback used when no API key is configured.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::postprocess::parse_relevance_score;
use super::retry::EngineError;
use crate::config::AppConfig;

/// Score used when relevance cannot be evaluated. Sits exactly on the
/// default gate threshold, so unscored items pass rather than vanish.
pub const NEUTRAL_RELEVANCE: u8 = 5;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Posts are clipped before prompting; feeds occasionally carry huge posts.
const PROMPT_TEXT_CHARS: usize = 1200;
/// Length guidance baked into the summary prompt.
const SUMMARY_CHAR_HINT: usize = 150;

#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Topical relevance 0..=10 of `text` coming from the source `label`.
    async fn score_relevance(&self, text: &str, label: &str) -> Result<u8, EngineError>;

    /// One-sentence summary of `text`.
    async fn summarize(&self, text: &str, label: &str) -> Result<String, EngineError>;

    fn name(&self) -> &'static str;
}

pub type DynEngine = Arc<dyn EngineClient>;

/// Factory: the real provider when an API key is present, the disabled one
/// otherwise. Never fails; a missing key degrades, it does not abort.
pub fn build_engine(config: &AppConfig, topic: &str) -> DynEngine {
    match &config.anthropic_api_key {
        Some(key) => {
            let mut engine = AnthropicEngine::new(key, &config.engine_model, topic);
            if let Some(url) = &config.engine_url {
                engine = engine.with_base_url(url);
            }
            Arc::new(engine)
        }
        None => {
            warn!("no engine API key configured; summaries use the local fallback");
            Arc::new(DisabledEngine)
        }
    }
}

pub struct AnthropicEngine {
    http: reqwest::Client,
    api_key: String,
    model: String,
    topic: String,
    base_url: String,
}

impl AnthropicEngine {
    pub fn new(api_key: &str, model: &str, topic: &str) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("channel-digest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            topic: topic.to_string(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    /// Point at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String, EngineError> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            max_tokens: u32,
            system: &'a str,
            messages: Vec<Message<'a>>,
        }
        #[derive(Deserialize)]
        struct Reply {
            #[serde(default)]
            content: Vec<Block>,
        }
        #[derive(Deserialize)]
        struct Block {
            #[serde(default)]
            text: String,
        }

        let request = Request {
            model: &self.model,
            max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: user,
            }],
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }

        let reply: Reply = response
            .json()
            .await
            .map_err(|e| EngineError::BadResponse(e.to_string()))?;
        let text = reply
            .content
            .first()
            .map(|b| b.text.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(EngineError::BadResponse("empty completion".to_string()));
        }
        Ok(text)
    }
}

fn classify_status(status: u16, body: &str) -> EngineError {
    let detail = format!("status {status}: {}", clip(body, 200));
    match status {
        400 | 401 | 403 | 404 => EngineError::Misconfigured(detail),
        _ => EngineError::Transient(detail),
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[async_trait]
impl EngineClient for AnthropicEngine {
    async fn score_relevance(&self, text: &str, label: &str) -> Result<u8, EngineError> {
        let system = format!(
            "You rate how relevant a post is to {} news. \
             Reply with a single integer from 0 to 10 and nothing else.",
            self.topic
        );
        let user = format!("Source: {label}\n\nPost:\n{}", clip(text, PROMPT_TEXT_CHARS));
        let reply = self.complete(&system, &user, 8).await?;
        match parse_relevance_score(&reply) {
            Some(score) => {
                debug!(score, label, "relevance scored");
                Ok(score)
            }
            None => Err(EngineError::BadResponse(format!(
                "no score in reply: {}",
                clip(&reply, 80)
            ))),
        }
    }

    async fn summarize(&self, text: &str, label: &str) -> Result<String, EngineError> {
        let system = format!(
            "You write digest entries about {} news. Summarize the post in one \
             sentence of at most {} characters, plain factual tone. Output only \
             the sentence itself: no preamble, no quotes, no bullets.",
            self.topic, SUMMARY_CHAR_HINT
        );
        let user = format!("Source: {label}\n\nPost:\n{}", clip(text, PROMPT_TEXT_CHARS));
        self.complete(&system, &user, 200).await
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

/// Stand-in when summarization is not configured: every item passes the
/// gate with a neutral score and summaries come from the local fallback.
pub struct DisabledEngine;

#[async_trait]
impl EngineClient for DisabledEngine {
    async fn score_relevance(&self, _text: &str, _label: &str) -> Result<u8, EngineError> {
        Ok(NEUTRAL_RELEVANCE)
    }

    async fn summarize(&self, _text: &str, _label: &str) -> Result<String, EngineError> {
        Err(EngineError::Disabled)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_separates_config_errors() {
        assert!(matches!(
            classify_status(401, "bad key"),
            EngineError::Misconfigured(_)
        ));
        assert!(matches!(
            classify_status(429, "slow down"),
            EngineError::Transient(_)
        ));
        assert!(matches!(
            classify_status(500, ""),
            EngineError::Transient(_)
        ));
    }

    #[test]
    fn clip_counts_characters_not_bytes() {
        assert_eq!(clip("день знаний", 4), "день");
        assert_eq!(clip("short", 100), "short");
    }

    #[tokio::test]
    async fn disabled_engine_scores_neutral_and_never_summarizes() {
        let engine = DisabledEngine;
        assert_eq!(engine.score_relevance("text", "label").await.unwrap(), NEUTRAL_RELEVANCE);
        assert!(matches!(
            engine.summarize("text", "label").await,
            Err(EngineError::Disabled)
        ));
    }

    #[test]
    fn factory_degrades_without_an_api_key() {
        let config = AppConfig {
            database_url: "sqlite::memory:".into(),
            gateway_url: "http://localhost:9000".into(),
            gateway_token: None,
            anthropic_api_key: None,
            engine_model: "claude-3-5-haiku-latest".into(),
            engine_url: None,
            bot_token: None,
            target_channel: None,
            run_deadline: Duration::from_secs(300),
            fetch_limit: 100,
        };
        let engine = build_engine(&config, "education technology");
        assert_eq!(engine.name(), "disabled");
    }
}
