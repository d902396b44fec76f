//! Telegram bot transport.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::PublishTransport;

const API_BASE: &str = "https://api.telegram.org";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct TelegramPublisher {
    token: String,
    chat: String,
    client: Client,
    timeout: Duration,
    api_base: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramPublisher {
    pub fn new(token: String, chat: String) -> Self {
        Self {
            token,
            chat,
            client: Client::new(),
            timeout: DEFAULT_TIMEOUT,
            api_base: API_BASE.to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Point at a different endpoint (tests, local bot API servers).
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl PublishTransport for TelegramPublisher {
    async fn publish(&self, text: &str) -> Result<()> {
        // The token is part of the URL; never log it.
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let payload = SendMessage {
            chat_id: &self.chat,
            text,
            parse_mode: "Markdown",
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .context("telegram request failed")?;

        let status = response.status();
        let reply: ApiReply = response
            .json()
            .await
            .context("telegram reply was not json")?;
        if !status.is_success() || !reply.ok {
            return Err(anyhow!(
                "telegram rejected the message ({status}): {}",
                reply.description.as_deref().unwrap_or("no description")
            ));
        }
        Ok(())
    }

    fn destination(&self) -> &str {
        &self.chat
    }
}
