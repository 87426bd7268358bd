use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::config::ChatId;
use crate::{Error, Result};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Outbound notification transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` to `target` using `token`. `Ok` only on confirmed delivery.
    async fn send(&self, target: &ChatId, text: &str, token: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a ChatId,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// Telegram Bot API `sendMessage` client
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_api_base(TELEGRAM_API_BASE, timeout)
    }

    pub fn with_api_base(api_base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("FeedHerald/1.0")
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, target: &ChatId, text: &str, token: &str) -> Result<()> {
        if token.is_empty() {
            return Err(Error::Telegram("no bot token configured".into()));
        }

        let url = format!("{}/bot{}/sendMessage", self.api_base, token);
        let payload = SendMessage {
            chat_id: target,
            text,
            parse_mode: "Markdown",
            disable_web_page_preview: false,
        };

        let resp = self.client.post(&url).json(&payload).send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(Error::Telegram(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let ok = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("ok").and_then(Value::as_bool))
            .unwrap_or(false);

        if !ok {
            return Err(Error::Telegram(body));
        }

        Ok(())
    }
}
