use std::time::Duration;

use alert_engine::NotificationSink;
use anyhow::{Context, Result};
use async_trait::async_trait;
use domain::UserId;
use reqwest::Client;
use serde::Serialize;

/// Sends alerts through the Telegram Bot API. The user id is the chat id.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    token: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl TelegramNotifier {
    pub fn new(api_base: String, token: String, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn send(&self, user_id: &UserId, message: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let resp = self
            .client
            .post(url)
            .json(&SendMessage {
                chat_id: user_id.as_str(),
                text: message,
            })
            .send()
            .await
            .context("telegram request failed")?;
        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to decode telegram response")?;
        check_telegram_response(status.as_u16(), &body)
    }
}

/// The Bot API signals success with `"ok": true`; anything else carries a
/// `description`.
pub fn check_telegram_response(status: u16, body: &serde_json::Value) -> Result<()> {
    if body.get("ok").and_then(|v| v.as_bool()) == Some(true) {
        return Ok(());
    }
    let description = body
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or("no description");
    anyhow::bail!("telegram sendMessage failed ({status}): {description}")
}
