use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{NotificationSender, SenderError};
use crate::notifications::models::Notification;

const API_BASE: &str = "https://api.telegram.org";

/// A sender for pushing notifications via the Telegram Bot API.
pub struct TelegramSender {
    client: Client,
    api_url: String,
    chat_id: i64,
}

impl TelegramSender {
    pub fn new(bot_token: &str, chat_id: i64) -> Self {
        Self::with_base_url(API_BASE, bot_token, chat_id)
    }

    pub fn with_base_url(base_url: &str, bot_token: &str, chat_id: i64) -> Self {
        Self {
            client: Client::new(),
            api_url: format!("{}/bot{bot_token}/sendMessage", base_url.trim_end_matches('/')),
            chat_id,
        }
    }
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'a str,
    disable_notification: bool,
}

fn payload(chat_id: i64, notification: &Notification) -> TelegramMessage<'_> {
    TelegramMessage {
        chat_id,
        text: &notification.text,
        parse_mode: "HTML",
        disable_notification: notification.is_silent(),
    }
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(&self, notification: &Notification) -> Result<(), SenderError> {
        let response = self
            .client
            .post(&self.api_url)
            .json(&payload(self.chat_id, notification))
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Telegram API returned non-success status: {status}. Body: {error_body}"
            )));
        }

        Ok(())
    }
}
