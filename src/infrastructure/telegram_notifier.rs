use async_trait::async_trait;
use serde::Serialize;

use crate::application::{AppError, AppResult, Notifier};
use crate::domain::SubscriberId;

/// Telegram Bot API transport. The subscriber address is the chat id.
pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token,
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessageReq<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, to: &SubscriberId, message: &str) -> AppResult<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);

        let payload = SendMessageReq {
            chat_id: to.as_str(),
            text: message,
        };

        self.client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Delivery(e.to_string()))?
            .error_for_status()
            .map_err(|e| AppError::Delivery(e.to_string()))?;

        Ok(())
    }
}
