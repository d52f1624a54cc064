use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{NotificationSender, SenderError, ensure_success, wrong_config};
use crate::notifications::models::ChannelConfig;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// A sender for pushing notifications via the Telegram Bot API.
pub struct TelegramSender {
    client: Client,
    base_url: String,
}

impl Default for TelegramSender {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramSender {
    pub fn new() -> Self {
        Self::with_base_url(TELEGRAM_API)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }
}

/// Escapes text for Telegram MarkdownV2.
/// Characters to escape: _ * [ ] ( ) ~ ` > # + - = | { } . ! \
fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '=' | '|'
                | '{' | '}' | '.' | '!' | '\\'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn format_text(subject: &str, message: &str) -> String {
    format!(
        "*{}*\n{}",
        escape_markdown_v2(subject),
        escape_markdown_v2(message)
    )
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        subject: &str,
        message: &str,
    ) -> Result<(), SenderError> {
        let ChannelConfig::Telegram { bot_token, chat_id } = config else {
            return Err(wrong_config("Telegram", config));
        };

        let api_url = format!(
            "{}/bot{bot_token}/sendMessage",
            self.base_url.trim_end_matches('/')
        );
        let text = format_text(subject, message);
        let payload = TelegramMessage {
            chat_id,
            text: &text,
            parse_mode: "MarkdownV2",
        };

        let response = self.client.post(&api_url).json(&payload).send().await?;
        ensure_success("Telegram API", response).await
    }
}
