use async_trait::async_trait;
use reqwest::Response;
use thiserror::Error;

use super::models::ChannelConfig;

pub mod pushbullet;
pub mod simplepush;
pub mod telegram;
pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
}

/// Delivers one alert through a specific channel type.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Sends `subject` and `message` using the channel's transport settings.
    async fn send(
        &self,
        config: &ChannelConfig,
        subject: &str,
        message: &str,
    ) -> Result<(), SenderError>;
}

/// Maps a non-success response to [`SenderError::SendFailed`] with its body.
pub(crate) async fn ensure_success(service: &str, response: Response) -> Result<(), SenderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let error_body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    Err(SenderError::SendFailed(format!(
        "{service} returned non-success status: {status}. Body: {error_body}"
    )))
}

pub(crate) fn wrong_config(expected: &str, found: &ChannelConfig) -> SenderError {
    SenderError::InvalidConfiguration(format!(
        "Expected {expected} config, but found {}.",
        found.channel_type()
    ))
}
