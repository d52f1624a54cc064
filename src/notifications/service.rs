use async_trait::async_trait;
use thiserror::Error;

use super::models::{ChannelConfig, ChannelSettings};
use super::senders::{
    NotificationSender, SenderError, pushbullet::PushBulletSender, simplepush::SimplePushSender,
    telegram::TelegramSender, webhook::WebhookSender,
};

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Channel '{0}' is disabled")]
    Disabled(String),
    #[error("Sender error on channel '{channel}': {source}")]
    Sender {
        channel: String,
        #[source]
        source: SenderError,
    },
}

/// Delivers an alert through one configured channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        channel: &ChannelSettings,
        subject: &str,
        message: &str,
    ) -> Result<(), NotificationError>;
}

/// Routes each channel to the sender for its type.
#[derive(Default)]
pub struct NotificationService {
    simplepush: SimplePushSender,
    pushbullet: PushBulletSender,
    telegram: TelegramSender,
    webhook: WebhookSender,
}

impl NotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, config: &ChannelConfig) -> &dyn NotificationSender {
        match config {
            ChannelConfig::SimplePush { .. } => &self.simplepush,
            ChannelConfig::PushBullet { .. } => &self.pushbullet,
            ChannelConfig::Telegram { .. } => &self.telegram,
            ChannelConfig::Webhook { .. } => &self.webhook,
        }
    }
}

#[async_trait]
impl Notifier for NotificationService {
    async fn notify(
        &self,
        channel: &ChannelSettings,
        subject: &str,
        message: &str,
    ) -> Result<(), NotificationError> {
        if !channel.enabled {
            return Err(NotificationError::Disabled(channel.name.clone()));
        }
        self.sender_for(&channel.config)
            .send(&channel.config, subject, message)
            .await
            .map_err(|source| NotificationError::Sender {
                channel: channel.name.clone(),
                source,
            })
    }
}
