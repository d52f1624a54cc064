use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{NotificationSender, SenderError, ensure_success, wrong_config};
use crate::notifications::models::ChannelConfig;

const PUSHBULLET_API: &str = "https://api.pushbullet.com";

/// Creates a "note" push through the Pushbullet v2 API.
pub struct PushBulletSender {
    client: Client,
    base_url: String,
}

impl Default for PushBulletSender {
    fn default() -> Self {
        Self::new()
    }
}

impl PushBulletSender {
    pub fn new() -> Self {
        Self::with_base_url(PUSHBULLET_API)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Serialize)]
struct PushNote<'a> {
    #[serde(rename = "type")]
    push_type: &'a str,
    title: &'a str,
    body: &'a str,
    email: &'a str,
}

#[async_trait]
impl NotificationSender for PushBulletSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        subject: &str,
        message: &str,
    ) -> Result<(), SenderError> {
        let ChannelConfig::PushBullet { access_token, email } = config else {
            return Err(wrong_config("PushBullet", config));
        };

        let payload = PushNote {
            push_type: "note",
            title: subject,
            body: message,
            email,
        };
        let api_url = format!("{}/v2/pushes", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&api_url)
            .header("Access-Token", access_token)
            .json(&payload)
            .send()
            .await?;
        ensure_success("Pushbullet API", response).await
    }
}
