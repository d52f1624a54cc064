use async_trait::async_trait;
use reqwest::Client;

use super::{NotificationSender, SenderError, ensure_success, wrong_config};
use crate::notifications::models::ChannelConfig;

const SIMPLEPUSH_API: &str = "https://api.simplepush.io";

/// Sends via SimplePush's `send/<key>/<title>/<message>` GET endpoint.
pub struct SimplePushSender {
    client: Client,
    base_url: String,
}

impl Default for SimplePushSender {
    fn default() -> Self {
        Self::new()
    }
}

impl SimplePushSender {
    pub fn new() -> Self {
        Self::with_base_url(SIMPLEPUSH_API)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn send_url(&self, key: &str, subject: &str, message: &str) -> String {
        format!(
            "{}/send/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(key),
            urlencoding::encode(subject),
            urlencoding::encode(message)
        )
    }
}

#[async_trait]
impl NotificationSender for SimplePushSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        subject: &str,
        message: &str,
    ) -> Result<(), SenderError> {
        let ChannelConfig::SimplePush { key } = config else {
            return Err(wrong_config("SimplePush", config));
        };

        let response = self
            .client
            .get(self.send_url(key, subject, message))
            .send()
            .await?;
        ensure_success("SimplePush", response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn path_segments_are_encoded() {
        let sender = SimplePushSender::with_base_url("https://push.test/");
        assert_eq!(
            sender.send_url("k3y", "db-1 (disk)", "50% used/ok"),
            "https://push.test/send/k3y/db-1%20%28disk%29/50%25%20used%2Fok"
        );
    }

    #[tokio::test]
    async fn sends_get_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/send/k3y/subject/body"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sender = SimplePushSender::with_base_url(server.uri());
        let config = ChannelConfig::SimplePush {
            key: "k3y".to_string(),
        };
        sender.send(&config, "subject", "body").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_other_channel_config() {
        let sender = SimplePushSender::with_base_url("http://127.0.0.1:9");
        let config = ChannelConfig::Telegram {
            bot_token: "t".to_string(),
            chat_id: "c".to_string(),
        };
        assert!(matches!(
            sender.send(&config, "s", "m").await,
            Err(SenderError::InvalidConfiguration(_))
        ));
    }
}
