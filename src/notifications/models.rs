use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Transport-specific settings of a notification channel, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    #[serde(rename = "simplepush")]
    SimplePush { key: String },
    #[serde(rename = "pushbullet")]
    PushBullet {
        access_token: String,
        #[serde(default)]
        email: String,
    },
    Telegram {
        bot_token: String,
        chat_id: String,
    },
    Webhook {
        url: String,
        #[serde(default = "default_webhook_method")]
        method: String, // "GET" or "POST"
        headers: Option<HashMap<String, String>>,
        /// Tera template rendered with `subject` and `message`.
        body_template: Option<String>,
    },
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

impl ChannelConfig {
    pub fn channel_type(&self) -> &'static str {
        match self {
            ChannelConfig::SimplePush { .. } => "simplepush",
            ChannelConfig::PushBullet { .. } => "pushbullet",
            ChannelConfig::Telegram { .. } => "telegram",
            ChannelConfig::Webhook { .. } => "webhook",
        }
    }
}

/// A named channel as declared in `monitor.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelSettings {
    /// Key used by target and severity `alerts` maps.
    pub name: String,
    /// Global switch. A disabled channel never sends.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Enablement when neither the target nor its severity policy decides.
    #[serde(default)]
    pub default: bool,
    #[serde(flatten)]
    pub config: ChannelConfig,
}

fn default_true() -> bool {
    true
}
