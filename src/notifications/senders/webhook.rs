use async_trait::async_trait;
use reqwest::{Client, Method, header};
use tera::{Context, Tera};

use super::{NotificationSender, SenderError, ensure_success, wrong_config};
use crate::notifications::models::ChannelConfig;

const DEFAULT_BODY_TEMPLATE: &str =
    r#"{"subject": {{ subject | json_encode() }}, "message": {{ message | json_encode() }}}"#;

/// A sender for pushing notifications via a custom webhook.
pub struct WebhookSender {
    client: Client,
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookSender {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

fn render_body(template: &str, subject: &str, message: &str) -> Result<String, SenderError> {
    let mut context = Context::new();
    context.insert("subject", subject);
    context.insert("message", message);
    Tera::one_off(template, &context, false)
        .map_err(|e| SenderError::TemplatingError(e.to_string()))
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        subject: &str,
        message: &str,
    ) -> Result<(), SenderError> {
        let ChannelConfig::Webhook {
            url,
            method,
            headers,
            body_template,
        } = config
        else {
            return Err(wrong_config("Webhook", config));
        };

        let http_method = match method.to_uppercase().as_str() {
            "POST" => Method::POST,
            "GET" => Method::GET,
            _ => {
                return Err(SenderError::InvalidConfiguration(format!(
                    "Unsupported HTTP method: {method}"
                )));
            }
        };
        let is_post = http_method == Method::POST;
        let mut request_builder = self.client.request(http_method, url);

        if let Some(h) = headers {
            let mut header_map = header::HeaderMap::new();
            for (key, value) in h {
                let header_name = header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                    SenderError::InvalidConfiguration(format!("Invalid header name: {e}"))
                })?;
                let header_value = header::HeaderValue::from_str(value).map_err(|e| {
                    SenderError::InvalidConfiguration(format!("Invalid header value: {e}"))
                })?;
                header_map.insert(header_name, header_value);
            }
            request_builder = request_builder.headers(header_map);
        }

        if is_post {
            let template = body_template.as_deref().unwrap_or(DEFAULT_BODY_TEMPLATE);
            let rendered_body = render_body(template, subject, message)?;
            request_builder = request_builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(rendered_body);
        }

        let response = request_builder.send().await?;
        ensure_success("Webhook", response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{body_json, body_string, header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn webhook(url: String, method: &str, body_template: Option<&str>) -> ChannelConfig {
        let mut headers = HashMap::new();
        headers.insert("X-Token".to_string(), "s3cret".to_string());
        ChannelConfig::Webhook {
            url,
            method: method.to_string(),
            headers: Some(headers),
            body_template: body_template.map(str::to_string),
        }
    }

    #[test]
    fn default_template_produces_valid_json() {
        let body = render_body(DEFAULT_BODY_TEMPLATE, "db \"1\"", "line\nbreak").unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value, json!({"subject": "db \"1\"", "message": "line\nbreak"}));
    }

    #[tokio::test]
    async fn post_renders_custom_template() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header_matcher("x-token", "s3cret"))
            .and(body_string("ALERT db-1: disk full"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let config = webhook(
            format!("{}/hook", server.uri()),
            "post",
            Some("ALERT {{ subject }}: {{ message }}"),
        );
        WebhookSender::new().send(&config, "db-1", "disk full").await.unwrap();
    }

    #[tokio::test]
    async fn post_without_template_sends_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({"subject": "s", "message": "m"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = webhook(server.uri(), "POST", None);
        WebhookSender::new().send(&config, "s", "m").await.unwrap();
    }

    #[tokio::test]
    async fn get_sends_no_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(body_string(""))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = webhook(format!("{}/ping", server.uri()), "GET", Some("ignored"));
        WebhookSender::new().send(&config, "s", "m").await.unwrap();
    }

    #[tokio::test]
    async fn unsupported_method_is_rejected() {
        let config = webhook("http://127.0.0.1:9".to_string(), "PUT", None);
        assert!(matches!(
            WebhookSender::new().send(&config, "s", "m").await,
            Err(SenderError::InvalidConfiguration(_))
        ));
    }
}
