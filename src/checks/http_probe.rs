use async_trait::async_trait;
use reqwest::{Client, Method, header};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use thiserror::Error;

use crate::model::HttpMethod;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),
    #[error("Invalid request header: {0}")]
    InvalidHeader(String),
}

#[derive(Debug, Clone)]
pub struct HttpRequestSpec {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub elapsed_ms: f64,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

#[async_trait]
pub trait HttpProbe: Send + Sync {
    async fn request(&self, spec: &HttpRequestSpec) -> Result<HttpResponse, ProbeError>;
}

/// [`HttpProbe`] backed by a shared reqwest client. Relies on the client's
/// default timeouts.
#[derive(Clone, Default)]
pub struct ReqwestProbe {
    client: Client,
}

impl ReqwestProbe {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn request(&self, spec: &HttpRequestSpec) -> Result<HttpResponse, ProbeError> {
        let method = match spec.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };
        let mut request_builder = self.client.request(method, &spec.url);

        if spec.method == HttpMethod::Post {
            let mut header_map = header::HeaderMap::new();
            for (key, value) in &spec.headers {
                let header_name = header::HeaderName::from_bytes(key.as_bytes())
                    .map_err(|e| ProbeError::InvalidHeader(format!("{key}: {e}")))?;
                let header_value = header::HeaderValue::from_str(value)
                    .map_err(|e| ProbeError::InvalidHeader(format!("{key}: {e}")))?;
                header_map.insert(header_name, header_value);
            }
            request_builder = request_builder.headers(header_map);
            if let Some(body) = &spec.body {
                request_builder = request_builder.body(body.clone());
            }
        }

        let start_time = Instant::now();
        let response = request_builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_ascii_lowercase(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text().await?;
        let elapsed_ms = start_time.elapsed().as_secs_f64() * 1000.0;

        Ok(HttpResponse {
            status,
            headers,
            elapsed_ms,
            body,
        })
    }
}
