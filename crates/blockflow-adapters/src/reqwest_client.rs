use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use blockflow_core::capability::{HttpClient, HttpError, HttpMethod, HttpResponse};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_USER_AGENT: &str = "blockflow/0.1";

/// Default HTTP client using reqwest.
///
/// Non-2xx responses are returned as-is; the caller decides what a status means. Response
/// bodies are parsed as JSON when possible and kept as a string otherwise.
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self, HttpError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn decode_body(text: String) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn request(
        &self,
        http_method: HttpMethod,
        url: &str,
        body: Option<&Value>,
        headers: &BTreeMap<String, String>,
    ) -> Result<HttpResponse, HttpError> {
        let mut request = self.client.request(method(http_method), url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| HttpError::Decode(e.to_string()))?;
        debug!(
            event = "http.response_received",
            domain = "http",
            method = http_method.as_str(),
            status = status,
            bytes = text.len()
        );
        Ok(HttpResponse {
            data: decode_body(text),
            status,
        })
    }
}
