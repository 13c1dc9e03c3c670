use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub data: Value,
    pub status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpError {
    #[error("http transport error: {0}")]
    Transport(String),
    #[error("http response decode error: {0}")]
    Decode(String),
}

/// Outbound HTTP capability used by the `httpRequest` block.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&Value>,
        headers: &BTreeMap<String, String>,
    ) -> Result<HttpResponse, HttpError>;

    async fn get(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<HttpResponse, HttpError> {
        self.request(HttpMethod::Get, url, None, headers).await
    }

    async fn post(
        &self,
        url: &str,
        body: Option<&Value>,
        headers: &BTreeMap<String, String>,
    ) -> Result<HttpResponse, HttpError> {
        self.request(HttpMethod::Post, url, body, headers).await
    }

    async fn put(
        &self,
        url: &str,
        body: Option<&Value>,
        headers: &BTreeMap<String, String>,
    ) -> Result<HttpResponse, HttpError> {
        self.request(HttpMethod::Put, url, body, headers).await
    }

    async fn patch(
        &self,
        url: &str,
        body: Option<&Value>,
        headers: &BTreeMap<String, String>,
    ) -> Result<HttpResponse, HttpError> {
        self.request(HttpMethod::Patch, url, body, headers).await
    }

    async fn delete(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<HttpResponse, HttpError> {
        self.request(HttpMethod::Delete, url, None, headers).await
    }
}
