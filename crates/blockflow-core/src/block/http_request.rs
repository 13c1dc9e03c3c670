//! `httpRequest` block: outbound call through the context's [`HttpClient`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{Block, BlockConfig, BlockError, BlockKind, BlockOutput, Link};
use crate::capability::{HttpClient, HttpMethod};
use crate::runtime::RunContext;
use crate::script::{Evaluator, resolve, resolve_deep};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpRequestConfig {
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, Value>,
    pub body: Value,
    /// Send the block input as the body.
    pub use_param: bool,
}

impl BlockConfig for HttpRequestConfig {
    fn validate(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("url must not be empty".into());
        }
        Ok(())
    }
}

fn url_host(url: &str) -> Option<&str> {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    without_scheme
        .split('/')
        .next()
        .map(str::trim)
        .filter(|host| !host.is_empty())
}

fn header_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

struct Prepared {
    url: String,
    headers: BTreeMap<String, String>,
    body: Option<Value>,
}

pub struct HttpRequestBlock {
    link: Link,
    config: HttpRequestConfig,
}

impl HttpRequestBlock {
    pub fn new(link: Link, config: HttpRequestConfig) -> Self {
        Self { link, config }
    }

    fn prepare(&self, vm: &dyn Evaluator, params: &Value) -> Result<Prepared, BlockError> {
        let url = match resolve(vm, &Value::String(self.config.url.clone()))? {
            Value::String(url) => url,
            other => other.to_string(),
        };
        let mut headers = BTreeMap::new();
        for (name, value) in &self.config.headers {
            headers.insert(name.clone(), header_text(resolve(vm, value)?));
        }
        let body = if self.config.use_param {
            params.clone()
        } else {
            resolve_deep(vm, &self.config.body)?
        };
        Ok(Prepared {
            url,
            headers,
            body: (!body.is_null()).then_some(body),
        })
    }

    async fn send(
        &self,
        client: &dyn HttpClient,
        vm: &dyn Evaluator,
        params: &Value,
    ) -> Result<Value, BlockError> {
        let request = self.prepare(vm, params)?;
        debug!(
            event = "http.request_attempt",
            domain = "http",
            block_id = %self.link.id,
            method = self.config.method.as_str(),
            url_host = url_host(&request.url).unwrap_or("unknown")
        );
        let response = client
            .request(
                self.config.method,
                &request.url,
                request.body.as_ref(),
                &request.headers,
            )
            .await?;
        debug!(
            event = "http.request_succeeded",
            domain = "http",
            block_id = %self.link.id,
            status = response.status
        );
        serde_json::to_value(response).map_err(|e| BlockError::Other(e.to_string()))
    }
}

#[async_trait]
impl Block for HttpRequestBlock {
    fn id(&self) -> &str {
        &self.link.id
    }

    fn kind(&self) -> BlockKind {
        BlockKind::HttpRequest
    }

    async fn execute(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, BlockError> {
        let Some(client) = ctx.http() else {
            return Ok(BlockOutput::failure("httpRequest requires an http client"));
        };
        let vm = ctx.vm_with("params", &params);
        Ok(match self.send(client.as_ref(), vm.as_ref(), &params).await {
            Ok(output) => self.link.success(output),
            Err(err) => {
                debug!(event = "http.request_failed", domain = "http", block_id = %self.link.id, error = %err);
                BlockOutput::failure(err.to_string())
            }
        })
    }
}
