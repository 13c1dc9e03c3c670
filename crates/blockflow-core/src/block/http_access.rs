//! Blocks that read the inbound request or shape the outgoing response held by the
//! run context.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Block, BlockConfig, BlockError, BlockKind, BlockOutput, Link, value_kind_name};
use crate::capability::CookieSpec;
use crate::runtime::RunContext;
use crate::script::{Evaluator, resolve, resolve_deep};

fn text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn require_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name must not be empty".into());
    }
    Ok(())
}

/// Where `http.getParam` looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    #[default]
    Path,
    Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestRead {
    Header,
    Cookie,
    Param,
    Body,
}

impl RequestRead {
    fn kind(self) -> BlockKind {
        match self {
            RequestRead::Header => BlockKind::HttpGetHeader,
            RequestRead::Cookie => BlockKind::HttpGetCookie,
            RequestRead::Param => BlockKind::HttpGetParam,
            RequestRead::Body => BlockKind::HttpGetBody,
        }
    }

    /// Every read except the body needs a name.
    pub fn check(self, config: &RequestReadConfig) -> Result<(), String> {
        match self {
            RequestRead::Body => Ok(()),
            _ => require_name(&config.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestReadConfig {
    /// Header, cookie or parameter name. For the body, an optional top-level field.
    pub name: String,
    pub source: ParamSource,
}

impl BlockConfig for RequestReadConfig {}

/// Outputs one piece of the inbound request, or `null` when it is absent.
pub struct RequestReadBlock {
    link: Link,
    read: RequestRead,
    config: RequestReadConfig,
}

impl RequestReadBlock {
    pub fn new(link: Link, read: RequestRead, config: RequestReadConfig) -> Self {
        Self { link, read, config }
    }

    fn read(&self, ctx: &RunContext) -> Value {
        let request = ctx.request();
        let name = self.config.name.as_str();
        let found = match self.read {
            RequestRead::Header => request.header(name).map(str::to_string),
            RequestRead::Cookie => request.cookies.get(name).cloned(),
            RequestRead::Param => match self.config.source {
                ParamSource::Path => request.params.get(name).cloned(),
                ParamSource::Query => request.query.get(name).cloned(),
            },
            RequestRead::Body if name.is_empty() => return request.body.clone(),
            RequestRead::Body => return request.body.get(name).cloned().unwrap_or(Value::Null),
        };
        found.map_or(Value::Null, Value::String)
    }
}

#[async_trait]
impl Block for RequestReadBlock {
    fn id(&self) -> &str {
        &self.link.id
    }

    fn kind(&self) -> BlockKind {
        self.read.kind()
    }

    async fn execute(&self, ctx: &RunContext, _params: Value) -> Result<BlockOutput, BlockError> {
        Ok(self.link.success(self.read(ctx)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderConfig {
    pub name: String,
    pub value: Value,
}

impl BlockConfig for HeaderConfig {
    fn validate(&self) -> Result<(), String> {
        require_name(&self.name)
    }
}

/// Sets a response header; passes its input through.
pub struct SetHeaderBlock {
    link: Link,
    config: HeaderConfig,
}

impl SetHeaderBlock {
    pub fn new(link: Link, config: HeaderConfig) -> Self {
        Self { link, config }
    }
}

#[async_trait]
impl Block for SetHeaderBlock {
    fn id(&self) -> &str {
        &self.link.id
    }

    fn kind(&self) -> BlockKind {
        BlockKind::HttpSetHeader
    }

    async fn execute(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, BlockError> {
        let resolved = {
            let vm = ctx.vm_with("params", &params);
            resolve(vm.as_ref(), &self.config.value)
        };
        let value = match resolved {
            Ok(value) => text(value),
            Err(err) => return Ok(BlockOutput::failure(err.to_string())),
        };
        ctx.update_response(|response| {
            response.headers.insert(self.config.name.clone(), value);
        });
        Ok(self.link.success(params))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieConfig {
    pub name: String,
    pub value: Value,
    /// Passed through to the HTTP layer untouched (`maxAge`, `httpOnly`, ...).
    #[serde(default)]
    pub options: Value,
}

impl BlockConfig for CookieConfig {
    fn validate(&self) -> Result<(), String> {
        require_name(&self.name)
    }
}

/// Sets a response cookie; passes its input through.
pub struct SetCookieBlock {
    link: Link,
    config: CookieConfig,
}

impl SetCookieBlock {
    pub fn new(link: Link, config: CookieConfig) -> Self {
        Self { link, config }
    }

    fn cookie(&self, vm: &dyn Evaluator) -> Result<CookieSpec, String> {
        Ok(CookieSpec {
            value: text(resolve(vm, &self.config.value).map_err(|e| e.to_string())?),
            options: resolve_deep(vm, &self.config.options).map_err(|e| e.to_string())?,
        })
    }
}

#[async_trait]
impl Block for SetCookieBlock {
    fn id(&self) -> &str {
        &self.link.id
    }

    fn kind(&self) -> BlockKind {
        BlockKind::HttpSetCookie
    }

    async fn execute(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, BlockError> {
        let cookie = {
            let vm = ctx.vm_with("params", &params);
            self.cookie(vm.as_ref())
        };
        let cookie = match cookie {
            Ok(cookie) => cookie,
            Err(message) => return Ok(BlockOutput::failure(message)),
        };
        ctx.update_response(|response| {
            response.cookies.insert(self.config.name.clone(), cookie);
        });
        Ok(self.link.success(params))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResponseConfig {
    /// Number or script; unset keeps whatever status is already recorded.
    pub status: Option<Value>,
    pub body: Value,
    /// Respond with the block input instead of `body`.
    pub use_param: bool,
}

impl BlockConfig for ResponseConfig {
    fn validate(&self) -> Result<(), String> {
        match &self.status {
            None | Some(Value::String(_)) => Ok(()),
            Some(Value::Number(n)) if n.as_u64().is_some_and(|s| (100..=599).contains(&s)) => {
                Ok(())
            }
            Some(other) => Err(format!("invalid status {other}")),
        }
    }
}

/// Records the response status and body; outputs the body.
pub struct ResponseBlock {
    link: Link,
    config: ResponseConfig,
}

impl ResponseBlock {
    pub fn new(link: Link, config: ResponseConfig) -> Self {
        Self { link, config }
    }

    fn parts(&self, vm: &dyn Evaluator, params: &Value) -> Result<(Option<u16>, Value), String> {
        let status = match &self.config.status {
            None => None,
            Some(raw) => match resolve(vm, raw).map_err(|e| e.to_string())? {
                Value::Number(n) => Some(
                    n.as_u64()
                        .and_then(|s| u16::try_from(s).ok())
                        .ok_or_else(|| format!("invalid status {n}"))?,
                ),
                other => {
                    return Err(format!(
                        "status must resolve to a number, got {}",
                        value_kind_name(&other)
                    ));
                }
            },
        };
        let body = if self.config.use_param {
            params.clone()
        } else {
            resolve_deep(vm, &self.config.body).map_err(|e| e.to_string())?
        };
        Ok((status, body))
    }
}

#[async_trait]
impl Block for ResponseBlock {
    fn id(&self) -> &str {
        &self.link.id
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Response
    }

    async fn execute(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, BlockError> {
        let resolved = {
            let vm = ctx.vm_with("params", &params);
            self.parts(vm.as_ref(), &params)
        };
        let (status, body) = match resolved {
            Ok(parts) => parts,
            Err(message) => return Ok(BlockOutput::failure(message)),
        };
        ctx.update_response(|response| {
            if status.is_some() {
                response.status = status;
            }
            response.body = Some(body.clone());
        });
        Ok(self.link.success(body))
    }
}
