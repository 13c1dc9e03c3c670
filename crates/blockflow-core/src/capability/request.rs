use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Route the graph is mounted on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteMeta {
    pub id: String,
    pub method: String,
    pub path: String,
}

/// Inbound request as seen by the `http.get*` blocks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestData {
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    /// Path parameters.
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Value,
}

impl RequestData {
    /// Header lookup, case-insensitive on the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CookieSpec {
    pub value: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub options: Value,
}

/// Response being assembled by the `http.set*` and `response` blocks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponseState {
    pub status: Option<u16>,
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, CookieSpec>,
    pub body: Option<Value>,
}
