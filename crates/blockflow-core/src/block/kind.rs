use std::fmt;

use serde::{Deserialize, Serialize};

/// Every block kind the builder knows how to construct. The wire spelling is
/// what the editor persists in the block's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    #[serde(rename = "entrypoint")]
    Entrypoint,
    #[serde(rename = "code")]
    Code,
    #[serde(rename = "if")]
    If,
    #[serde(rename = "for")]
    For,
    #[serde(rename = "forEach")]
    ForEach,
    #[serde(rename = "transaction")]
    Transaction,
    #[serde(rename = "setVar")]
    SetVar,
    #[serde(rename = "getVar")]
    GetVar,
    #[serde(rename = "transformer")]
    Transformer,
    #[serde(rename = "arrayOps")]
    ArrayOps,
    #[serde(rename = "db.getAll")]
    DbGetAll,
    #[serde(rename = "db.getSingle")]
    DbGetSingle,
    #[serde(rename = "db.insert")]
    DbInsert,
    #[serde(rename = "db.insertBulk")]
    DbInsertBulk,
    #[serde(rename = "db.update")]
    DbUpdate,
    #[serde(rename = "db.delete")]
    DbDelete,
    #[serde(rename = "db.raw")]
    DbRaw,
    #[serde(rename = "httpRequest")]
    HttpRequest,
    #[serde(rename = "http.getHeader")]
    HttpGetHeader,
    #[serde(rename = "http.setHeader")]
    HttpSetHeader,
    #[serde(rename = "http.getCookie")]
    HttpGetCookie,
    #[serde(rename = "http.setCookie")]
    HttpSetCookie,
    #[serde(rename = "http.getParam")]
    HttpGetParam,
    #[serde(rename = "http.getBody")]
    HttpGetBody,
    #[serde(rename = "response")]
    Response,
    #[serde(rename = "consoleLogger")]
    ConsoleLogger,
    #[serde(rename = "interceptor")]
    Interceptor,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Entrypoint => "entrypoint",
            BlockKind::Code => "code",
            BlockKind::If => "if",
            BlockKind::For => "for",
            BlockKind::ForEach => "forEach",
            BlockKind::Transaction => "transaction",
            BlockKind::SetVar => "setVar",
            BlockKind::GetVar => "getVar",
            BlockKind::Transformer => "transformer",
            BlockKind::ArrayOps => "arrayOps",
            BlockKind::DbGetAll => "db.getAll",
            BlockKind::DbGetSingle => "db.getSingle",
            BlockKind::DbInsert => "db.insert",
            BlockKind::DbInsertBulk => "db.insertBulk",
            BlockKind::DbUpdate => "db.update",
            BlockKind::DbDelete => "db.delete",
            BlockKind::DbRaw => "db.raw",
            BlockKind::HttpRequest => "httpRequest",
            BlockKind::HttpGetHeader => "http.getHeader",
            BlockKind::HttpSetHeader => "http.setHeader",
            BlockKind::HttpGetCookie => "http.getCookie",
            BlockKind::HttpSetCookie => "http.setCookie",
            BlockKind::HttpGetParam => "http.getParam",
            BlockKind::HttpGetBody => "http.getBody",
            BlockKind::Response => "response",
            BlockKind::ConsoleLogger => "consoleLogger",
            BlockKind::Interceptor => "interceptor",
        }
    }

    /// Kinds that own a child engine built from their `executor` edge.
    pub fn has_executor(&self) -> bool {
        matches!(
            self,
            BlockKind::For | BlockKind::ForEach | BlockKind::Transaction
        )
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_as_str() {
        for kind in [
            BlockKind::Entrypoint,
            BlockKind::ForEach,
            BlockKind::DbInsertBulk,
            BlockKind::HttpGetParam,
            BlockKind::ConsoleLogger,
        ] {
            let wire = serde_json::to_value(kind).unwrap();
            assert_eq!(wire.as_str(), Some(kind.as_str()));
        }
    }
}
