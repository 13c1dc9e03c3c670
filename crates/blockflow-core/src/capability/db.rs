use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::script::{Chain, ComparisonOperator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DbMode {
    #[default]
    Normal,
    Transaction,
}

/// `where` clause entry. Uses the same operator vocabulary as the `if` block; the
/// adapter applies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbCondition {
    pub attribute: String,
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub chain: Chain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbSort {
    pub attribute: String,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DbError {
    #[error("table not found: {0}")]
    TableNotFound(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("transaction error: {0}")]
    Transaction(String),
    #[error("database error: {0}")]
    Other(String),
}

/// Database capability consumed by the `db.*` and `transaction` blocks.
#[async_trait]
pub trait DbAdapter: Send + Sync {
    async fn get_all(
        &self,
        table: &str,
        conditions: &[DbCondition],
        limit: Option<u64>,
        offset: Option<u64>,
        sort: Option<&DbSort>,
    ) -> Result<Vec<Value>, DbError>;

    async fn get_single(
        &self,
        table: &str,
        conditions: &[DbCondition],
    ) -> Result<Option<Value>, DbError>;

    async fn insert(&self, table: &str, data: &Map<String, Value>) -> Result<Value, DbError>;

    async fn insert_bulk(
        &self,
        table: &str,
        rows: &[Map<String, Value>],
    ) -> Result<Vec<Value>, DbError>;

    /// Returns the number of updated rows.
    async fn update(
        &self,
        table: &str,
        conditions: &[DbCondition],
        data: &Map<String, Value>,
    ) -> Result<u64, DbError>;

    /// Returns the number of deleted rows.
    async fn delete(&self, table: &str, conditions: &[DbCondition]) -> Result<u64, DbError>;

    async fn raw(&self, query: &str) -> Result<Value, DbError>;

    async fn set_mode(&self, mode: DbMode) -> Result<(), DbError>;

    async fn commit_transaction(&self) -> Result<(), DbError>;

    async fn rollback_transaction(&self) -> Result<(), DbError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    /// Adapter double: records each call as JSON and answers with canned rows.
    #[derive(Default)]
    pub(crate) struct RecordingDb {
        calls: Mutex<Vec<Value>>,
        rows: Vec<Value>,
        fail_commit: bool,
    }

    impl RecordingDb {
        pub(crate) fn with_rows(rows: Vec<Value>) -> Self {
            Self {
                rows,
                ..Self::default()
            }
        }

        pub(crate) fn failing_commit() -> Self {
            Self {
                fail_commit: true,
                ..Self::default()
            }
        }

        pub(crate) fn calls(&self) -> Vec<Value> {
            self.calls.lock().unwrap().clone()
        }

        /// Operation names in call order, e.g. `set_mode:TRANSACTION`.
        pub(crate) fn ops(&self) -> Vec<String> {
            self.calls()
                .iter()
                .map(|call| match call.get("mode").and_then(Value::as_str) {
                    Some(mode) => format!("{}:{mode}", call["op"].as_str().unwrap_or("")),
                    None => call["op"].as_str().unwrap_or("").to_string(),
                })
                .collect()
        }

        fn record(&self, call: Value) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl DbAdapter for RecordingDb {
        async fn get_all(
            &self,
            table: &str,
            conditions: &[DbCondition],
            limit: Option<u64>,
            offset: Option<u64>,
            sort: Option<&DbSort>,
        ) -> Result<Vec<Value>, DbError> {
            self.record(json!({
                "op": "get_all",
                "table": table,
                "conditions": conditions,
                "limit": limit,
                "offset": offset,
                "sort": sort,
            }));
            Ok(self.rows.clone())
        }

        async fn get_single(
            &self,
            table: &str,
            conditions: &[DbCondition],
        ) -> Result<Option<Value>, DbError> {
            self.record(json!({"op": "get_single", "table": table, "conditions": conditions}));
            Ok(self.rows.first().cloned())
        }

        async fn insert(&self, table: &str, data: &Map<String, Value>) -> Result<Value, DbError> {
            self.record(json!({"op": "insert", "table": table, "data": data}));
            Ok(Value::Object(data.clone()))
        }

        async fn insert_bulk(
            &self,
            table: &str,
            rows: &[Map<String, Value>],
        ) -> Result<Vec<Value>, DbError> {
            self.record(json!({"op": "insert_bulk", "table": table, "data": rows}));
            Ok(rows.iter().cloned().map(Value::Object).collect())
        }

        async fn update(
            &self,
            table: &str,
            conditions: &[DbCondition],
            data: &Map<String, Value>,
        ) -> Result<u64, DbError> {
            self.record(json!({
                "op": "update",
                "table": table,
                "conditions": conditions,
                "data": data,
            }));
            Ok(1)
        }

        async fn delete(&self, table: &str, conditions: &[DbCondition]) -> Result<u64, DbError> {
            self.record(json!({"op": "delete", "table": table, "conditions": conditions}));
            Ok(1)
        }

        async fn raw(&self, query: &str) -> Result<Value, DbError> {
            self.record(json!({"op": "raw", "query": query}));
            if query.contains("explode") {
                return Err(DbError::InvalidQuery(query.to_string()));
            }
            Ok(Value::Array(self.rows.clone()))
        }

        async fn set_mode(&self, mode: DbMode) -> Result<(), DbError> {
            self.record(json!({"op": "set_mode", "mode": mode}));
            Ok(())
        }

        async fn commit_transaction(&self) -> Result<(), DbError> {
            self.record(json!({"op": "commit"}));
            if self.fail_commit {
                return Err(DbError::Transaction("commit refused".into()));
            }
            Ok(())
        }

        async fn rollback_transaction(&self) -> Result<(), DbError> {
            self.record(json!({"op": "rollback"}));
            Ok(())
        }
    }
}
