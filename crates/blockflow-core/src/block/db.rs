//! `db.*` blocks. One block type per adapter operation; all share [`DbBlockConfig`].
//! `js:` values in conditions, data, limit/offset and the raw query are resolved before
//! the adapter is called. Any failure, including the adapter's, is a fatal output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::{Block, BlockConfig, BlockError, BlockKind, BlockOutput, Link, value_kind_name};
use crate::capability::{DbAdapter, DbCondition, DbSort};
use crate::runtime::RunContext;
use crate::script::{Evaluator, resolve, resolve_deep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbOperation {
    GetAll,
    GetSingle,
    Insert,
    InsertBulk,
    Update,
    Delete,
    Raw,
}

impl DbOperation {
    pub fn kind(self) -> BlockKind {
        match self {
            DbOperation::GetAll => BlockKind::DbGetAll,
            DbOperation::GetSingle => BlockKind::DbGetSingle,
            DbOperation::Insert => BlockKind::DbInsert,
            DbOperation::InsertBulk => BlockKind::DbInsertBulk,
            DbOperation::Update => BlockKind::DbUpdate,
            DbOperation::Delete => BlockKind::DbDelete,
            DbOperation::Raw => BlockKind::DbRaw,
        }
    }

    /// Checks the fields this operation needs.
    pub fn check(self, config: &DbBlockConfig) -> Result<(), String> {
        if self == DbOperation::Raw {
            if config.query.trim().is_empty() {
                return Err("query must not be empty".into());
            }
            return Ok(());
        }
        if config.table.trim().is_empty() {
            return Err("table must not be empty".into());
        }
        if config.use_param {
            return Ok(());
        }
        match (self, &config.data) {
            (DbOperation::Insert | DbOperation::Update, Value::Object(_) | Value::String(_)) => Ok(()),
            (DbOperation::InsertBulk, Value::Array(_) | Value::String(_)) => Ok(()),
            (DbOperation::Insert | DbOperation::Update, other) => Err(format!(
                "data must be an object, got {}",
                value_kind_name(other)
            )),
            (DbOperation::InsertBulk, other) => Err(format!(
                "data must be an array, got {}",
                value_kind_name(other)
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DbBlockConfig {
    pub table: String,
    pub conditions: Vec<DbCondition>,
    pub limit: Option<Value>,
    pub offset: Option<Value>,
    pub sort: Option<DbSort>,
    /// Row (insert/update) or rows (insertBulk).
    pub data: Value,
    /// Take `data` from the block input.
    pub use_param: bool,
    /// Statement for `db.raw`.
    pub query: String,
}

impl BlockConfig for DbBlockConfig {}

fn shape_error(message: String) -> BlockError {
    BlockError::Other(message)
}

fn into_row(value: Value) -> Result<Map<String, Value>, BlockError> {
    match value {
        Value::Object(row) => Ok(row),
        other => Err(shape_error(format!(
            "row must be an object, got {}",
            value_kind_name(&other)
        ))),
    }
}

pub struct DbBlock {
    link: Link,
    operation: DbOperation,
    config: DbBlockConfig,
}

impl DbBlock {
    pub fn new(link: Link, operation: DbOperation, config: DbBlockConfig) -> Self {
        Self {
            link,
            operation,
            config,
        }
    }

    fn conditions(&self, vm: &dyn Evaluator) -> Result<Vec<DbCondition>, BlockError> {
        self.config
            .conditions
            .iter()
            .map(|condition| -> Result<DbCondition, BlockError> {
                Ok(DbCondition {
                    value: resolve_deep(vm, &condition.value)?,
                    ..condition.clone()
                })
            })
            .collect()
    }

    fn count(
        &self,
        vm: &dyn Evaluator,
        name: &str,
        raw: Option<&Value>,
    ) -> Result<Option<u64>, BlockError> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        match resolve(vm, raw)? {
            Value::Null => Ok(None),
            value => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| shape_error(format!("{name} must be a non-negative integer"))),
        }
    }

    fn data(&self, vm: &dyn Evaluator, params: &Value) -> Result<Value, BlockError> {
        let source = if self.config.use_param {
            params
        } else {
            &self.config.data
        };
        Ok(resolve_deep(vm, source)?)
    }

    fn rows(
        &self,
        vm: &dyn Evaluator,
        params: &Value,
    ) -> Result<Vec<Map<String, Value>>, BlockError> {
        match self.data(vm, params)? {
            Value::Array(items) => items.into_iter().map(into_row).collect(),
            other => Err(shape_error(format!(
                "rows must be an array, got {}",
                value_kind_name(&other)
            ))),
        }
    }

    async fn run(
        &self,
        db: &dyn DbAdapter,
        vm: &dyn Evaluator,
        params: &Value,
    ) -> Result<Value, BlockError> {
        let table = self.config.table.as_str();
        let output = match self.operation {
            DbOperation::GetAll => {
                let conditions = self.conditions(vm)?;
                let limit = self.count(vm, "limit", self.config.limit.as_ref())?;
                let offset = self.count(vm, "offset", self.config.offset.as_ref())?;
                let rows = db
                    .get_all(table, &conditions, limit, offset, self.config.sort.as_ref())
                    .await?;
                Value::Array(rows)
            }
            DbOperation::GetSingle => {
                let conditions = self.conditions(vm)?;
                db.get_single(table, &conditions)
                    .await?
                    .unwrap_or(Value::Null)
            }
            DbOperation::Insert => {
                let row = into_row(self.data(vm, params)?)?;
                db.insert(table, &row).await?
            }
            DbOperation::InsertBulk => {
                let rows = self.rows(vm, params)?;
                Value::Array(db.insert_bulk(table, &rows).await?)
            }
            DbOperation::Update => {
                let conditions = self.conditions(vm)?;
                let row = into_row(self.data(vm, params)?)?;
                Value::from(db.update(table, &conditions, &row).await?)
            }
            DbOperation::Delete => {
                let conditions = self.conditions(vm)?;
                Value::from(db.delete(table, &conditions).await?)
            }
            DbOperation::Raw => {
                let query = match resolve(vm, &Value::String(self.config.query.clone()))? {
                    Value::String(query) => query,
                    other => {
                        return Err(shape_error(format!(
                            "query must resolve to a string, got {}",
                            value_kind_name(&other)
                        )));
                    }
                };
                db.raw(&query).await?
            }
        };
        Ok(output)
    }
}

#[async_trait]
impl Block for DbBlock {
    fn id(&self) -> &str {
        &self.link.id
    }

    fn kind(&self) -> BlockKind {
        self.operation.kind()
    }

    async fn execute(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, BlockError> {
        let Some(db) = ctx.db() else {
            return Ok(BlockOutput::failure(format!(
                "{} requires a database adapter",
                self.operation.kind()
            )));
        };
        let vm = ctx.vm_with("params", &params);
        let result = self.run(db.as_ref(), vm.as_ref(), &params).await;
        debug!(
            event = "db.operation",
            domain = "db",
            block_id = %self.link.id,
            block_type = %self.operation.kind(),
            table = %self.config.table,
            ok = result.is_ok()
        );
        Ok(match result {
            Ok(output) => self.link.success(output),
            Err(err) => BlockOutput::failure(err.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::capability::testing::RecordingDb;

    fn block(operation: DbOperation, config: Value) -> DbBlock {
        DbBlock::new(
            Link::new("db", Some("next".into())),
            operation,
            serde_json::from_value(config).unwrap(),
        )
    }

    fn context(db: &Arc<RecordingDb>) -> RunContext {
        RunContext::builder().db(db.clone()).build()
    }

    #[tokio::test]
    async fn get_all_resolves_condition_values() {
        let db = Arc::new(RecordingDb::with_rows(vec![json!({"id": 1})]));
        let ctx = context(&db);
        ctx.vars().set("min", json!(18));
        let out = block(
            DbOperation::GetAll,
            json!({
                "table": "users",
                "conditions": [{"attribute": "age", "operator": "gte", "value": "js:min"}],
                "limit": 10,
                "sort": {"attribute": "age", "direction": "desc"}
            }),
        )
        .execute(&ctx, Value::Null)
        .await
        .unwrap();

        assert_eq!(out.output, Some(json!([{"id": 1}])));
        let call = &db.calls()[0];
        assert_eq!(call["conditions"][0]["value"], json!(18));
        assert_eq!(call["limit"], json!(10));
        assert_eq!(call["sort"]["direction"], json!("desc"));
    }

    #[tokio::test]
    async fn get_single_without_match_is_null() {
        let db = Arc::new(RecordingDb::default());
        let ctx = context(&db);
        let out = block(DbOperation::GetSingle, json!({"table": "users"}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert!(out.successful);
        assert_eq!(out.output, Some(Value::Null));
    }

    #[tokio::test]
    async fn insert_resolves_nested_scripts_and_uses_params() {
        let db = Arc::new(RecordingDb::default());
        let ctx = context(&db);
        ctx.vars().set("who", json!("ada"));
        let out = block(
            DbOperation::Insert,
            json!({"table": "users", "data": {"name": "js:who", "tags": ["js:who"]}}),
        )
        .execute(&ctx, Value::Null)
        .await
        .unwrap();
        assert_eq!(out.output, Some(json!({"name": "ada", "tags": ["ada"]})));

        block(DbOperation::Insert, json!({"table": "users", "useParam": true}))
            .execute(&ctx, json!({"name": "linus"}))
            .await
            .unwrap();
        assert_eq!(db.calls()[1]["data"], json!({"name": "linus"}));
    }

    #[tokio::test]
    async fn insert_bulk_requires_object_rows() {
        let db = Arc::new(RecordingDb::default());
        let ctx = context(&db);
        let out = block(DbOperation::InsertBulk, json!({"table": "t", "data": [{"a": 1}, 2]}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert!(out.is_fatal());
        assert!(db.calls().is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_return_counts() {
        let db = Arc::new(RecordingDb::default());
        let ctx = context(&db);
        let out = block(
            DbOperation::Update,
            json!({"table": "t", "data": {"a": 1}, "conditions": [{"attribute": "id", "operator": "eq", "value": 1}]}),
        )
        .execute(&ctx, Value::Null)
        .await
        .unwrap();
        assert_eq!(out.output, Some(json!(1)));
        let out = block(DbOperation::Delete, json!({"table": "t"}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert_eq!(out.output, Some(json!(1)));
    }

    #[tokio::test]
    async fn adapter_error_is_a_fatal_output() {
        let db = Arc::new(RecordingDb::default());
        let ctx = context(&db);
        let out = block(DbOperation::Raw, json!({"query": "explode now"}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert!(out.is_fatal());
        assert!(out.error.unwrap().contains("invalid query"));
    }

    #[tokio::test]
    async fn missing_adapter_is_a_fatal_output() {
        let ctx = RunContext::builder().build();
        let out = block(DbOperation::GetAll, json!({"table": "users"}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert!(out.is_fatal());
    }

    #[test]
    fn checks_required_fields_per_operation() {
        let config: DbBlockConfig = serde_json::from_value(json!({"table": ""})).unwrap();
        assert!(DbOperation::GetAll.check(&config).is_err());
        assert!(DbOperation::Raw.check(&config).is_err());
        let config: DbBlockConfig =
            serde_json::from_value(json!({"table": "t", "data": [1]})).unwrap();
        assert!(DbOperation::Insert.check(&config).is_err());
        assert!(DbOperation::InsertBulk.check(&config).is_ok());
    }
}
