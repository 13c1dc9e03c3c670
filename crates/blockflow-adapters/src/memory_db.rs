use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use blockflow_core::capability::{
    DbAdapter, DbCondition, DbError, DbMode, DbSort, SortDirection,
};
use blockflow_core::script::{compare, loose_cmp, resolve_chain};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

type Row = Map<String, Value>;
type Tables = BTreeMap<String, Vec<Row>>;

#[derive(Default)]
struct State {
    tables: Tables,
    mode: DbMode,
    /// Tables as they were when transaction mode was entered.
    snapshot: Option<Tables>,
    next_id: u64,
}

/// In-memory table store.
///
/// Tables are created on first insert. Rows without an `id` get a sequential one.
/// Transaction mode snapshots every table; rollback restores the snapshot.
#[derive(Default)]
pub struct MemoryDb {
    state: Mutex<State>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from `{"table": [{...}, ...], ...}`.
    pub fn from_seed(seed: &Value) -> Result<Self, DbError> {
        let Value::Object(tables) = seed else {
            return Err(DbError::InvalidQuery("seed must be an object of tables".into()));
        };
        let mut state = State::default();
        for (name, rows) in tables {
            let Value::Array(rows) = rows else {
                return Err(DbError::InvalidQuery(format!("seed table {name} must be an array")));
            };
            let mut table = Vec::with_capacity(rows.len());
            for row in rows {
                let Value::Object(row) = row else {
                    return Err(DbError::InvalidQuery(format!("seed rows of {name} must be objects")));
                };
                table.push(state.assign_id(row.clone()));
            }
            state.tables.insert(name.clone(), table);
        }
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Current rows of `table`, empty when it does not exist.
    pub async fn rows(&self, table: &str) -> Vec<Value> {
        let state = self.state.lock().await;
        state
            .tables
            .get(table)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    pub async fn mode(&self) -> DbMode {
        self.state.lock().await.mode
    }
}

impl State {
    fn assign_id(&mut self, mut row: Row) -> Row {
        match row.get("id").and_then(Value::as_u64) {
            Some(id) => self.next_id = self.next_id.max(id),
            None if !row.contains_key("id") => {
                self.next_id += 1;
                row.insert("id".into(), Value::from(self.next_id));
            }
            None => {}
        }
        row
    }

    fn table(&self, name: &str) -> Result<&Vec<Row>, DbError> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Vec<Row>, DbError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }
}

fn matches(row: &Row, conditions: &[DbCondition]) -> bool {
    resolve_chain(conditions.iter().map(|condition| {
        let field = row.get(&condition.attribute).unwrap_or(&Value::Null);
        (compare(condition.operator, field, &condition.value), condition.chain)
    }))
}

fn sort_rows(rows: &mut [Row], sort: &DbSort) {
    rows.sort_by(|a, b| {
        let lhs = a.get(&sort.attribute).unwrap_or(&Value::Null);
        let rhs = b.get(&sort.attribute).unwrap_or(&Value::Null);
        let ordering = loose_cmp(lhs, rhs).unwrap_or(Ordering::Equal);
        match sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[async_trait]
impl DbAdapter for MemoryDb {
    async fn get_all(
        &self,
        table: &str,
        conditions: &[DbCondition],
        limit: Option<u64>,
        offset: Option<u64>,
        sort: Option<&DbSort>,
    ) -> Result<Vec<Value>, DbError> {
        let state = self.state.lock().await;
        let mut rows: Vec<Row> = state
            .table(table)?
            .iter()
            .filter(|row| matches(row, conditions))
            .cloned()
            .collect();
        if let Some(sort) = sort {
            sort_rows(&mut rows, sort);
        }
        let skip = offset.map(to_usize).unwrap_or(0);
        let take = limit.map(to_usize).unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .skip(skip)
            .take(take)
            .map(Value::Object)
            .collect())
    }

    async fn get_single(
        &self,
        table: &str,
        conditions: &[DbCondition],
    ) -> Result<Option<Value>, DbError> {
        let state = self.state.lock().await;
        Ok(state
            .table(table)?
            .iter()
            .find(|row| matches(row, conditions))
            .cloned()
            .map(Value::Object))
    }

    async fn insert(&self, table: &str, data: &Map<String, Value>) -> Result<Value, DbError> {
        let mut state = self.state.lock().await;
        let row = state.assign_id(data.clone());
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        debug!(event = "db.row_inserted", domain = "db", table = table);
        Ok(Value::Object(row))
    }

    async fn insert_bulk(
        &self,
        table: &str,
        rows: &[Map<String, Value>],
    ) -> Result<Vec<Value>, DbError> {
        let mut state = self.state.lock().await;
        let rows: Vec<Row> = rows.iter().map(|row| state.assign_id(row.clone())).collect();
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        debug!(event = "db.rows_inserted", domain = "db", table = table, count = rows.len());
        Ok(rows.into_iter().map(Value::Object).collect())
    }

    async fn update(
        &self,
        table: &str,
        conditions: &[DbCondition],
        data: &Map<String, Value>,
    ) -> Result<u64, DbError> {
        let mut state = self.state.lock().await;
        let mut updated = 0;
        for row in state.table_mut(table)?.iter_mut() {
            if matches(row, conditions) {
                row.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, conditions: &[DbCondition]) -> Result<u64, DbError> {
        let mut state = self.state.lock().await;
        let rows = state.table_mut(table)?;
        let before = rows.len();
        rows.retain(|row| !matches(row, conditions));
        Ok((before - rows.len()) as u64)
    }

    async fn raw(&self, query: &str) -> Result<Value, DbError> {
        Err(DbError::InvalidQuery(format!(
            "raw queries are not supported by the in-memory store: {query}"
        )))
    }

    async fn set_mode(&self, mode: DbMode) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        match mode {
            DbMode::Transaction => {
                if state.mode == DbMode::Transaction {
                    return Err(DbError::Transaction("transaction already open".into()));
                }
                state.snapshot = Some(state.tables.clone());
            }
            DbMode::Normal => state.snapshot = None,
        }
        state.mode = mode;
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        if state.snapshot.take().is_none() {
            return Err(DbError::Transaction("no open transaction".into()));
        }
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        let snapshot = state
            .snapshot
            .take()
            .ok_or_else(|| DbError::Transaction("no open transaction".into()))?;
        state.tables = snapshot;
        debug!(event = "db.rolled_back", domain = "db");
        Ok(())
    }
}
