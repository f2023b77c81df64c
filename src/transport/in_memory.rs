//! InMemoryStore - table store backed by a BTreeMap, for tests and development.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use thiserror::Error;

use super::{BatchWriter, ItemUpdater};
use crate::buffer::{BufferState, WriteRequest};
use crate::key::KeyProjection;
use crate::patch::UpdateOperation;
use crate::value::{Record, Scalar};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("table `{0}` does not exist")]
    UnknownTable(String),
    #[error("item for table `{table}` is missing key field `{field}`")]
    MissingKeyField { table: String, field: String },
    #[error("malformed update expression `{0}`")]
    MalformedExpression(String),
    #[error("unresolved placeholder `{0}`")]
    UnresolvedPlaceholder(String),
    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("injected failure: {0}")]
    Injected(String),
}

struct StoredTable {
    key: KeyProjection,
    /// Keyed by the JSON text of the item's projected key.
    items: BTreeMap<String, Record>,
}

impl StoredTable {
    fn storage_key(&self, table: &str, record: &Record) -> Result<String, StoreError> {
        let key = self.key.project(record).ok_or_else(|| StoreError::MissingKeyField {
            table: table.to_string(),
            field: self
                .key
                .missing_field(record)
                .unwrap_or_default()
                .to_string(),
        })?;
        Ok(Value::from(key).to_string())
    }

    fn apply(&mut self, table: &str, request: &WriteRequest) -> Result<(), StoreError> {
        let key = self.storage_key(table, request.target())?;
        match request {
            WriteRequest::Put { item } => {
                self.items.insert(key, item.clone());
            }
            WriteRequest::Delete { .. } => {
                self.items.remove(&key);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct StoreState {
    tables: BTreeMap<String, StoredTable>,
    apply_limit: Option<usize>,
    pending_failure: Option<String>,
    batches: Vec<BufferState>,
    update_calls: usize,
}

/// In-memory store with per-table key schemas.
///
/// Batch writes are validated as a whole before anything is applied. A store
/// can be throttled with [`set_apply_limit`](Self::set_apply_limit) to apply at
/// most N requests per batch and report the rest as unprocessed, and can be told
/// to fail its next call. Clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table keyed by `key`. Items must carry every key field.
    pub fn with_table(self, name: impl Into<String>, key: KeyProjection) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.tables.insert(
                name.into(),
                StoredTable {
                    key,
                    items: BTreeMap::new(),
                },
            );
        }
        self
    }

    /// Apply at most `limit` requests per batch write; `None` applies everything.
    pub fn set_apply_limit(&self, limit: Option<usize>) -> Result<(), StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("configure"))?;
        state.apply_limit = limit;
        Ok(())
    }

    /// Make the next batch write or update fail with `message`.
    pub fn fail_next_call(&self, message: impl Into<String>) {
        if let Ok(mut state) = self.state.write() {
            state.pending_failure = Some(message.into());
        }
    }

    pub fn get_item(&self, table: &str, key: &Record) -> Result<Option<Record>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        let stored = state
            .tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        let key = stored.storage_key(table, key)?;
        Ok(stored.items.get(&key).cloned())
    }

    /// Write `item` directly, bypassing batching.
    pub fn insert_item(&self, table: &str, item: Record) -> Result<(), StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;
        let stored = state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        stored.apply(table, &WriteRequest::put(item))
    }

    pub fn item_count(&self, table: &str) -> usize {
        self.state
            .read()
            .ok()
            .and_then(|state| state.tables.get(table).map(|stored| stored.items.len()))
            .unwrap_or(0)
    }

    /// Every batch received, in order.
    pub fn batches(&self) -> Vec<BufferState> {
        self.state
            .read()
            .map(|state| state.batches.clone())
            .unwrap_or_default()
    }

    pub fn batch_calls(&self) -> usize {
        self.state
            .read()
            .map(|state| state.batches.len())
            .unwrap_or(0)
    }

    pub fn update_calls(&self) -> usize {
        self.state
            .read()
            .map(|state| state.update_calls)
            .unwrap_or(0)
    }
}

impl BatchWriter for InMemoryStore {
    type Error = StoreError;

    fn batch_write(&mut self, batch: &BufferState) -> Result<BufferState, StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("batch write"))?;
        if let Some(message) = state.pending_failure.take() {
            return Err(StoreError::Injected(message));
        }
        state.batches.push(batch.clone());

        for (table, requests) in batch.iter() {
            let stored = state
                .tables
                .get(table)
                .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
            for request in requests {
                stored.storage_key(table, request.target())?;
            }
        }

        let mut budget = state.apply_limit.unwrap_or(usize::MAX);
        let mut unprocessed = BufferState::new();
        for (table, requests) in batch.iter() {
            let stored = state
                .tables
                .get_mut(table)
                .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
            for request in requests {
                if budget == 0 {
                    unprocessed.push(table, request.clone());
                    continue;
                }
                budget -= 1;
                stored.apply(table, request)?;
            }
        }

        Ok(unprocessed)
    }
}

impl ItemUpdater for InMemoryStore {
    type Error = StoreError;

    /// Interpret the `SET` expression and assign each path, creating the item
    /// and any missing intermediate records.
    fn update_item(
        &mut self,
        table: &str,
        key: &Record,
        update: &UpdateOperation,
    ) -> Result<(), StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("update"))?;
        state.update_calls += 1;
        if let Some(message) = state.pending_failure.take() {
            return Err(StoreError::Injected(message));
        }

        let assignments = parse_update(update)?;
        let stored = state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        let storage_key = stored.storage_key(table, key)?;
        let item = stored
            .items
            .entry(storage_key)
            .or_insert_with(|| key.clone());

        for (path, value) in assignments {
            assign(item, &path, value);
        }
        Ok(())
    }
}

fn parse_update(update: &UpdateOperation) -> Result<Vec<(Vec<String>, Scalar)>, StoreError> {
    let expression = update.expression();
    let body = expression
        .strip_prefix("SET ")
        .ok_or_else(|| StoreError::MalformedExpression(expression.to_string()))?;

    body.split(", ")
        .map(|clause| -> Result<(Vec<String>, Scalar), StoreError> {
            let (target, placeholder) = clause
                .split_once(" = ")
                .ok_or_else(|| StoreError::MalformedExpression(clause.to_string()))?;
            let path = target
                .split('.')
                .map(|token| {
                    update
                        .names()
                        .get(token)
                        .cloned()
                        .ok_or_else(|| StoreError::UnresolvedPlaceholder(token.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let value = update
                .values()
                .get(placeholder)
                .cloned()
                .ok_or_else(|| StoreError::UnresolvedPlaceholder(placeholder.to_string()))?;
            Ok((path, value))
        })
        .collect()
}

fn assign(item: &mut Record, path: &[String], value: Scalar) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut target = item;
    for segment in parents {
        target = target.nested_mut(segment);
    }
    target.insert(last.as_str(), value);
}
