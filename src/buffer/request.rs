use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::key::KeyProjection;
use crate::value::Record;

/// A single buffered write.
///
/// Serializes in batch-write request shape:
/// `{"PutRequest": {"Item": {..}}}` / `{"DeleteRequest": {"Key": {..}}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteRequest {
    #[serde(rename = "PutRequest")]
    Put {
        #[serde(rename = "Item")]
        item: Record,
    },
    #[serde(rename = "DeleteRequest")]
    Delete {
        #[serde(rename = "Key")]
        key: Record,
    },
}

impl WriteRequest {
    pub fn put(item: Record) -> Self {
        WriteRequest::Put { item }
    }

    pub fn delete(key: Record) -> Self {
        WriteRequest::Delete { key }
    }

    /// The record whose key fields identify the target item.
    pub fn target(&self) -> &Record {
        match self {
            WriteRequest::Put { item } => item,
            WriteRequest::Delete { key } => key,
        }
    }

    pub fn is_put(&self) -> bool {
        matches!(self, WriteRequest::Put { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, WriteRequest::Delete { .. })
    }
}

/// Pending requests for one table, in enqueue order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableBuffer {
    requests: Vec<WriteRequest>,
}

impl TableBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> &[WriteRequest] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn push(&mut self, request: WriteRequest) {
        self.requests.push(request);
    }

    /// Drop every request targeting the same key as `target`. Returns how many
    /// were dropped.
    pub fn supersede(&mut self, key: &KeyProjection, target: &Record) -> usize {
        if key.is_empty() {
            return 0;
        }
        let before = self.requests.len();
        self.requests
            .retain(|request| !key.matches(request.target(), target));
        before - self.requests.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WriteRequest> {
        self.requests.iter()
    }

    /// Move the oldest `count` requests out, keeping the rest in order.
    fn split_front(&mut self, count: usize) -> TableBuffer {
        let count = count.min(self.requests.len());
        self.requests.drain(..count).collect()
    }

    fn append(&mut self, mut other: TableBuffer) {
        self.requests.append(&mut other.requests);
    }
}

impl FromIterator<WriteRequest> for TableBuffer {
    fn from_iter<I: IntoIterator<Item = WriteRequest>>(iter: I) -> Self {
        Self {
            requests: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a TableBuffer {
    type Item = &'a WriteRequest;
    type IntoIter = std::slice::Iter<'a, WriteRequest>;

    fn into_iter(self) -> Self::IntoIter {
        self.requests.iter()
    }
}

/// Pending requests keyed by table name.
///
/// This is both what a buffer holds and what a batch write sends and returns:
/// the transport answers a batch with the `BufferState` it did not apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BufferState {
    tables: BTreeMap<String, TableBuffer>,
}

impl BufferState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total pending requests across all tables.
    pub fn len(&self) -> usize {
        self.tables.values().map(TableBuffer::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.values().all(TableBuffer::is_empty)
    }

    pub fn table(&self, name: &str) -> Option<&TableBuffer> {
        self.tables.get(name)
    }

    pub fn table_mut(&mut self, name: &str) -> &mut TableBuffer {
        self.tables.entry(name.to_string()).or_default()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TableBuffer)> {
        self.tables
            .iter()
            .map(|(name, buffer)| (name.as_str(), buffer))
    }

    pub fn push(&mut self, table: &str, request: WriteRequest) {
        self.table_mut(table).push(request);
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, table: &str, request: WriteRequest) -> Self {
        self.push(table, request);
        self
    }

    /// Move at most `limit` requests out, oldest first within each table and
    /// tables in name order. Whatever does not fit stays behind.
    pub fn take_front(&mut self, limit: usize) -> BufferState {
        let mut taken = BufferState::new();
        let mut budget = limit;
        for (name, buffer) in self.tables.iter_mut() {
            if budget == 0 {
                break;
            }
            let front = buffer.split_front(budget);
            budget -= front.len();
            if !front.is_empty() {
                taken.tables.insert(name.clone(), front);
            }
        }
        self.prune();
        taken
    }

    /// Queue every request of `later` behind the ones already held.
    pub fn append(&mut self, later: BufferState) {
        for (name, buffer) in later.tables {
            self.table_mut(&name).append(buffer);
        }
        self.prune();
    }

    /// Remove tables that no longer hold requests.
    pub fn prune(&mut self) {
        self.tables.retain(|_, buffer| !buffer.is_empty());
    }
}

impl FromIterator<(String, TableBuffer)> for BufferState {
    fn from_iter<I: IntoIterator<Item = (String, TableBuffer)>>(iter: I) -> Self {
        let mut state = Self {
            tables: iter.into_iter().collect(),
        };
        state.prune();
        state
    }
}
