use thiserror::Error;

use super::{compile_update, deep_merge, flatten, UpdateOperation};
use crate::buffer::{FlushError, WriteBuffer};
use crate::key::KeyProjection;
use crate::transport::{BatchWriter, ItemUpdater};
use crate::value::Record;

/// Errors from writing through a [`MirroredItem`].
#[derive(Debug, Error)]
pub enum ItemError<E> {
    #[error("table `{table}` has no primary key configured")]
    NoPrimaryKey { table: String },
    #[error("no cached value for the item in table `{table}`")]
    Absent { table: String },
    #[error("item in table `{table}` is missing key field `{field}`")]
    MissingKey { table: String, field: String },
    #[error(transparent)]
    Write(E),
}

/// A store item together with the caller's local copy of it.
///
/// Every write keeps the copy in step with what was sent: a patch is merged in
/// once the store accepts the update, a replacement or removal takes effect as
/// soon as it is queued on the write buffer.
#[derive(Debug, Clone)]
pub struct MirroredItem {
    table: String,
    key: KeyProjection,
    mirror: Option<Record>,
}

impl MirroredItem {
    pub fn new(table: impl Into<String>, key: KeyProjection, mirror: Option<Record>) -> Self {
        Self {
            table: table.into(),
            key,
            mirror,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn mirror(&self) -> Option<&Record> {
        self.mirror.as_ref()
    }

    pub fn into_mirror(self) -> Option<Record> {
        self.mirror
    }

    /// The item's key, projected from the mirror.
    pub fn key(&self) -> Option<Record> {
        self.mirror
            .as_ref()
            .and_then(|mirror| self.key.project(mirror))
    }

    fn key_of<E>(&self, record: Option<&Record>) -> Result<Record, ItemError<E>> {
        if self.key.is_empty() {
            return Err(ItemError::NoPrimaryKey {
                table: self.table.clone(),
            });
        }
        let record = record.ok_or_else(|| ItemError::Absent {
            table: self.table.clone(),
        })?;
        self.key.project(record).ok_or_else(|| ItemError::MissingKey {
            table: self.table.clone(),
            field: self
                .key
                .missing_field(record)
                .unwrap_or_default()
                .to_string(),
        })
    }

    /// Send `patch` as a single-item update and merge it into the mirror.
    ///
    /// A patch with no leaves sends nothing. The mirror is untouched when the
    /// update fails.
    pub fn patch<U: ItemUpdater>(
        &mut self,
        updater: &mut U,
        patch: &Record,
    ) -> Result<UpdateOperation, ItemError<U::Error>> {
        let key = self.key_of::<U::Error>(self.mirror.as_ref())?;
        let operation = compile_update(&flatten(patch));
        if operation.is_empty() {
            return Ok(operation);
        }

        updater
            .update_item(&self.table, &key, &operation)
            .map_err(ItemError::Write)?;
        tracing::trace!(table = %self.table, expression = operation.expression(), "patched item");

        deep_merge(self.mirror.get_or_insert_with(Record::new), patch);
        Ok(operation)
    }

    /// Queue `item` as a full replacement and make it the mirror.
    ///
    /// The put stays queued even when a flush it triggers fails, so the mirror
    /// is replaced either way.
    pub fn replace<W: BatchWriter>(
        &mut self,
        buffer: &mut WriteBuffer<W>,
        item: Record,
    ) -> Result<(), ItemError<FlushError<W::Error>>> {
        self.key_of::<FlushError<W::Error>>(Some(&item))?;
        let result = buffer.put(&self.table, item.clone());
        self.mirror = Some(item);
        result.map_err(ItemError::Write)
    }

    /// Queue a delete of this item and clear the mirror.
    pub fn remove<W: BatchWriter>(
        &mut self,
        buffer: &mut WriteBuffer<W>,
    ) -> Result<(), ItemError<FlushError<W::Error>>> {
        let key = self.key_of::<FlushError<W::Error>>(self.mirror.as_ref())?;
        let result = buffer.delete(&self.table, key);
        self.mirror = None;
        result.map_err(ItemError::Write)
    }
}
