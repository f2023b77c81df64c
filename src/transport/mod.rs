//! The store collaborator, seen through the two calls the core makes into it.
//!
//! Connectivity, authentication, throttling and timeouts all live behind these
//! traits. Their errors reach callers untouched.

mod in_memory;

pub use in_memory::{InMemoryStore, StoreError};

use crate::buffer::BufferState;
use crate::patch::UpdateOperation;
use crate::value::Record;

/// Applies a batch of puts and deletes across tables.
pub trait BatchWriter {
    type Error: std::error::Error;

    /// Submit `batch` in one round trip and return the requests the store did
    /// not apply. An empty state means everything was applied.
    fn batch_write(&mut self, batch: &BufferState) -> Result<BufferState, Self::Error>;
}

/// Applies a compiled partial update to a single item.
pub trait ItemUpdater {
    type Error: std::error::Error;

    fn update_item(
        &mut self,
        table: &str,
        key: &Record,
        update: &UpdateOperation,
    ) -> Result<(), Self::Error>;
}

impl<T: BatchWriter + ?Sized> BatchWriter for &mut T {
    type Error = T::Error;

    fn batch_write(&mut self, batch: &BufferState) -> Result<BufferState, Self::Error> {
        (**self).batch_write(batch)
    }
}

impl<T: ItemUpdater + ?Sized> ItemUpdater for &mut T {
    type Error = T::Error;

    fn update_item(
        &mut self,
        table: &str,
        key: &Record,
        update: &UpdateOperation,
    ) -> Result<(), Self::Error> {
        (**self).update_item(table, key, update)
    }
}
