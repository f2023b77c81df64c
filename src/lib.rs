//! Batched write buffering and partial-update compilation for key-value table stores.
//!
//! - [`WriteBuffer`] queues puts and deletes per table, keeps at most one pending
//!   write per primary key, flushes in batches, and resubmits whatever the store
//!   reports as unprocessed until everything is applied.
//! - [`compile_patch`] turns a nested partial update into a `SET` expression with
//!   placeholder tables, and applies the same update to a local mirror.
//!
//! The store itself is reached through [`BatchWriter`] and [`ItemUpdater`];
//! [`InMemoryStore`] implements both.

mod buffer;
mod key;
mod patch;
mod transport;
mod value;

pub use buffer::{
    BatchScope, BufferState, ConfigError, FlushError, RetryPolicy, TableBuffer, WriteBuffer,
    WriteBufferConfig, WriteRequest, DEFAULT_FLUSH_THRESHOLD,
};
pub use key::KeyProjection;
pub use patch::{
    compile_patch, compile_update, deep_merge, flatten, parse_patch, Assignment, ItemError,
    MirroredItem, UpdateOperation,
};
pub use transport::{BatchWriter, InMemoryStore, ItemUpdater, StoreError};
pub use value::{PatchError, PatchNode, Record, Scalar};

/// Build a [`Record`] from `field => value` pairs, in order.
///
/// Values are anything convertible into a [`PatchNode`]: strings, numbers,
/// booleans, [`Scalar`]s, or nested records.
///
/// ```ignore
/// let user = record! {
///     "id" => 1,
///     "phone" => record! { "work" => "555-0100" },
/// };
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::Record::new()
    };
    ($($field:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $(
            record.insert($field, $value);
        )+
        record
    }};
}
