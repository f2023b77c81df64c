//! Write buffering: per-table queues of puts and deletes, deduplicated by
//! primary key and flushed in batches until the store has applied them all.
//!
//! ## Example
//!
//! ```ignore
//! use dynabatch::{record, WriteBuffer, WriteBufferConfig};
//!
//! let config = WriteBufferConfig::new().with_primary_key(["id"]);
//! let mut buffer = WriteBuffer::with_config(store, config)?;
//!
//! buffer.scoped(|batch| {
//!     batch.put("users", record! { "id" => 1, "name" => "Ada" })?;
//!     batch.delete("users", record! { "id" => 2 })?;
//!     Ok::<_, FlushError<_>>(())
//! })?;
//! ```

mod config;
mod request;
mod scope;
mod write_buffer;

pub use config::{ConfigError, RetryPolicy, WriteBufferConfig, DEFAULT_FLUSH_THRESHOLD};
pub use request::{BufferState, TableBuffer, WriteRequest};
pub use scope::BatchScope;
pub use write_buffer::{FlushError, WriteBuffer};
