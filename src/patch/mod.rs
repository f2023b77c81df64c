//! Partial updates: compile a nested patch into a path-addressed `SET`
//! operation, and apply the same patch to a local mirror of the record.
//!
//! ## Example
//!
//! ```ignore
//! use dynabatch::{compile_patch, record};
//!
//! let mirror = record! { "phone" => record! { "home" => "H", "work" => "W" } };
//! let patch = record! { "phone" => record! { "work" => "X" } };
//!
//! let (update, mirror) = compile_patch(Some(mirror), &patch);
//! assert_eq!(update.expression(), "SET #phone.#work = :phone_work");
//! ```

mod compile;
mod flatten;
mod item;
mod merge;

pub use compile::{compile_update, UpdateOperation};
pub use flatten::{flatten, Assignment};
pub use item::{ItemError, MirroredItem};
pub use merge::deep_merge;

use serde_json::Value;

use crate::value::{PatchError, Record};

/// Read a JSON document as a patch. Fails on sequences and on a non-mapping root.
pub fn parse_patch(value: Value) -> Result<Record, PatchError> {
    Record::from_json(value)
}

/// Compile `patch` into an update operation and apply it to `mirror`.
///
/// A missing mirror is treated as an empty record.
pub fn compile_patch(mirror: Option<Record>, patch: &Record) -> (UpdateOperation, Record) {
    let operation = compile_update(&flatten(patch));
    let mut mirror = mirror.unwrap_or_default();
    deep_merge(&mut mirror, patch);
    (operation, mirror)
}
