use serde::{Deserialize, Serialize};

use crate::value::{PatchNode, Record};

/// Ordered primary-key field names of a table.
///
/// An empty projection identifies nothing: no two records match under it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyProjection {
    fields: Vec<String>,
}

impl KeyProjection {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// A projection that disables deduplication.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Values of the key fields in projection order, or `None` if any is missing.
    pub fn values_of<'a>(&self, record: &'a Record) -> Option<Vec<&'a PatchNode>> {
        if self.is_empty() {
            return None;
        }
        self.fields.iter().map(|field| record.get(field)).collect()
    }

    /// Whether both records carry the same values for every key field.
    ///
    /// Records missing a key field never match anything.
    pub fn matches(&self, left: &Record, right: &Record) -> bool {
        match (self.values_of(left), self.values_of(right)) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        }
    }

    /// The key of `record`: just its key fields, in projection order.
    pub fn project(&self, record: &Record) -> Option<Record> {
        let values = self.values_of(record)?;
        Some(
            self.fields
                .iter()
                .zip(values)
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect(),
        )
    }

    /// The first key field `record` lacks.
    pub fn missing_field(&self, record: &Record) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| !record.contains_key(field))
            .map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for KeyProjection {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}
