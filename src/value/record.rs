use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{kind_of, PatchError, PatchNode};

/// An insertion-ordered mapping from field name to [`PatchNode`].
///
/// Field order is preserved so that walking a patch is deterministic, but two
/// records compare equal whenever they hold the same fields with equal values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Record {
    fields: Vec<(String, PatchNode)>,
}

impl Record {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Parse a JSON mapping into a record.
    pub fn from_json(value: Value) -> Result<Self, PatchError> {
        match value {
            Value::Object(_) => match PatchNode::from_json(value)? {
                PatchNode::Nested(record) => Ok(record),
                PatchNode::Scalar(_) => Err(PatchError::NotAMapping { found: "a scalar" }),
            },
            other => Err(PatchError::NotAMapping {
                found: kind_of(&other),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&PatchNode> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, node)| node)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut PatchNode> {
        self.fields
            .iter_mut()
            .find(|(name, _)| name == field)
            .map(|(_, node)| node)
    }

    /// Follow `path` through nested records.
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&PatchNode> {
        let (last, parents) = path.split_last()?;
        let mut current = self;
        for segment in parents {
            current = current.get(segment.as_ref())?.as_record()?;
        }
        current.get(last.as_ref())
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Insert or overwrite a field. An overwritten field keeps its position.
    pub fn insert(
        &mut self,
        field: impl Into<String>,
        value: impl Into<PatchNode>,
    ) -> Option<PatchNode> {
        let field = field.into();
        let value = value.into();
        match self.get_mut(&field) {
            Some(existing) => Some(std::mem::replace(existing, value)),
            None => {
                self.fields.push((field, value));
                None
            }
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, field: impl Into<String>, value: impl Into<PatchNode>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn remove(&mut self, field: &str) -> Option<PatchNode> {
        let index = self.fields.iter().position(|(name, _)| name == field)?;
        Some(self.fields.remove(index).1)
    }

    /// The nested record at `field`, created empty when absent. A scalar already
    /// stored at `field` is replaced.
    pub fn nested_mut(&mut self, field: &str) -> &mut Record {
        let index = match self.fields.iter().position(|(name, _)| name == field) {
            Some(index) => index,
            None => {
                self.fields
                    .push((field.to_string(), PatchNode::Nested(Record::new())));
                self.fields.len() - 1
            }
        };
        self.fields[index].1.make_nested()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PatchNode)> {
        self.fields.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(field, node)| other.get(field) == Some(node))
    }
}

impl<K: Into<String>, V: Into<PatchNode>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (field, value) in iter {
            record.insert(field, value);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, PatchNode);
    type IntoIter = std::vec::IntoIter<(String, PatchNode)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl TryFrom<Value> for Record {
    type Error = PatchError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Record::from_json(value)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        let mut map = Map::with_capacity(record.len());
        for (field, node) in record {
            map.insert(field, node.into());
        }
        Value::Object(map)
    }
}
