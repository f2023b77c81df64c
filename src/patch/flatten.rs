use serde::{Deserialize, Serialize};

use crate::value::{PatchNode, Record, Scalar};

/// One leaf of a patch: the field path from the root and the value to store there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub path: Vec<String>,
    pub value: Scalar,
}

impl Assignment {
    pub fn new<I, S>(path: I, value: impl Into<Scalar>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            value: value.into(),
        }
    }
}

/// Walk `patch` depth-first and emit one assignment per scalar leaf.
///
/// Siblings come out in the patch's own field order. Empty nested mappings
/// contribute nothing.
pub fn flatten(patch: &Record) -> Vec<Assignment> {
    let mut assignments = Vec::new();
    let mut path = Vec::new();
    flatten_into(patch, &mut path, &mut assignments);
    assignments
}

fn flatten_into(fields: &Record, path: &mut Vec<String>, out: &mut Vec<Assignment>) {
    for (field, node) in fields.iter() {
        path.push(field.to_string());
        match node {
            PatchNode::Scalar(value) => out.push(Assignment {
                path: path.clone(),
                value: value.clone(),
            }),
            PatchNode::Nested(children) => flatten_into(children, path, out),
        }
        path.pop();
    }
}
