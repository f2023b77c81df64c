use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use super::flatten::Assignment;
use crate::value::Scalar;

/// A compiled partial update: a `SET` expression plus its placeholder tables.
///
/// Serializes with the field names a store's update call expects
/// (`UpdateExpression`, `ExpressionAttributeNames`, `ExpressionAttributeValues`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateOperation {
    update_expression: String,
    expression_attribute_names: BTreeMap<String, String>,
    expression_attribute_values: BTreeMap<String, Scalar>,
}

impl UpdateOperation {
    /// The update expression, e.g. `SET #phone.#work = :phone_work`.
    pub fn expression(&self) -> &str {
        &self.update_expression
    }

    /// Name placeholder (`#field`) to field name.
    pub fn names(&self) -> &BTreeMap<String, String> {
        &self.expression_attribute_names
    }

    /// Value placeholder (`:path`) to value.
    pub fn values(&self) -> &BTreeMap<String, Scalar> {
        &self.expression_attribute_values
    }

    /// Whether the operation assigns nothing. Empty operations are never sent.
    pub fn is_empty(&self) -> bool {
        self.update_expression.is_empty()
    }
}

/// Compile assignments into a `SET` update.
///
/// Each path segment is referenced through a `#name` placeholder, shared by
/// every path using that field; each value through a `:path_joined_by_underscores`
/// placeholder. Characters a placeholder cannot hold become `_`, and a token
/// already claimed by a different field or path gets a numeric suffix. The output
/// depends only on the input, in order, so compiling twice gives identical results.
/// A repeated path keeps its first clause and its last value.
pub fn compile_update(assignments: &[Assignment]) -> UpdateOperation {
    let mut names = Placeholders::new('#');
    let mut values = Placeholders::new(':');
    let mut clauses = Vec::with_capacity(assignments.len());
    let mut operation = UpdateOperation::default();

    for assignment in assignments {
        let target = assignment
            .path
            .iter()
            .map(|segment| names.claim(segment, segment).0)
            .collect::<Vec<_>>()
            .join(".");

        let (value_token, fresh) = values.claim(&assignment.path, &assignment.path.join("_"));
        if fresh {
            clauses.push(format!("{} = {}", target, value_token));
        }
        operation
            .expression_attribute_values
            .insert(value_token, assignment.value.clone());
    }

    if !clauses.is_empty() {
        operation.update_expression = format!("SET {}", clauses.join(", "));
    }
    operation.expression_attribute_names = names.into_table();
    operation
}

/// Hands out placeholder tokens, one per owner, never the same token twice.
/// Owners are field names for `#` tokens and whole paths for `:` tokens.
struct Placeholders<K> {
    prefix: char,
    by_owner: HashMap<K, String>,
    taken: HashSet<String>,
    table: BTreeMap<String, K>,
}

impl<K: Clone + Eq + Hash> Placeholders<K> {
    fn new(prefix: char) -> Self {
        Self {
            prefix,
            by_owner: HashMap::new(),
            taken: HashSet::new(),
            table: BTreeMap::new(),
        }
    }

    /// The token for `owner`, derived from `base` on first use. The flag is
    /// true when the token was created by this call.
    fn claim(&mut self, owner: &K, base: &str) -> (String, bool) {
        if let Some(token) = self.by_owner.get(owner) {
            return (token.clone(), false);
        }

        let stem = format!("{}{}", self.prefix, sanitize(base));
        let mut token = stem.clone();
        let mut suffix = 2u32;
        while self.taken.contains(&token) {
            token = format!("{}_{}", stem, suffix);
            suffix += 1;
        }

        self.taken.insert(token.clone());
        self.by_owner.insert(owner.clone(), token.clone());
        self.table.insert(token.clone(), owner.clone());
        (token, true)
    }

    /// Token to owner.
    fn into_table(self) -> BTreeMap<String, K> {
        self.table
    }
}

fn sanitize(base: &str) -> String {
    if base.is_empty() {
        return "_".to_string();
    }
    base.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
