//! Feature identifiers and identifier batches.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A service-assigned feature identifier.
///
/// Integers sort before strings so mixed sets still have a stable order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectId {
    Int(i64),
    Str(String),
}

impl ObjectId {
    /// Read an identifier out of a JSON value, accepting numbers and strings.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(ObjectId::Int),
            serde_json::Value::String(s) => Some(ObjectId::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectId::Int(id) => write!(f, "{}", id),
            ObjectId::Str(id) => write!(f, "{}", id),
        }
    }
}

impl From<i64> for ObjectId {
    fn from(id: i64) -> Self {
        ObjectId::Int(id)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        ObjectId::Str(id.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        ObjectId::Str(id)
    }
}

/// An ordered group of identifiers sent in a single feature request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierBatch {
    ids: Vec<ObjectId>,
}

impl IdentifierBatch {
    pub fn new(ids: Vec<ObjectId>) -> Self {
        Self { ids }
    }

    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identifiers as a set, for reconciliation against fetched results.
    pub fn id_set(&self) -> BTreeSet<ObjectId> {
        self.ids.iter().cloned().collect()
    }

    /// Comma separated identifiers as expected by the `objectIds` parameter.
    pub fn to_param(&self) -> String {
        self.ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl IntoIterator for IdentifierBatch {
    type Item = ObjectId;
    type IntoIter = std::vec::IntoIter<ObjectId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}
