use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single RFC 6902 operation.
///
/// Serializes as `{"op": "...", "path": "...", "value": ...}`, where `value`
/// is only present for [`Add`](PatchOperation::Add) and
/// [`Replace`](PatchOperation::Replace).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Replace { path: String, value: Value },
    Remove { path: String },
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: impl Into<Value>) -> Self {
        PatchOperation::Add {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn replace(path: impl Into<String>, value: impl Into<Value>) -> Self {
        PatchOperation::Replace {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        PatchOperation::Remove { path: path.into() }
    }

    /// The `op` member of the wire format
    pub fn op(&self) -> &'static str {
        match self {
            PatchOperation::Add { .. } => "add",
            PatchOperation::Replace { .. } => "replace",
            PatchOperation::Remove { .. } => "remove",
        }
    }

    pub fn path(&self) -> &str {
        match self {
            PatchOperation::Add { path, .. }
            | PatchOperation::Replace { path, .. }
            | PatchOperation::Remove { path } => path,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            PatchOperation::Add { value, .. } | PatchOperation::Replace { value, .. } => {
                Some(value)
            }
            PatchOperation::Remove { .. } => None,
        }
    }
}

/// An ordered JSON Patch document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchOperations(pub Vec<PatchOperation>);

impl PatchOperations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: PatchOperation) {
        self.0.push(op)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PatchOperation> {
        self.0.iter()
    }

    /// Positional structural equality: same length, and at every index the
    /// same operation kind, path and value.
    pub fn equal(&self, other: &PatchOperations) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    /// The request body: a JSON array of the operations, in order.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.0)
    }
}

impl From<Vec<PatchOperation>> for PatchOperations {
    fn from(ops: Vec<PatchOperation>) -> Self {
        PatchOperations(ops)
    }
}

impl FromIterator<PatchOperation> for PatchOperations {
    fn from_iter<T: IntoIterator<Item = PatchOperation>>(iter: T) -> Self {
        PatchOperations(iter.into_iter().collect())
    }
}

impl Extend<PatchOperation> for PatchOperations {
    fn extend<T: IntoIterator<Item = PatchOperation>>(&mut self, iter: T) {
        self.0.extend(iter)
    }
}

impl IntoIterator for PatchOperations {
    type Item = PatchOperation;
    type IntoIter = std::vec::IntoIter<PatchOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a PatchOperations {
    type Item = &'a PatchOperation;
    type IntoIter = std::slice::Iter<'a, PatchOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Goes through the wire format, so the resulting document is exactly what
/// the API server would receive.
impl TryFrom<&PatchOperations> for json_patch::Patch {
    type Error = serde_json::Error;

    fn try_from(ops: &PatchOperations) -> Result<Self, Self::Error> {
        serde_json::from_slice(&ops.to_json()?)
    }
}
