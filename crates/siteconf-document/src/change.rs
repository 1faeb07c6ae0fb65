//! Structural changes between documents
//!
//! A [`Change`] is one edit at one [`DocPath`]. Change lists are produced by
//! [`crate::diff`] and consumed by [`crate::apply_patch`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::path::DocPath;

/// Kind of structural edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    /// Insert a member or array element
    Add,
    /// Delete a member or array element
    Remove,
    /// Overwrite the value at an existing location
    Replace,
}

impl ChangeOp {
    /// Lowercase wire name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Replace => "replace",
        }
    }
}

impl std::fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structural edit
///
/// `value` is present for add/replace. `old_value` is present for
/// remove/replace and only serves audit display; patching never reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Location of the edit
    pub path: DocPath,
    /// Edit kind
    pub op: ChangeOp,
    /// New value
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub value: Option<Value>,
    /// Previous value
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub old_value: Option<Value>,
}

impl Change {
    /// Insert `value` at `path`
    #[inline]
    #[must_use]
    pub fn add(path: DocPath, value: Value) -> Self {
        Self {
            path,
            op: ChangeOp::Add,
            value: Some(value),
            old_value: None,
        }
    }

    /// Delete whatever is at `path`, recording what was there
    #[inline]
    #[must_use]
    pub fn remove(path: DocPath, old_value: Value) -> Self {
        Self {
            path,
            op: ChangeOp::Remove,
            value: None,
            old_value: Some(old_value),
        }
    }

    /// Overwrite `old_value` at `path` with `value`
    #[inline]
    #[must_use]
    pub fn replace(path: DocPath, old_value: Value, value: Value) -> Self {
        Self {
            path,
            op: ChangeOp::Replace,
            value: Some(value),
            old_value: Some(old_value),
        }
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = if self.path.is_empty() {
            "/".to_string()
        } else {
            self.path.to_string()
        };
        write!(f, "{} {}", self.op, path)
    }
}

// A present `null` must stay `Some(Value::Null)`; plain `Option<Value>`
// would collapse it to `None`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Summary counts for a change list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    /// Number of add operations
    pub added: usize,
    /// Number of remove operations
    pub removed: usize,
    /// Number of replace operations
    pub replaced: usize,
}

impl ChangeSummary {
    /// Count operations in `changes`
    #[must_use]
    pub fn of(changes: &[Change]) -> Self {
        changes.iter().fold(Self::default(), |mut acc, change| {
            match change.op {
                ChangeOp::Add => acc.added += 1,
                ChangeOp::Remove => acc.removed += 1,
                ChangeOp::Replace => acc.replaced += 1,
            }
            acc
        })
    }

    /// Total operations
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.added + self.removed + self.replaced
    }
}
