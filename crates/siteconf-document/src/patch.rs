//! Change list application
//!
//! [`apply_patch`] replays changes in exactly the order given. Array
//! removals and insertions shift later elements, so a list produced by
//! [`crate::diff`] must not be reordered before it is applied.

use serde_json::Value;

use crate::change::{Change, ChangeOp};
use crate::path::{DocPath, Segment};

/// Errors raised while applying changes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    /// A segment of the path does not exist in the document
    #[error("path not found for {op}: '{path}'")]
    PathNotFound {
        /// Operation being applied
        op: ChangeOp,
        /// Full path of the change
        path: DocPath,
    },

    /// add/replace without a value
    #[error("{op} at '{path}' carries no value")]
    MissingValue {
        /// Operation being applied
        op: ChangeOp,
        /// Full path of the change
        path: DocPath,
    },

    /// add/remove targeting the document root
    #[error("{0} cannot target the document root")]
    RootOperation(ChangeOp),
}

/// Apply `changes` to a copy of `base`
///
/// # Errors
/// Returns [`PatchError`] for the first change whose path cannot be
/// resolved; `base` is left untouched.
pub fn apply_patch(base: &Value, changes: &[Change]) -> Result<Value, PatchError> {
    let mut document = base.clone();
    for change in changes {
        apply_change(&mut document, change)?;
    }
    Ok(document)
}

/// Apply one change in place
///
/// # Errors
/// Returns [`PatchError`] when the path cannot be resolved.
pub fn apply_change(document: &mut Value, change: &Change) -> Result<(), PatchError> {
    let not_found = || PatchError::PathNotFound {
        op: change.op,
        path: change.path.clone(),
    };

    let Some((parents, last)) = change.path.split_last() else {
        return match change.op {
            ChangeOp::Replace => {
                *document = new_value(change)?;
                Ok(())
            }
            op => Err(PatchError::RootOperation(op)),
        };
    };

    let container = resolve_mut(document, parents).ok_or_else(not_found)?;

    match (change.op, container) {
        (ChangeOp::Add, Value::Object(map)) => {
            map.insert(last.key().into_owned(), new_value(change)?);
        }
        (ChangeOp::Add, Value::Array(items)) => {
            let index = last.index().filter(|i| *i <= items.len()).ok_or_else(not_found)?;
            items.insert(index, new_value(change)?);
        }
        (ChangeOp::Remove, Value::Object(map)) => {
            map.remove(&*last.key()).ok_or_else(not_found)?;
        }
        (ChangeOp::Remove, Value::Array(items)) => {
            let index = last.index().filter(|i| *i < items.len()).ok_or_else(not_found)?;
            items.remove(index);
        }
        (ChangeOp::Replace, Value::Object(map)) => {
            let slot = map.get_mut(&*last.key()).ok_or_else(not_found)?;
            *slot = new_value(change)?;
        }
        (ChangeOp::Replace, Value::Array(items)) => {
            let slot = last
                .index()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(not_found)?;
            *slot = new_value(change)?;
        }
        _ => return Err(not_found()),
    }

    Ok(())
}

fn new_value(change: &Change) -> Result<Value, PatchError> {
    change.value.clone().ok_or_else(|| PatchError::MissingValue {
        op: change.op,
        path: change.path.clone(),
    })
}

fn resolve_mut<'a>(document: &'a mut Value, segments: &[Segment]) -> Option<&'a mut Value> {
    let mut current = document;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get_mut(&*segment.key())?,
            Value::Array(items) => items.get_mut(segment.index()?)?,
            _ => return None,
        };
    }
    Some(current)
}
