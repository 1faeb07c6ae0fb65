//! Structural diff between two JSON documents
//!
//! [`diff`] produces an ordered change list such that
//! `apply_patch(base, &diff(base, target)?)? == target`.
//!
//! # Ordering
//!
//! At every container the engine emits removals, then additions, then the
//! changes found inside members present on both sides. Object keys are
//! visited in ascending order. Arrays are compared by position (no LCS):
//! surplus base elements are removed from the highest index down so that
//! each removal still addresses the element it recorded, and surplus target
//! elements are appended in ascending order. Output is deterministic.

use serde_json::{Map, Value};

use crate::change::Change;
use crate::path::DocPath;

/// Tuning for [`diff_with`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Reject documents nested deeper than this many levels
    ///
    /// `None` walks any depth; the walk uses an explicit stack, so deep
    /// input cannot overflow the call stack.
    pub max_depth: Option<usize>,
}

impl DiffOptions {
    /// Options with a nesting limit
    #[inline]
    #[must_use]
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth: Some(max_depth),
        }
    }
}

/// Errors raised while computing a diff
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    /// Input nests deeper than [`DiffOptions::max_depth`]
    #[error("document exceeds maximum depth {max_depth} at '{path}'")]
    DepthExceeded {
        /// Container that crossed the limit
        path: DocPath,
        /// Configured limit
        max_depth: usize,
    },
}

struct Frame<'a> {
    path: DocPath,
    base: &'a Value,
    target: &'a Value,
}

/// Diff `base` against `target` with default options
///
/// # Errors
/// Never fails with default options; see [`diff_with`].
pub fn diff(base: &Value, target: &Value) -> Result<Vec<Change>, DiffError> {
    diff_with(base, target, DiffOptions::default())
}

/// Diff `base` against `target`
///
/// # Errors
/// Returns [`DiffError::DepthExceeded`] when a container on either side is
/// nested deeper than `options.max_depth`.
pub fn diff_with(
    base: &Value,
    target: &Value,
    options: DiffOptions,
) -> Result<Vec<Change>, DiffError> {
    let mut changes = Vec::new();
    let mut stack = vec![Frame {
        path: DocPath::root(),
        base,
        target,
    }];

    // Frames are pushed in reverse so the pop order is a pre-order walk.
    while let Some(frame) = stack.pop() {
        match (frame.base, frame.target) {
            (Value::Object(a), Value::Object(b)) => {
                check_depth(&frame.path, options)?;
                diff_objects(&frame.path, a, b, &mut changes, &mut stack);
            }
            (Value::Array(a), Value::Array(b)) => {
                check_depth(&frame.path, options)?;
                diff_arrays(&frame.path, a, b, &mut changes, &mut stack);
            }
            (a, b) if a == b => {}
            (a, b) => changes.push(Change::replace(frame.path, a.clone(), b.clone())),
        }
    }

    Ok(changes)
}

fn check_depth(path: &DocPath, options: DiffOptions) -> Result<(), DiffError> {
    match options.max_depth {
        Some(max_depth) if path.len() >= max_depth => Err(DiffError::DepthExceeded {
            path: path.clone(),
            max_depth,
        }),
        _ => Ok(()),
    }
}

fn diff_objects<'a>(
    path: &DocPath,
    a: &'a Map<String, Value>,
    b: &'a Map<String, Value>,
    changes: &mut Vec<Change>,
    stack: &mut Vec<Frame<'a>>,
) {
    let mut removed: Vec<_> = a.iter().filter(|(k, _)| !b.contains_key(*k)).collect();
    removed.sort_by(|x, y| x.0.cmp(y.0));
    for (key, old) in removed {
        changes.push(Change::remove(path.child(key.as_str()), old.clone()));
    }

    let mut added: Vec<_> = b.iter().filter(|(k, _)| !a.contains_key(*k)).collect();
    added.sort_by(|x, y| x.0.cmp(y.0));
    for (key, new) in added {
        changes.push(Change::add(path.child(key.as_str()), new.clone()));
    }

    let mut common: Vec<_> = a
        .iter()
        .filter_map(|(k, old)| b.get(k).map(|new| (k, old, new)))
        .collect();
    common.sort_by(|x, y| x.0.cmp(y.0));
    for (key, old, new) in common.into_iter().rev() {
        stack.push(Frame {
            path: path.child(key.as_str()),
            base: old,
            target: new,
        });
    }
}

fn diff_arrays<'a>(
    path: &DocPath,
    a: &'a [Value],
    b: &'a [Value],
    changes: &mut Vec<Change>,
    stack: &mut Vec<Frame<'a>>,
) {
    let shared = a.len().min(b.len());

    for index in (shared..a.len()).rev() {
        changes.push(Change::remove(path.child(index), a[index].clone()));
    }

    for (index, new) in b.iter().enumerate().skip(shared) {
        changes.push(Change::add(path.child(index), new.clone()));
    }

    for index in (0..shared).rev() {
        stack.push(Frame {
            path: path.child(index),
            base: &a[index],
            target: &b[index],
        });
    }
}
