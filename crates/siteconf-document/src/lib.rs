//! siteconf Document Engine
//!
//! Structural diff, patch and migration over JSON site configuration
//! documents.
//!
//! # Core Concepts
//!
//! - [`DocPath`]: key/index path into a document, rendered as a JSON Pointer
//! - [`Change`]: one add/remove/replace edit at a path
//! - [`diff`]: ordered change list between two documents
//! - [`apply_patch`]: replay a change list onto a document
//! - [`MigrationAdapter`]: rewrite legacy document shapes
//! - [`ContentHash`]: Blake3 digest of a document's canonical bytes
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use siteconf_document::{apply_patch, diff};
//!
//! let base = json!({"a": 1, "b": 2});
//! let target = json!({"a": 1, "c": 3});
//!
//! let changes = diff(&base, &target).unwrap();
//! assert_eq!(apply_patch(&base, &changes).unwrap(), target);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod change;
mod diff;
mod format;
mod hash;
mod migration;
mod patch;
mod path;

pub use change::{Change, ChangeOp, ChangeSummary};
pub use diff::{diff, diff_with, DiffError, DiffOptions};
pub use format::{DocumentFormat, FormatError};
pub use hash::{canonical_bytes, ContentHash, HashError};
pub use migration::{
    LegacyMaintenanceFlag, LegacyNavLinks, LegacySeoFields, LegacyThemeColor, MigrationAdapter,
    MigrationReport, MigrationRule,
};
pub use patch::{apply_change, apply_patch, PatchError};
pub use path::{DocPath, PathError, Segment};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
