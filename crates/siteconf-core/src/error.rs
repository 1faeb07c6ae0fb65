//! Error types for siteconf core
//!
//! Module errors ([`DiffError`], [`PatchError`], [`SigningError`],
//! [`StoreError`], [`ConfigError`], [`WorkflowError`], [`VersionOverflow`])
//! convert into the
//! crate-level [`Error`]. Callers branch on [`Error::kind`].

use siteconf_document::{DiffError, PatchError};

use crate::config::ConfigError;
use crate::record::{SiteId, UpdateId};
use crate::signing::SigningError;
use crate::store::StoreError;
use crate::version::VersionOverflow;
use crate::workflow::WorkflowError;

/// Result alias for core operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main siteconf error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// External validator rejected the document
    #[error("validation failed: {}", .errors.join("; "))]
    Validation { errors: Vec<String> },

    /// Diff could not be computed
    #[error("diff computation failed: {0}")]
    DiffComputation(#[from] DiffError),

    /// Patch addressed a location that does not exist
    #[error("path not found: {0}")]
    PathNotFound(#[from] PatchError),

    /// Stored signature does not match the record
    #[error("signature mismatch{}", .update_id.map(|id| format!(" for update {id}")).unwrap_or_default())]
    SignatureMismatch { update_id: Option<UpdateId> },

    /// Signing could not run (key or encoding problem)
    #[error("signing failed: {0}")]
    Signing(SigningError),

    /// Referenced version or update does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Concurrent modification or invalid state transition
    #[error("conflict: {0}")]
    Conflict(String),

    /// Replaying an update's changes does not reproduce its stored target
    #[error("document mismatch for site {site} at version {version}")]
    DocumentMismatch { site: SiteId, version: String },

    /// Next label cannot be assigned
    #[error("version sequencing failed: {0}")]
    Version(#[from] VersionOverflow),

    /// Proposed document equals the active one
    #[error("no changes to propose for site {0}")]
    NoChanges(SiteId),

    /// Approval workflow error
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persistence backend failure
    #[error("store error: {0}")]
    Store(String),
}

impl Error {
    /// Check if the caller may re-read state and retry
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Coarse classification
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::DiffComputation(_) => ErrorKind::DiffComputation,
            Self::PathNotFound(_) => ErrorKind::PathNotFound,
            Self::SignatureMismatch { .. } => ErrorKind::SignatureMismatch,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::DocumentMismatch { .. } => ErrorKind::Integrity,
            Self::NoChanges(_) | Self::Version(_) => ErrorKind::Validation,
            Self::Signing(_) | Self::Workflow(_) | Self::Config(_) | Self::Store(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Tag a signature mismatch with the update it concerns
    #[must_use]
    pub fn for_update(self, id: UpdateId) -> Self {
        match self {
            Self::SignatureMismatch { update_id: None } => Self::SignatureMismatch {
                update_id: Some(id),
            },
            other => other,
        }
    }

    pub(crate) fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<SigningError> for Error {
    fn from(err: SigningError) -> Self {
        match err {
            SigningError::SignatureMismatch => Self::SignatureMismatch { update_id: None },
            other => Self::Signing(other),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => Self::NotFound { kind, id },
            StoreError::Backend(message) => Self::Store(message),
            conflict => Self::Conflict(conflict.to_string()),
        }
    }
}

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    DiffComputation,
    PathNotFound,
    SignatureMismatch,
    NotFound,
    Conflict,
    Integrity,
    Internal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(Error::Conflict("lost race".into()).is_retryable());
        assert!(!Error::not_found("version", "1.0.0").is_retryable());
        assert!(!Error::SignatureMismatch { update_id: None }.is_retryable());
    }

    #[test]
    fn signing_mismatch_maps_to_signature_mismatch() {
        let err = Error::from(SigningError::SignatureMismatch);
        assert_eq!(err.kind(), ErrorKind::SignatureMismatch);

        let err = Error::from(SigningError::EmptyKey);
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn store_errors_map_by_meaning() {
        let err = Error::from(StoreError::NotFound {
            kind: "version",
            id: "shop@2.0.0".into(),
        });
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "version not found: shop@2.0.0");

        let err = Error::from(StoreError::ActiveChanged {
            site: SiteId::from("shop"),
            expected: Some("1.0.0".into()),
            actual: Some("1.1.0".into()),
        });
        assert!(err.is_retryable());

        let err = Error::from(StoreError::Backend("disk full".into()));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn for_update_fills_missing_id() {
        let id = UpdateId::new();
        let err = Error::SignatureMismatch { update_id: None }.for_update(id);
        assert!(matches!(err, Error::SignatureMismatch { update_id: Some(got) } if got == id));
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn validation_message_joins_errors() {
        let err = Error::Validation {
            errors: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "validation failed: a; b");
    }
}
