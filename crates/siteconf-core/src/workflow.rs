//! Seams to the external validator and approval workflow
//!
//! Neither validation policy nor approval policy lives in this crate. The
//! validator's output is consumed as a [`ValidationReport`]; the approval
//! workflow receives submitted updates through [`ApprovalWorkflow`] and
//! reports its decision back through the pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::record::{UpdateId, UpdateRecord};

/// Output of the external schema validator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ValidationReport {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }

    /// Convert into a result
    ///
    /// # Errors
    /// Returns [`Error::Validation`] when the report is not valid
    pub fn into_result(self) -> Result<(), Error> {
        if self.valid {
            Ok(())
        } else {
            Err(Error::Validation {
                errors: self.errors,
            })
        }
    }
}

/// Approval state reported by the external workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Pending,
    Approved,
    Rejected { reason: String },
}

/// Approval state of one update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub update_id: UpdateId,
    #[serde(flatten)]
    pub decision: ApprovalDecision,
    #[serde(default)]
    pub decided_by: Option<String>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
}

impl ApprovalRecord {
    /// Submitted, awaiting a decision
    #[must_use]
    pub fn pending(update_id: UpdateId) -> Self {
        Self {
            update_id,
            decision: ApprovalDecision::Pending,
            decided_by: None,
            decided_at: None,
        }
    }

    #[must_use]
    pub fn approved(update_id: UpdateId, decided_by: impl Into<String>) -> Self {
        Self::decided(update_id, ApprovalDecision::Approved, decided_by)
    }

    #[must_use]
    pub fn rejected(
        update_id: UpdateId,
        decided_by: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::decided(
            update_id,
            ApprovalDecision::Rejected {
                reason: reason.into(),
            },
            decided_by,
        )
    }

    /// Record `decision` as made now by `decided_by`
    #[must_use]
    pub fn decided(
        update_id: UpdateId,
        decision: ApprovalDecision,
        decided_by: impl Into<String>,
    ) -> Self {
        Self {
            update_id,
            decision,
            decided_by: Some(decided_by.into()),
            decided_at: Some(Utc::now()),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_decided(&self) -> bool {
        !matches!(self.decision, ApprovalDecision::Pending)
    }
}

/// External approval workflow
///
/// `submit` only hands the update over; the decision arrives later through
/// [`crate::UpdatePipeline::decide`].
#[async_trait]
pub trait ApprovalWorkflow: Send + Sync {
    /// Queue `record` for review
    async fn submit(&self, record: &UpdateRecord) -> Result<(), WorkflowError>;
}

/// Approval workflow failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkflowError {
    #[error("approval workflow unavailable: {0}")]
    Unavailable(String),

    #[error("approval workflow refused update: {0}")]
    Refused(String),
}
