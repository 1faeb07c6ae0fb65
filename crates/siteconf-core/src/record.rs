//! Persistent records
//!
//! - [`ConfigVersion`]: one immutable snapshot of a site's document
//! - [`UpdateRecord`]: one signed transition between two versions
//! - [`UpdateStatus`]: lifecycle state derived from a record and its approval

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use siteconf_document::{Change, ChangeSummary, ContentHash};
use ulid::Ulid;

use crate::signing::{SigningError, UpdateSigner};
use crate::version::Version;
use crate::workflow::{ApprovalDecision, ApprovalRecord};

/// Managed site identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(String);

impl SiteId {
    /// Wrap a site identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SiteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SiteId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SiteId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Unique update identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UpdateId(pub Ulid);

impl UpdateId {
    /// Generate new update ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for UpdateId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for UpdateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UpdateId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// One stored snapshot of a site's configuration document
///
/// Rows are append-only. Only `active` ever changes, and only through the
/// store's activation primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigVersion {
    pub site_id: SiteId,
    /// Semantic version label, unique per site
    pub version: String,
    /// Full document; `None` when the content is unavailable (archived rows)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<ContentHash>,
    pub active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl ConfigVersion {
    /// Inactive version holding `document`
    #[must_use]
    pub fn new(
        site_id: SiteId,
        version: impl Into<String>,
        document: Value,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            site_id,
            version: version.into(),
            content_hash: Some(ContentHash::of_document(&document)),
            document: Some(document),
            active: false,
            created_by: created_by.into(),
            created_at: Utc::now(),
        }
    }

    /// Inactive version whose content is not available
    #[must_use]
    pub fn without_content(
        site_id: SiteId,
        version: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            site_id,
            version: version.into(),
            document: None,
            content_hash: None,
            active: false,
            created_by: created_by.into(),
            created_at: Utc::now(),
        }
    }

    /// Mark active; only meaningful for rows handed to an activating insert
    #[inline]
    #[must_use]
    pub fn activated(mut self) -> Self {
        self.active = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.document.is_some()
    }

    /// Parsed label
    #[inline]
    #[must_use]
    pub fn parsed_version(&self) -> Version {
        Version::parse(&self.version)
    }
}

/// What an update carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdatePayload {
    /// Ordered change list from `from_version` to `to_version`
    Changes { changes: Vec<Change> },
    /// Reactivation of an earlier version's content
    Rollback { restored_from: String },
}

impl UpdatePayload {
    /// Change list; empty for rollbacks
    #[must_use]
    pub fn changes(&self) -> &[Change] {
        match self {
            Self::Changes { changes } => changes,
            Self::Rollback { .. } => &[],
        }
    }

    #[inline]
    #[must_use]
    pub fn is_rollback(&self) -> bool {
        matches!(self, Self::Rollback { .. })
    }

    #[must_use]
    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary::of(self.changes())
    }
}

/// Unsigned update, turned into an [`UpdateRecord`] by [`UpdateDraft::sign`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateDraft {
    pub site_id: SiteId,
    pub from_version: Option<String>,
    pub to_version: String,
    pub payload: UpdatePayload,
    pub actor: String,
}

impl UpdateDraft {
    /// Unsigned update created now
    #[must_use]
    pub fn new(
        site_id: SiteId,
        from_version: Option<String>,
        to_version: impl Into<String>,
        payload: UpdatePayload,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            site_id,
            from_version,
            to_version: to_version.into(),
            payload,
            actor: actor.into(),
        }
    }

    /// Fix the signing time, tag the content and allocate an id
    ///
    /// # Errors
    /// Returns error if the content cannot be encoded for signing
    pub fn sign(self, signer: &UpdateSigner) -> Result<UpdateRecord, SigningError> {
        let now = Utc::now();
        let mut record = UpdateRecord {
            id: UpdateId::new(),
            site_id: self.site_id,
            from_version: self.from_version,
            to_version: self.to_version,
            payload: self.payload,
            signature: String::new(),
            signed_at: now,
            applied_at: None,
            rolled_back_at: None,
            actor: self.actor,
            created_at: now,
        };
        record.signature = signer.sign_record(&record)?;
        Ok(record)
    }
}

/// One signed transition between two versions of a site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub id: UpdateId,
    pub site_id: SiteId,
    /// `None` only for a site's first version
    pub from_version: Option<String>,
    pub to_version: String,
    pub payload: UpdatePayload,
    /// Lowercase hex HMAC-SHA256 over the signed content
    pub signature: String,
    pub signed_at: DateTime<Utc>,
    #[serde(default)]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

impl UpdateRecord {
    #[inline]
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }

    #[inline]
    #[must_use]
    pub fn is_rollback(&self) -> bool {
        self.payload.is_rollback()
    }

    /// Lifecycle state given the update's approval, if any
    #[must_use]
    pub fn status(&self, approval: Option<&ApprovalRecord>) -> UpdateStatus {
        if self.rolled_back_at.is_some() {
            return UpdateStatus::RolledBack;
        }
        if self.applied_at.is_some() {
            return UpdateStatus::Applied;
        }
        match approval.map(|a| &a.decision) {
            None => UpdateStatus::Proposed,
            Some(ApprovalDecision::Pending) => UpdateStatus::PendingApproval,
            Some(ApprovalDecision::Approved) => UpdateStatus::Approved,
            Some(ApprovalDecision::Rejected { .. }) => UpdateStatus::Rejected,
        }
    }
}

/// Update lifecycle
///
/// `Proposed → PendingApproval → Approved → Applied`, or `Rejected`.
/// A rollback is a new record; the record it superseded reports
/// `RolledBack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Proposed,
    PendingApproval,
    Approved,
    Applied,
    Rejected,
    RolledBack,
}

impl UpdateStatus {
    /// No further transitions are possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::RolledBack)
    }
}

impl Display for UpdateStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Proposed => "proposed",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Applied => "applied",
            Self::Rejected => "rejected",
            Self::RolledBack => "rolled_back",
        };
        f.write_str(name)
    }
}
