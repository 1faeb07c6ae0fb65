//! Persistence boundary
//!
//! [`VersionStore`] is what the core needs from a persistence backend. The
//! backend owns the per-site active flag: every activation goes through
//! [`VersionStore::transition_active`] or
//! [`VersionStore::insert_and_activate`], both of which check the expected
//! current active label and flip in one atomic step.
//!
//! [`MemoryStore`] is the in-process implementation used by tests and the
//! CLI. All atomic operations hold its write lock across check and mutation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::record::{ConfigVersion, SiteId, UpdateId, UpdateRecord};
use crate::workflow::ApprovalRecord;

/// Storage backend for versions, updates and approvals
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// The site's active version, if any
    async fn active_version(&self, site: &SiteId) -> Result<Option<ConfigVersion>, StoreError>;

    async fn get_version(
        &self,
        site: &SiteId,
        version: &str,
    ) -> Result<Option<ConfigVersion>, StoreError>;

    /// All versions of a site in insertion order
    async fn list_versions(&self, site: &SiteId) -> Result<Vec<ConfigVersion>, StoreError>;

    /// Append an inactive version
    ///
    /// Rejects duplicate labels and rows marked active.
    async fn insert_version(&self, version: ConfigVersion) -> Result<(), StoreError>;

    /// Make `next` the active version if the current active label is
    /// `expected`; the previous active row is deactivated in the same step
    async fn transition_active(
        &self,
        site: &SiteId,
        expected: Option<&str>,
        next: &str,
    ) -> Result<(), StoreError>;

    /// Append `version` already active, under the same condition as
    /// [`Self::transition_active`]
    async fn insert_and_activate(
        &self,
        version: ConfigVersion,
        expected: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Append an update record
    async fn insert_update(&self, record: UpdateRecord) -> Result<(), StoreError>;

    async fn get_update(&self, id: UpdateId) -> Result<Option<UpdateRecord>, StoreError>;

    /// All updates of a site in insertion order
    async fn list_updates(&self, site: &SiteId) -> Result<Vec<UpdateRecord>, StoreError>;

    /// Set `applied_at`; fails if already set
    async fn mark_applied(&self, id: UpdateId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Set `rolled_back_at`; fails if already set
    async fn mark_rolled_back(&self, id: UpdateId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Insert or replace an update's approval state
    async fn put_approval(&self, approval: ApprovalRecord) -> Result<(), StoreError>;

    async fn get_approval(&self, id: UpdateId) -> Result<Option<ApprovalRecord>, StoreError>;
}

/// Storage failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("version {version} already exists for site {site}")]
    DuplicateVersion { site: SiteId, version: String },

    #[error("update {0} already exists")]
    DuplicateUpdate(UpdateId),

    #[error("version {version} of site {site} must be inserted inactive")]
    ActiveInsert { site: SiteId, version: String },

    #[error("active version of site {site} changed (expected {expected:?}, found {actual:?})")]
    ActiveChanged {
        site: SiteId,
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("{field} already set on update {update_id}")]
    AlreadySet {
        field: &'static str,
        update_id: UpdateId,
    },

    #[error("backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    fn missing_version(site: &SiteId, version: &str) -> Self {
        Self::NotFound {
            kind: "version",
            id: format!("{site}@{version}"),
        }
    }

    fn missing_update(id: UpdateId) -> Self {
        Self::NotFound {
            kind: "update",
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    versions: HashMap<SiteId, Vec<ConfigVersion>>,
    updates: Vec<UpdateRecord>,
    update_index: HashMap<UpdateId, usize>,
    approvals: HashMap<UpdateId, ApprovalRecord>,
}

impl Tables {
    fn active_label(&self, site: &SiteId) -> Option<&str> {
        self.versions
            .get(site)?
            .iter()
            .find(|v| v.active)
            .map(|v| v.version.as_str())
    }

    fn check_active(&self, site: &SiteId, expected: Option<&str>) -> Result<(), StoreError> {
        let actual = self.active_label(site);
        if actual == expected {
            Ok(())
        } else {
            Err(StoreError::ActiveChanged {
                site: site.clone(),
                expected: expected.map(str::to_string),
                actual: actual.map(str::to_string),
            })
        }
    }

    fn check_unique(&self, version: &ConfigVersion) -> Result<(), StoreError> {
        let exists = self
            .versions
            .get(&version.site_id)
            .is_some_and(|rows| rows.iter().any(|v| v.version == version.version));
        if exists {
            Err(StoreError::DuplicateVersion {
                site: version.site_id.clone(),
                version: version.version.clone(),
            })
        } else {
            Ok(())
        }
    }

    fn deactivate_all(&mut self, site: &SiteId) {
        if let Some(rows) = self.versions.get_mut(site) {
            for row in rows.iter_mut() {
                row.active = false;
            }
        }
    }

    fn update_mut(&mut self, id: UpdateId) -> Result<&mut UpdateRecord, StoreError> {
        let index = *self
            .update_index
            .get(&id)
            .ok_or_else(|| StoreError::missing_update(id))?;
        self.updates
            .get_mut(index)
            .ok_or_else(|| StoreError::missing_update(id))
    }
}

/// In-memory [`VersionStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active rows for `site`; never more than one
    #[must_use]
    pub fn active_count(&self, site: &SiteId) -> usize {
        self.tables
            .read()
            .versions
            .get(site)
            .map_or(0, |rows| rows.iter().filter(|v| v.active).count())
    }
}

#[async_trait]
impl VersionStore for MemoryStore {
    async fn active_version(&self, site: &SiteId) -> Result<Option<ConfigVersion>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .versions
            .get(site)
            .and_then(|rows| rows.iter().find(|v| v.active).cloned()))
    }

    async fn get_version(
        &self,
        site: &SiteId,
        version: &str,
    ) -> Result<Option<ConfigVersion>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .versions
            .get(site)
            .and_then(|rows| rows.iter().find(|v| v.version == version).cloned()))
    }

    async fn list_versions(&self, site: &SiteId) -> Result<Vec<ConfigVersion>, StoreError> {
        Ok(self
            .tables
            .read()
            .versions
            .get(site)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_version(&self, version: ConfigVersion) -> Result<(), StoreError> {
        if version.active {
            return Err(StoreError::ActiveInsert {
                site: version.site_id,
                version: version.version,
            });
        }

        let mut tables = self.tables.write();
        tables.check_unique(&version)?;
        tables
            .versions
            .entry(version.site_id.clone())
            .or_default()
            .push(version);
        Ok(())
    }

    async fn transition_active(
        &self,
        site: &SiteId,
        expected: Option<&str>,
        next: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        tables.check_active(site, expected)?;

        let rows = tables
            .versions
            .get_mut(site)
            .ok_or_else(|| StoreError::missing_version(site, next))?;
        let target = rows
            .iter()
            .position(|v| v.version == next)
            .ok_or_else(|| StoreError::missing_version(site, next))?;

        for (i, row) in rows.iter_mut().enumerate() {
            row.active = i == target;
        }

        tracing::debug!(site = %site, from = ?expected, to = next, "active version transitioned");
        Ok(())
    }

    async fn insert_and_activate(
        &self,
        version: ConfigVersion,
        expected: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        tables.check_active(&version.site_id, expected)?;
        tables.check_unique(&version)?;

        let site = version.site_id.clone();
        tables.deactivate_all(&site);
        tracing::debug!(site = %site, from = ?expected, to = %version.version, "inserted active version");
        tables
            .versions
            .entry(site)
            .or_default()
            .push(version.activated());
        Ok(())
    }

    async fn insert_update(&self, record: UpdateRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if tables.update_index.contains_key(&record.id) {
            return Err(StoreError::DuplicateUpdate(record.id));
        }
        let index = tables.updates.len();
        tables.update_index.insert(record.id, index);
        tables.updates.push(record);
        Ok(())
    }

    async fn get_update(&self, id: UpdateId) -> Result<Option<UpdateRecord>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .update_index
            .get(&id)
            .and_then(|&i| tables.updates.get(i))
            .cloned())
    }

    async fn list_updates(&self, site: &SiteId) -> Result<Vec<UpdateRecord>, StoreError> {
        Ok(self
            .tables
            .read()
            .updates
            .iter()
            .filter(|u| &u.site_id == site)
            .cloned()
            .collect())
    }

    async fn mark_applied(&self, id: UpdateId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let record = tables.update_mut(id)?;
        if record.applied_at.is_some() {
            return Err(StoreError::AlreadySet {
                field: "applied_at",
                update_id: id,
            });
        }
        record.applied_at = Some(at);
        Ok(())
    }

    async fn mark_rolled_back(&self, id: UpdateId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let record = tables.update_mut(id)?;
        if record.rolled_back_at.is_some() {
            return Err(StoreError::AlreadySet {
                field: "rolled_back_at",
                update_id: id,
            });
        }
        record.rolled_back_at = Some(at);
        Ok(())
    }

    async fn put_approval(&self, approval: ApprovalRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if !tables.update_index.contains_key(&approval.update_id) {
            return Err(StoreError::missing_update(approval.update_id));
        }
        tables.approvals.insert(approval.update_id, approval);
        Ok(())
    }

    async fn get_approval(&self, id: UpdateId) -> Result<Option<ApprovalRecord>, StoreError> {
        Ok(self.tables.read().approvals.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{UpdateDraft, UpdatePayload};
    use crate::signing::{SigningKey, UpdateSigner};
    use serde_json::json;

    fn site() -> SiteId {
        SiteId::from("shop")
    }

    fn version(label: &str) -> ConfigVersion {
        ConfigVersion::new(site(), label, json!({"v": label}), "tester")
    }

    fn record(to: &str) -> UpdateRecord {
        let signer = UpdateSigner::new(SigningKey::new("store-test").unwrap());
        UpdateDraft::new(
            site(),
            None,
            to,
            UpdatePayload::Changes { changes: vec![] },
            "tester",
        )
        .sign(&signer)
        .unwrap()
    }

    #[tokio::test]
    async fn insert_keeps_rows_inactive() {
        let store = MemoryStore::new();
        store.insert_version(version("1.0.0")).await.unwrap();
        assert!(store.active_version(&site()).await.unwrap().is_none());
        assert_eq!(store.list_versions(&site()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_label_conflicts() {
        let store = MemoryStore::new();
        store.insert_version(version("1.0.0")).await.unwrap();
        let err = store.insert_version(version("1.0.0")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateVersion { .. }));
    }

    #[tokio::test]
    async fn active_insert_is_rejected() {
        let store = MemoryStore::new();
        let err = store
            .insert_version(version("1.0.0").activated())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ActiveInsert { .. }));
    }

    #[tokio::test]
    async fn transition_checks_expected_label() {
        let store = MemoryStore::new();
        store.insert_version(version("1.0.0")).await.unwrap();
        store.insert_version(version("1.1.0")).await.unwrap();

        store.transition_active(&site(), None, "1.0.0").await.unwrap();
        let err = store
            .transition_active(&site(), None, "1.1.0")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ActiveChanged { .. }));

        store
            .transition_active(&site(), Some("1.0.0"), "1.1.0")
            .await
            .unwrap();
        let active = store.active_version(&site()).await.unwrap().unwrap();
        assert_eq!(active.version, "1.1.0");
        assert_eq!(store.active_count(&site()), 1);
    }

    #[tokio::test]
    async fn transition_to_missing_version_fails() {
        let store = MemoryStore::new();
        store.insert_version(version("1.0.0")).await.unwrap();
        let err = store
            .transition_active(&site(), None, "9.9.9")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "version", .. }));
        assert_eq!(store.active_count(&site()), 0);
    }

    #[tokio::test]
    async fn insert_and_activate_replaces_active() {
        let store = MemoryStore::new();
        store.insert_version(version("1.0.0")).await.unwrap();
        store.transition_active(&site(), None, "1.0.0").await.unwrap();

        store
            .insert_and_activate(version("1.0.0-rollback.x"), Some("1.0.0"))
            .await
            .unwrap();
        assert_eq!(store.active_count(&site()), 1);
        let active = store.active_version(&site()).await.unwrap().unwrap();
        assert_eq!(active.version, "1.0.0-rollback.x");

        let err = store
            .insert_and_activate(version("1.0.0-rollback.y"), Some("1.0.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ActiveChanged { .. }));
        assert_eq!(store.list_versions(&site()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn timestamps_are_set_once() {
        let store = MemoryStore::new();
        let record = record("1.0.0");
        let id = record.id;
        store.insert_update(record).await.unwrap();

        store.mark_applied(id, Utc::now()).await.unwrap();
        let err = store.mark_applied(id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadySet { field: "applied_at", .. }));

        store.mark_rolled_back(id, Utc::now()).await.unwrap();
        assert!(store.mark_rolled_back(id, Utc::now()).await.is_err());

        let stored = store.get_update(id).await.unwrap().unwrap();
        assert!(stored.applied_at.is_some());
        assert!(stored.rolled_back_at.is_some());
    }

    #[tokio::test]
    async fn updates_list_in_insertion_order() {
        let store = MemoryStore::new();
        let first = record("1.0.0");
        let second = record("1.1.0");
        let ids = [first.id, second.id];
        store.insert_update(first.clone()).await.unwrap();
        store.insert_update(second).await.unwrap();
        assert!(matches!(
            store.insert_update(first).await,
            Err(StoreError::DuplicateUpdate(_))
        ));

        let listed: Vec<_> = store
            .list_updates(&site())
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(listed, ids);
        assert!(store.list_updates(&SiteId::from("blog")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn approval_requires_known_update() {
        let store = MemoryStore::new();
        let orphan = ApprovalRecord::pending(UpdateId::new());
        assert!(store.put_approval(orphan).await.is_err());

        let record = record("1.0.0");
        let id = record.id;
        store.insert_update(record).await.unwrap();
        store.put_approval(ApprovalRecord::pending(id)).await.unwrap();
        store
            .put_approval(ApprovalRecord::approved(id, "bob"))
            .await
            .unwrap();
        let approval = store.get_approval(id).await.unwrap().unwrap();
        assert!(approval.is_decided());
    }
}
