//! Rollback to a historical version
//!
//! A rollback never rewrites history. It appends a copy of the target's
//! document under a derived label (`<major.minor.patch>-<tag>.<ulid>`),
//! activates the copy in one conditional store step, and appends a signed
//! rollback record that is applied on creation. The record that had applied
//! the replaced version is marked `rolled_back_at`.
//!
//! When the target's document is unavailable the historical row itself is
//! reactivated instead of copied.
//!
//! Activation is the commit point. Failures while recording the rollback
//! afterwards are logged and the record is still returned, so a caller never
//! retries a rollback that already took effect.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::record::{ConfigVersion, SiteId, UpdateDraft, UpdatePayload, UpdateRecord};
use crate::signing::UpdateSigner;
use crate::store::VersionStore;
use crate::version::Version;

/// Default tag prefix of rollback labels
pub const DEFAULT_ROLLBACK_TAG: &str = "rollback";

/// Reverts a site's active version
#[derive(Debug)]
pub struct RollbackManager<S: ?Sized> {
    store: Arc<S>,
    signer: Arc<UpdateSigner>,
    rollback_tag: String,
}

impl<S: ?Sized> Clone for RollbackManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            signer: Arc::clone(&self.signer),
            rollback_tag: self.rollback_tag.clone(),
        }
    }
}

impl<S: VersionStore + ?Sized> RollbackManager<S> {
    /// Manager over `store` using the default rollback tag
    #[must_use]
    pub fn new(store: Arc<S>, signer: Arc<UpdateSigner>) -> Self {
        Self {
            store,
            signer,
            rollback_tag: DEFAULT_ROLLBACK_TAG.to_string(),
        }
    }

    #[must_use]
    pub fn with_rollback_tag(mut self, tag: impl Into<String>) -> Self {
        self.rollback_tag = tag.into();
        self
    }

    /// Label for a fresh copy of `target`
    #[must_use]
    pub fn rollback_label(&self, target: &str) -> String {
        let numbers = Version::parse(target);
        Version::new(numbers.major, numbers.minor, numbers.patch)
            .with_tag(format!("{}.{}", self.rollback_tag, Ulid::new()))
            .to_string()
    }

    /// Make `target` the active content of `site`
    ///
    /// # Errors
    /// - [`Error::NotFound`] if `target` does not exist
    /// - [`Error::Conflict`] if the site has no active version, or the
    ///   active version changed while rolling back
    ///
    /// Nothing after activation produces an error.
    pub async fn rollback(&self, site: &SiteId, target: &str, actor: &str) -> Result<UpdateRecord> {
        let target_row = self
            .store
            .get_version(site, target)
            .await?
            .ok_or_else(|| Error::not_found("version", format!("{site}@{target}")))?;

        let prior = self
            .store
            .active_version(site)
            .await?
            .ok_or_else(|| Error::Conflict(format!("site {site} has no active version")))?;

        let copy = target_row
            .document
            .map(|document| ConfigVersion::new(site.clone(), self.rollback_label(target), document, actor));
        let to_version = copy
            .as_ref()
            .map_or_else(|| target.to_string(), |v| v.version.clone());

        let mut record = UpdateDraft::new(
            site.clone(),
            Some(prior.version.clone()),
            to_version.clone(),
            UpdatePayload::Rollback {
                restored_from: target.to_string(),
            },
            actor,
        )
        .sign(&self.signer)?;

        match copy {
            Some(copy) => {
                self.store
                    .insert_and_activate(copy, Some(&prior.version))
                    .await?;
            }
            None => {
                tracing::debug!(site = %site, version = target, "target content unavailable, reactivating row");
                self.store
                    .transition_active(site, Some(&prior.version), target)
                    .await?;
            }
        }

        let now = Utc::now();
        record.applied_at = Some(now);
        if let Err(err) = self.record_applied(&record, &prior.version, now).await {
            tracing::error!(
                site = %site,
                update_id = %record.id,
                version = %to_version,
                error = %err,
                "rollback is active but its record was not fully stored"
            );
        }

        tracing::info!(
            site = %site,
            from = %prior.version,
            to = %to_version,
            restored_from = target,
            update_id = %record.id,
            "rolled back"
        );
        Ok(record)
    }

    /// Store the applied rollback record and mark the update it supersedes
    async fn record_applied(
        &self,
        record: &UpdateRecord,
        replaced: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.store.insert_update(record.clone()).await?;

        let superseded = self
            .store
            .list_updates(&record.site_id)
            .await?
            .into_iter()
            .rev()
            .find(|u| {
                u.id != record.id
                    && u.to_version == replaced
                    && u.applied_at.is_some()
                    && u.rolled_back_at.is_none()
            });
        if let Some(superseded) = superseded {
            self.store.mark_rolled_back(superseded.id, at).await?;
        }
        Ok(())
    }
}
