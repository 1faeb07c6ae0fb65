//! Update pipeline
//!
//! Wires the document engine, sequencer, signer and store together:
//!
//! 1. [`UpdatePipeline::propose`]: migrate the candidate, diff it against
//!    the active document, assign the next label, sign, persist inactive
//! 2. [`UpdatePipeline::submit`]: hand the update to the approval workflow
//! 3. [`UpdatePipeline::decide`]: record the decision; on approval verify the
//!    signature and replayed content, then activate atomically
//! 4. [`UpdatePipeline::rollback`]: revert to a historical version

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use siteconf_document::{apply_patch, diff_with, Change, ContentHash, MigrationAdapter};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::record::{
    ConfigVersion, SiteId, UpdateDraft, UpdateId, UpdatePayload, UpdateRecord, UpdateStatus,
};
use crate::rollback::RollbackManager;
use crate::signing::UpdateSigner;
use crate::store::VersionStore;
use crate::version::{next_after, ChangeClass, Version};
use crate::workflow::{ApprovalDecision, ApprovalRecord, ApprovalWorkflow};

/// Versioning front door for one store and one signing key
#[derive(Debug)]
pub struct UpdatePipeline<S: ?Sized> {
    store: Arc<S>,
    signer: Arc<UpdateSigner>,
    migration: MigrationAdapter,
    config: PipelineConfig,
    rollback: RollbackManager<S>,
}

impl<S: VersionStore + ?Sized> UpdatePipeline<S> {
    /// Pipeline with default configuration and the built-in migration rules
    #[must_use]
    pub fn new(store: Arc<S>, signer: UpdateSigner) -> Self {
        let signer = Arc::new(signer);
        let config = PipelineConfig::default();
        let rollback = RollbackManager::new(Arc::clone(&store), Arc::clone(&signer))
            .with_rollback_tag(config.rollback_tag.clone());
        Self {
            store,
            signer,
            migration: MigrationAdapter::new(),
            config,
            rollback,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.rollback = self.rollback.with_rollback_tag(config.rollback_tag.clone());
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_migration(mut self, migration: MigrationAdapter) -> Self {
        self.migration = migration;
        self
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    #[inline]
    #[must_use]
    pub fn signer(&self) -> &UpdateSigner {
        &self.signer
    }

    /// Record `document` as the next inactive version of `site`
    ///
    /// The document is migrated first. `class` falls back to the configured
    /// default.
    ///
    /// # Errors
    /// - [`Error::NoChanges`] if the document equals the active one
    /// - [`Error::DiffComputation`] if the document is too deep
    /// - [`Error::Version`] if the next label would overflow
    /// - [`Error::Conflict`] if a concurrent proposal took the label
    pub async fn propose(
        &self,
        site: &SiteId,
        document: &Value,
        class: Option<ChangeClass>,
        actor: &str,
    ) -> Result<UpdateRecord> {
        let class = class.unwrap_or(self.config.default_change_class);
        let report = self.migration.migrate_report(document);
        if report.changed() {
            tracing::debug!(site = %site, rules = ?report.applied, "migrated legacy document");
        }
        let candidate = report.document;

        let active = self.store.active_version(site).await?;
        let base = diff_base(active.as_ref());

        let changes = diff_with(&base, &candidate, self.config.diff_options())?;
        if changes.is_empty() && !self.config.allow_empty_updates {
            return Err(Error::NoChanges(site.clone()));
        }

        let history = self.store.list_versions(site).await?;
        let next = next_after(history.iter().map(|v| v.version.as_str()), class)?
            .unwrap_or_else(|| Version::parse(&self.config.initial_version))
            .to_string();

        let record = UpdateDraft::new(
            site.clone(),
            active.map(|v| v.version),
            next.clone(),
            UpdatePayload::Changes { changes },
            actor,
        )
        .sign(&self.signer)?;

        self.store
            .insert_version(ConfigVersion::new(site.clone(), next, candidate, actor))
            .await?;
        self.store.insert_update(record.clone()).await?;

        let summary = record.payload.summary();
        tracing::info!(
            site = %site,
            update_id = %record.id,
            from = ?record.from_version,
            to = %record.to_version,
            added = summary.added,
            removed = summary.removed,
            replaced = summary.replaced,
            "proposed update"
        );
        Ok(record)
    }

    /// Hand a proposed update to the approval workflow
    ///
    /// # Errors
    /// - [`Error::NotFound`] for an unknown update
    /// - [`Error::Conflict`] if the update is already decided or applied
    /// - [`Error::Workflow`] if the workflow refuses it
    pub async fn submit(&self, id: UpdateId, workflow: &dyn ApprovalWorkflow) -> Result<UpdateStatus> {
        let record = self.update(id).await?;
        let approval = self.store.get_approval(id).await?;
        let status = record.status(approval.as_ref());
        if status != UpdateStatus::Proposed {
            return Err(Error::Conflict(format!("update {id} is {status}, not proposed")));
        }

        workflow.submit(&record).await?;
        self.store.put_approval(ApprovalRecord::pending(id)).await?;
        tracing::info!(site = %record.site_id, update_id = %id, "submitted for approval");
        Ok(UpdateStatus::PendingApproval)
    }

    /// Apply the approval workflow's decision
    ///
    /// On approval the signature is verified, the change list is replayed
    /// onto the expected base and checked against the stored target, and the
    /// target becomes active only if the active label is still the update's
    /// `from_version`. The approval is stored only once activation succeeds;
    /// an update whose `from_version` is no longer active keeps its previous
    /// status and has to be proposed again.
    ///
    /// # Errors
    /// - [`Error::SignatureMismatch`] if the record was tampered with
    /// - [`Error::DocumentMismatch`] if replaying does not reproduce the target
    /// - [`Error::Conflict`] if already decided or applied, or the active
    ///   version moved
    pub async fn decide(
        &self,
        id: UpdateId,
        decision: ApprovalDecision,
        decided_by: &str,
    ) -> Result<UpdateStatus> {
        let record = self.update(id).await?;
        let approval = self.store.get_approval(id).await?;
        let status = record.status(approval.as_ref());
        if matches!(
            status,
            UpdateStatus::Applied | UpdateStatus::Rejected | UpdateStatus::RolledBack
        ) {
            return Err(Error::Conflict(format!("update {id} is already {status}")));
        }

        match decision {
            ApprovalDecision::Pending => {
                self.store.put_approval(ApprovalRecord::pending(id)).await?;
                Ok(UpdateStatus::PendingApproval)
            }
            ApprovalDecision::Rejected { reason } => {
                tracing::info!(site = %record.site_id, update_id = %id, %reason, "update rejected");
                self.store
                    .put_approval(ApprovalRecord::rejected(id, decided_by, reason))
                    .await?;
                Ok(UpdateStatus::Rejected)
            }
            ApprovalDecision::Approved => {
                self.signer
                    .verify_record(&record)
                    .map_err(|err| Error::from(err).for_update(id))?;
                self.check_replay(&record).await?;

                self.store
                    .transition_active(&record.site_id, record.from_version.as_deref(), &record.to_version)
                    .await?;
                self.store
                    .put_approval(ApprovalRecord::approved(id, decided_by))
                    .await?;
                self.store.mark_applied(id, Utc::now()).await?;

                tracing::info!(
                    site = %record.site_id,
                    update_id = %id,
                    version = %record.to_version,
                    "update applied"
                );
                Ok(UpdateStatus::Applied)
            }
        }
    }

    /// Patch the expected base with the record's changes and compare the
    /// result against the stored target's hash
    async fn check_replay(&self, record: &UpdateRecord) -> Result<()> {
        let site = &record.site_id;
        let target = self
            .store
            .get_version(site, &record.to_version)
            .await?
            .ok_or_else(|| Error::not_found("version", format!("{site}@{}", record.to_version)))?;

        let base = match &record.from_version {
            Some(label) => {
                let row = self
                    .store
                    .get_version(site, label)
                    .await?
                    .ok_or_else(|| Error::not_found("version", format!("{site}@{label}")))?;
                diff_base(Some(&row))
            }
            None => diff_base(None),
        };
        let replayed = apply_patch(&base, record.payload.changes())?;

        match target.content_hash {
            Some(hash) if hash == ContentHash::of_document(&replayed) => Ok(()),
            _ => {
                tracing::warn!(
                    site = %site,
                    update_id = %record.id,
                    version = %record.to_version,
                    "replayed document does not match stored target"
                );
                Err(Error::DocumentMismatch {
                    site: site.clone(),
                    version: record.to_version.clone(),
                })
            }
        }
    }

    /// Revert `site` to `target`; see [`RollbackManager::rollback`]
    ///
    /// # Errors
    /// Same as [`RollbackManager::rollback`]
    pub async fn rollback(&self, site: &SiteId, target: &str, actor: &str) -> Result<UpdateRecord> {
        self.rollback.rollback(site, target, actor).await
    }

    /// The site's active version
    ///
    /// # Errors
    /// Returns error if the store fails
    pub async fn active(&self, site: &SiteId) -> Result<Option<ConfigVersion>> {
        Ok(self.store.active_version(site).await?)
    }

    /// Every version of the site, oldest first
    ///
    /// # Errors
    /// Returns error if the store fails
    pub async fn history(&self, site: &SiteId) -> Result<Vec<ConfigVersion>> {
        Ok(self.store.list_versions(site).await?)
    }

    /// Every update of the site, oldest first
    ///
    /// # Errors
    /// Returns error if the store fails
    pub async fn updates(&self, site: &SiteId) -> Result<Vec<UpdateRecord>> {
        Ok(self.store.list_updates(site).await?)
    }

    /// One update
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown id
    pub async fn update(&self, id: UpdateId) -> Result<UpdateRecord> {
        self.store
            .get_update(id)
            .await?
            .ok_or_else(|| Error::not_found("update", id))
    }

    /// Lifecycle state of one update
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown id
    pub async fn status(&self, id: UpdateId) -> Result<UpdateStatus> {
        let record = self.update(id).await?;
        let approval = self.store.get_approval(id).await?;
        Ok(record.status(approval.as_ref()))
    }

    /// Check a stored update's signature
    ///
    /// # Errors
    /// Returns [`Error::SignatureMismatch`] if it does not verify
    pub async fn verify_update(&self, id: UpdateId) -> Result<()> {
        let record = self.update(id).await?;
        self.signer
            .verify_record(&record)
            .map_err(|err| Error::from(err).for_update(id))
    }

    /// Apply `changes` to the active document without persisting anything
    ///
    /// # Errors
    /// Returns [`Error::PathNotFound`] if a change does not fit the document
    pub async fn preview(&self, site: &SiteId, changes: &[Change]) -> Result<Value> {
        let active = self.store.active_version(site).await?;
        let base = diff_base(active.as_ref());
        Ok(apply_patch(&base, changes)?)
    }

    /// Document stored under `version`
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the version or its content is missing
    pub async fn document_at(&self, site: &SiteId, version: &str) -> Result<Value> {
        let row = self
            .store
            .get_version(site, version)
            .await?
            .ok_or_else(|| Error::not_found("version", format!("{site}@{version}")))?;
        content_of(row)
    }
}

/// Document a change list is computed against
///
/// A new site starts from `{}`; an active row without stored content (a
/// reactivated import) counts as `null`, so the next diff replaces the root.
fn diff_base(version: Option<&ConfigVersion>) -> Value {
    match version {
        Some(version) => version.document.clone().unwrap_or(Value::Null),
        None => Value::Object(Map::new()),
    }
}

fn content_of(version: ConfigVersion) -> Result<Value> {
    let ConfigVersion {
        site_id,
        version,
        document,
        ..
    } = version;
    document.ok_or_else(|| Error::not_found("document", format!("{site_id}@{version}")))
}
