//! End-to-end update lifecycle against the in-memory store
//!
//! Propose → submit → decide → apply, rollback, and the failure paths that
//! must leave activation untouched.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use siteconf_core::{
    ApprovalDecision, ChangeClass, ConfigVersion, Error, ErrorKind, MemoryStore, SiteId, UpdateId,
    UpdatePayload, UpdateStatus, VersionStore,
};
use siteconf_document::ChangeOp;
use siteconf_test_utils::{
    corrupt_signature, legacy_site_document, memory_pipeline, sample_site_document,
    seeded_pipeline, test_site, theme_document, RecordingWorkflow, UnavailableWorkflow,
};

#[tokio::test]
async fn proposal_then_approval_activates_next_minor() {
    let site = test_site();
    let pipeline = seeded_pipeline(&site, &[theme_document("red")]).await;

    let record = pipeline
        .propose(&site, &theme_document("blue"), Some(ChangeClass::Minor), "alice")
        .await
        .unwrap();
    assert_eq!(record.from_version.as_deref(), Some("1.0.0"));
    assert_eq!(record.to_version, "1.1.0");

    let changes = record.payload.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].op, ChangeOp::Replace);
    assert_eq!(changes[0].path.to_string(), "/theme/color");
    assert_eq!(changes[0].old_value, Some(json!("red")));
    assert_eq!(changes[0].value, Some(json!("blue")));

    // Proposal alone does not activate
    let active = pipeline.active(&site).await.unwrap().unwrap();
    assert_eq!(active.version, "1.0.0");

    let workflow = RecordingWorkflow::new();
    let status = pipeline.submit(record.id, &workflow).await.unwrap();
    assert_eq!(status, UpdateStatus::PendingApproval);
    assert_eq!(workflow.submitted(), vec![record.id]);
    assert_eq!(pipeline.status(record.id).await.unwrap(), UpdateStatus::PendingApproval);

    let status = pipeline
        .decide(record.id, ApprovalDecision::Approved, "bob")
        .await
        .unwrap();
    assert_eq!(status, UpdateStatus::Applied);

    let active = pipeline.active(&site).await.unwrap().unwrap();
    assert_eq!(active.version, "1.1.0");
    assert_eq!(active.document, Some(theme_document("blue")));

    let stored = pipeline.update(record.id).await.unwrap();
    assert!(stored.applied_at.is_some());
    assert!(stored.rolled_back_at.is_none());
}

#[tokio::test]
async fn change_class_drives_label() {
    let site = test_site();
    let pipeline = seeded_pipeline(&site, &[theme_document("red")]).await;

    let major = pipeline
        .propose(&site, &theme_document("blue"), Some(ChangeClass::Major), "alice")
        .await
        .unwrap();
    assert_eq!(major.to_version, "2.0.0");

    let patch = pipeline
        .propose(&site, &theme_document("green"), Some(ChangeClass::Patch), "alice")
        .await
        .unwrap();
    // Next label follows the highest label in history, not the active one
    assert_eq!(patch.to_version, "2.0.1");
    assert_eq!(patch.from_version.as_deref(), Some("1.0.0"));
}

#[tokio::test]
async fn rollback_restores_historical_document() {
    let site = test_site();
    let colors = ["red", "orange", "yellow", "green", "blue"];
    let documents: Vec<_> = colors.iter().map(|c| theme_document(c)).collect();
    let pipeline = seeded_pipeline(&site, &documents).await;

    let active = pipeline.active(&site).await.unwrap().unwrap();
    assert_eq!(active.version, "1.4.0");

    let record = pipeline.rollback(&site, "1.2.0", "ops").await.unwrap();
    assert_eq!(record.from_version.as_deref(), Some("1.4.0"));
    assert_eq!(
        record.payload,
        UpdatePayload::Rollback {
            restored_from: "1.2.0".to_string()
        }
    );
    assert_eq!(pipeline.status(record.id).await.unwrap(), UpdateStatus::Applied);
    pipeline.verify_update(record.id).await.unwrap();

    let active = pipeline.active(&site).await.unwrap().unwrap();
    assert_eq!(active.version, record.to_version);
    assert_eq!(
        active.document,
        Some(pipeline.document_at(&site, "1.2.0").await.unwrap())
    );

    let history = pipeline.history(&site).await.unwrap();
    assert_eq!(history.len(), 6);
    let old = history.iter().find(|v| v.version == "1.4.0").unwrap();
    assert!(!old.active);
    assert_eq!(history.iter().filter(|v| v.active).count(), 1);

    // The update that applied 1.4.0 now reports rolled back
    let updates = pipeline.updates(&site).await.unwrap();
    let superseded = updates.iter().find(|u| u.to_version == "1.4.0").unwrap();
    assert!(superseded.rolled_back_at.is_some());
    assert_eq!(
        pipeline.status(superseded.id).await.unwrap(),
        UpdateStatus::RolledBack
    );
}

#[tokio::test]
async fn proposal_after_rollback_diffs_against_restored_content() {
    let site = test_site();
    let documents = [theme_document("red"), theme_document("blue")];
    let pipeline = seeded_pipeline(&site, &documents).await;
    pipeline.rollback(&site, "1.0.0", "ops").await.unwrap();

    let record = pipeline
        .propose(&site, &theme_document("green"), None, "alice")
        .await
        .unwrap();
    assert_eq!(record.payload.changes()[0].old_value, Some(json!("red")));
    assert_eq!(record.to_version, "1.2.0");
}

#[tokio::test]
async fn proposal_after_contentless_rollback_replaces_root() {
    let site = test_site();
    let pipeline = seeded_pipeline(&site, &[theme_document("red")]).await;
    pipeline
        .store()
        .insert_version(ConfigVersion::without_content(site.clone(), "0.9.0", "import"))
        .await
        .unwrap();

    let rollback = pipeline.rollback(&site, "0.9.0", "ops").await.unwrap();
    assert_eq!(rollback.to_version, "0.9.0");

    let record = pipeline
        .propose(&site, &theme_document("green"), None, "alice")
        .await
        .unwrap();
    assert_eq!(record.from_version.as_deref(), Some("0.9.0"));
    assert_eq!(record.to_version, "1.1.0");
    let changes = record.payload.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].op, ChangeOp::Replace);
    assert!(changes[0].path.is_empty());

    let status = pipeline
        .decide(record.id, ApprovalDecision::Approved, "bob")
        .await
        .unwrap();
    assert_eq!(status, UpdateStatus::Applied);
    let active = pipeline.active(&site).await.unwrap().unwrap();
    assert_eq!(active.version, "1.1.0");
    assert_eq!(active.document, Some(theme_document("green")));
}

#[tokio::test]
async fn rollback_to_unknown_version_is_not_found() {
    let site = test_site();
    let pipeline = seeded_pipeline(&site, &[theme_document("red")]).await;
    let err = pipeline.rollback(&site, "7.0.0", "ops").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(pipeline.history(&site).await.unwrap().len(), 1);
}

#[tokio::test]
async fn tampered_change_list_is_refused() {
    let site = test_site();
    let pipeline = seeded_pipeline(&site, &[theme_document("red")]).await;
    let record = pipeline
        .propose(&site, &theme_document("blue"), None, "alice")
        .await
        .unwrap();

    let mut forged = record.clone();
    forged.id = UpdateId::new();
    if let UpdatePayload::Changes { changes } = &mut forged.payload {
        changes[0].value = Some(json!("black"));
    }
    assert!(pipeline.signer().verify_record(&forged).is_err());

    pipeline.store().insert_update(forged.clone()).await.unwrap();
    let err = pipeline
        .decide(forged.id, ApprovalDecision::Approved, "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SignatureMismatch { update_id: Some(id) } if id == forged.id));

    let active = pipeline.active(&site).await.unwrap().unwrap();
    assert_eq!(active.version, "1.0.0");
    assert!(pipeline.update(forged.id).await.unwrap().applied_at.is_none());
}

#[tokio::test]
async fn corrupted_signature_is_refused() {
    let site = test_site();
    let pipeline = memory_pipeline();
    let record = pipeline
        .propose(&site, &sample_site_document(), None, "alice")
        .await
        .unwrap();

    let mut forged = record.clone();
    forged.id = UpdateId::new();
    forged.signature = corrupt_signature(&record.signature);
    pipeline.store().insert_update(forged.clone()).await.unwrap();

    let err = pipeline.verify_update(forged.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureMismatch);
    assert!(pipeline.verify_update(record.id).await.is_ok());
}

#[tokio::test]
async fn drifted_target_document_is_refused() {
    let site = test_site();
    let pipeline = seeded_pipeline(&site, &[theme_document("red")]).await;
    let record = pipeline
        .propose(&site, &theme_document("blue"), None, "alice")
        .await
        .unwrap();

    // A correctly signed update whose changes do not reproduce 1.1.0
    let store = Arc::clone(pipeline.store());
    let draft = siteconf_core::UpdateDraft::new(
        site.clone(),
        Some("1.0.0".to_string()),
        "1.1.0",
        UpdatePayload::Changes { changes: vec![] },
        "mallory",
    );
    let bogus = draft.sign(pipeline.signer()).unwrap();
    store.insert_update(bogus.clone()).await.unwrap();

    let err = pipeline
        .decide(bogus.id, ApprovalDecision::Approved, "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DocumentMismatch { .. }));
    assert_eq!(pipeline.active(&site).await.unwrap().unwrap().version, "1.0.0");

    // The genuine update still applies
    pipeline
        .decide(record.id, ApprovalDecision::Approved, "bob")
        .await
        .unwrap();
    assert_eq!(pipeline.active(&site).await.unwrap().unwrap().version, "1.1.0");
}

#[tokio::test]
async fn stale_update_conflicts_after_another_applies() {
    let site = test_site();
    let pipeline = seeded_pipeline(&site, &[theme_document("red")]).await;

    let first = pipeline
        .propose(&site, &theme_document("blue"), None, "alice")
        .await
        .unwrap();
    let second = pipeline
        .propose(&site, &theme_document("green"), None, "carol")
        .await
        .unwrap();
    assert_eq!(first.to_version, "1.1.0");
    assert_eq!(second.to_version, "1.2.0");

    pipeline
        .decide(first.id, ApprovalDecision::Approved, "bob")
        .await
        .unwrap();
    let err = pipeline
        .decide(second.id, ApprovalDecision::Approved, "bob")
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(pipeline.active(&site).await.unwrap().unwrap().version, "1.1.0");
    // The failed approval is not recorded; the stale update stays proposed
    assert_eq!(pipeline.status(second.id).await.unwrap(), UpdateStatus::Proposed);

    let err = pipeline
        .decide(first.id, ApprovalDecision::Approved, "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn rejection_leaves_everything_inactive() {
    let site = test_site();
    let pipeline = memory_pipeline();
    let record = pipeline
        .propose(&site, &sample_site_document(), None, "alice")
        .await
        .unwrap();
    let status = pipeline
        .decide(
            record.id,
            ApprovalDecision::Rejected {
                reason: "copy review pending".into(),
            },
            "bob",
        )
        .await
        .unwrap();
    assert_eq!(status, UpdateStatus::Rejected);
    assert!(pipeline.active(&site).await.unwrap().is_none());

    let workflow = RecordingWorkflow::new();
    assert!(pipeline.submit(record.id, &workflow).await.is_err());
    assert!(workflow.submitted().is_empty());
}

#[tokio::test]
async fn unavailable_workflow_keeps_update_proposed() {
    let site = test_site();
    let pipeline = memory_pipeline();
    let record = pipeline
        .propose(&site, &sample_site_document(), None, "alice")
        .await
        .unwrap();
    let err = pipeline.submit(record.id, &UnavailableWorkflow).await.unwrap_err();
    assert!(matches!(err, Error::Workflow(_)));
    assert_eq!(pipeline.status(record.id).await.unwrap(), UpdateStatus::Proposed);
}

#[tokio::test]
async fn legacy_documents_are_migrated_before_diffing() {
    let site = test_site();
    let pipeline = seeded_pipeline(&site, &[sample_site_document()]).await;
    let err = pipeline
        .propose(&site, &legacy_site_document(), None, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoChanges(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rollbacks_keep_one_active_version() {
    let site = test_site();
    let documents: Vec<_> = ["red", "green", "blue"].iter().map(|c| theme_document(c)).collect();
    let pipeline = Arc::new(seeded_pipeline(&site, &documents).await);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let pipeline = Arc::clone(&pipeline);
        let site = site.clone();
        let target = ["1.0.0", "1.1.0"][i % 2];
        tasks.push(tokio::spawn(async move {
            pipeline.rollback(&site, target, "ops").await
        }));
    }

    let mut applied = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => applied += 1,
            Err(err) => assert!(err.is_retryable(), "unexpected error: {err}"),
        }
    }
    assert!(applied >= 1);

    let store: &MemoryStore = pipeline.store();
    assert_eq!(store.active_count(&site), 1);
    let rollbacks = pipeline
        .updates(&site)
        .await
        .unwrap()
        .into_iter()
        .filter(|u| u.is_rollback())
        .count();
    assert_eq!(rollbacks, applied);
}

#[tokio::test]
async fn sites_are_independent() {
    let shop = test_site();
    let blog = SiteId::from("acme-blog");
    let pipeline = seeded_pipeline(&shop, &[theme_document("red")]).await;

    let record = pipeline
        .propose(&blog, &theme_document("red"), None, "alice")
        .await
        .unwrap();
    assert_eq!(record.to_version, "1.0.0");
    assert_eq!(record.from_version, None);
    assert!(pipeline.active(&blog).await.unwrap().is_none());
    assert_eq!(pipeline.active(&shop).await.unwrap().unwrap().version, "1.0.0");
}
