//! Testing utilities for the siteconf workspace
//!
//! Shared fixtures: sample site documents, a fixed test signer, seeded
//! pipelines and approval workflow doubles.

#![allow(missing_docs)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use siteconf_core::{
    ApprovalDecision, ApprovalWorkflow, MemoryStore, SiteId, SigningKey, UpdateId, UpdatePipeline,
    UpdateRecord, UpdateSigner, WorkflowError,
};

pub const TEST_SIGNING_KEY: &str = "siteconf-test-signing-key";

/// Signer over [`TEST_SIGNING_KEY`]
pub fn test_signer() -> UpdateSigner {
    UpdateSigner::new(SigningKey::new(TEST_SIGNING_KEY).unwrap())
}

/// Site used across lifecycle tests
pub fn test_site() -> SiteId {
    SiteId::from("acme-shop")
}

/// Current-shape site document
pub fn sample_site_document() -> Value {
    json!({
        "name": "Acme Shop",
        "theme": {"color": "red", "font": "serif"},
        "seo": {"title": "Acme", "description": "Everything for coyotes"},
        "maintenance": {"enabled": false, "message": null},
        "navigation": {"items": [
            {"label": "Home", "href": "/"},
            {"label": "Catalog", "href": "/catalog"}
        ]}
    })
}

/// Legacy-shape document that migrates to exactly [`sample_site_document`]
pub fn legacy_site_document() -> Value {
    json!({
        "name": "Acme Shop",
        "theme": {"color": "red", "font": "serif"},
        "seo_title": "Acme",
        "seo_description": "Everything for coyotes",
        "maintenance": false,
        "nav_links": [
            {"label": "Home", "href": "/"},
            {"label": "Catalog", "href": "/catalog"}
        ]
    })
}

/// Minimal document differing only in theme color
pub fn theme_document(color: &str) -> Value {
    json!({"theme": {"color": color}})
}

/// Empty pipeline over a fresh [`MemoryStore`]
pub fn memory_pipeline() -> UpdatePipeline<MemoryStore> {
    UpdatePipeline::new(Arc::new(MemoryStore::new()), test_signer())
}

/// Pipeline whose site already has `documents` applied in order
///
/// Each document is proposed as a minor change and approved, so the
/// resulting labels are `1.0.0`, `1.1.0`, `1.2.0`, ...
pub async fn seeded_pipeline(site: &SiteId, documents: &[Value]) -> UpdatePipeline<MemoryStore> {
    let pipeline = memory_pipeline();
    for document in documents {
        let record = pipeline.propose(site, document, None, "seed").await.unwrap();
        pipeline
            .decide(record.id, ApprovalDecision::Approved, "seed-approver")
            .await
            .unwrap();
    }
    pipeline
}

/// Workflow that records submitted update ids
#[derive(Debug, Default)]
pub struct RecordingWorkflow {
    submitted: Mutex<Vec<UpdateId>>,
}

impl RecordingWorkflow {
    /// Workflow with nothing submitted yet
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> Vec<UpdateId> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl ApprovalWorkflow for RecordingWorkflow {
    async fn submit(&self, record: &UpdateRecord) -> Result<(), WorkflowError> {
        self.submitted.lock().push(record.id);
        Ok(())
    }
}

/// Workflow that is always down
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableWorkflow;

#[async_trait]
impl ApprovalWorkflow for UnavailableWorkflow {
    async fn submit(&self, _record: &UpdateRecord) -> Result<(), WorkflowError> {
        Err(WorkflowError::Unavailable("review queue offline".to_string()))
    }
}

/// Copy of `signature` with its first hex digit changed
pub fn corrupt_signature(signature: &str) -> String {
    let mut chars: Vec<char> = signature.chars().collect();
    if let Some(first) = chars.first_mut() {
        *first = if *first == '0' { '1' } else { '0' };
    }
    chars.into_iter().collect()
}
