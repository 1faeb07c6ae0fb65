//! siteconf Core
//!
//! Versioning for managed site configuration documents:
//! - Assigns semantic version labels to proposed documents
//! - Signs every update with HMAC-SHA256
//! - Gates activation on an external approval decision
//! - Activates through a single conditional store step
//! - Rolls back by appending, never by rewriting history
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use siteconf_core::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let signer = UpdateSigner::new(SigningKey::new("secret")?);
//! let pipeline = UpdatePipeline::new(Arc::new(MemoryStore::new()), signer);
//! let site = SiteId::from("shop");
//!
//! let update = pipeline
//!     .propose(&site, &json!({"theme": {"color": "red"}}), None, "alice")
//!     .await?;
//! pipeline.decide(update.id, ApprovalDecision::Approved, "bob").await?;
//!
//! assert_eq!(pipeline.active(&site).await?.map(|v| v.version), Some("1.0.0".into()));
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod rollback;
pub mod signing;
pub mod store;
pub mod version;
pub mod workflow;

pub use config::{ConfigError, PipelineConfig, DEFAULT_SIGNING_KEY_ENV};
pub use error::{Error, ErrorKind, Result};
pub use pipeline::UpdatePipeline;
pub use record::{
    ConfigVersion, SiteId, UpdateDraft, UpdateId, UpdatePayload, UpdateRecord, UpdateStatus,
};
pub use rollback::{RollbackManager, DEFAULT_ROLLBACK_TAG};
pub use signing::{SignedContent, SigningError, SigningKey, UpdateSigner};
pub use store::{MemoryStore, StoreError, VersionStore};
pub use version::{
    compare, compare_sign, increment, next_after, ChangeClass, UnknownChangeClass, Version,
    VersionOverflow,
};
pub use workflow::{
    ApprovalDecision, ApprovalRecord, ApprovalWorkflow, ValidationReport, WorkflowError,
};

pub use siteconf_document as document;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with siteconf core
    pub use crate::{
        ApprovalDecision, ApprovalWorkflow, ChangeClass, ConfigVersion, MemoryStore,
        PipelineConfig, SiteId, SigningKey, UpdateId, UpdatePipeline, UpdateRecord, UpdateSigner,
        UpdateStatus, VersionStore,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
