//! Subcommand implementations
//!
//! Each command reads its inputs, runs one library operation and returns
//! the JSON value to print.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use siteconf_core::{
    compare_sign, ChangeClass, PipelineConfig, SigningKey, UpdateDraft, UpdateRecord, UpdateSigner,
};
use siteconf_document::{apply_patch, diff_with, Change, DocumentFormat, MigrationAdapter};

/// Parse a JSON or YAML file, chosen by extension
pub(crate) fn read_document(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    DocumentFormat::from_path(path)
        .parse(&text)
        .with_context(|| format!("failed to parse {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let value = read_document(path)?;
    serde_json::from_value(value).with_context(|| format!("unexpected shape in {}", path.display()))
}

pub(crate) fn diff(config: &PipelineConfig, base: &Path, target: &Path) -> Result<Value> {
    let base = read_document(base)?;
    let target = read_document(target)?;
    let changes = diff_with(&base, &target, config.diff_options())?;
    tracing::debug!(changes = changes.len(), "computed diff");
    Ok(serde_json::to_value(changes)?)
}

pub(crate) fn patch(base: &Path, changes: &Path) -> Result<Value> {
    let base = read_document(base)?;
    let changes: Vec<Change> = read_json(changes)?;
    Ok(apply_patch(&base, &changes)?)
}

pub(crate) fn migrate(document: &Path, report: bool) -> Result<Value> {
    let document = read_document(document)?;
    let migrated = MigrationAdapter::new().migrate_report(&document);
    if report {
        Ok(json!({
            "document": migrated.document,
            "applied": migrated.applied,
        }))
    } else {
        Ok(migrated.document)
    }
}

pub(crate) fn bump(version: &str, class: ChangeClass) -> Result<Value> {
    Ok(Value::String(siteconf_core::increment(version, class)?))
}

pub(crate) fn compare(v1: &str, v2: &str) -> Value {
    json!(compare_sign(v1, v2))
}

pub(crate) fn signer(config: &PipelineConfig, key_env: Option<&str>) -> Result<UpdateSigner> {
    let var = key_env.unwrap_or(&config.signing_key_env);
    let key = SigningKey::from_env(var).context("cannot load signing key")?;
    Ok(UpdateSigner::new(key))
}

pub(crate) fn sign(signer: &UpdateSigner, draft: &Path) -> Result<Value> {
    let draft: UpdateDraft = read_json(draft)?;
    let record = draft.sign(signer)?;
    tracing::info!(update_id = %record.id, site = %record.site_id, "signed update");
    Ok(serde_json::to_value(record)?)
}

pub(crate) fn verify(signer: &UpdateSigner, update: &Path) -> Result<Value> {
    let record: UpdateRecord = read_json(update)?;
    signer
        .verify_record(&record)
        .with_context(|| format!("cannot verify update {}", record.id))?;
    Ok(json!({"update_id": record.id.to_string(), "valid": true}))
}
