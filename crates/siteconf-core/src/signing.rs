//! HMAC-SHA256 signing of update records
//!
//! The tagged bytes are the canonical encoding (sorted keys, compact JSON)
//! of [`SignedContent`]: site, both version labels, the payload and the
//! signing timestamp. `signed_at` is stored on the record, so verification
//! rebuilds exactly the bytes that were signed.
//!
//! # Security Properties
//!
//! - The key lives in a `SecretString` and never appears in `Debug` output
//! - Tags are compared with `subtle` in constant time
//! - Malformed hex is reported as a mismatch, never as a panic

use std::fmt;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha256;
use siteconf_document::canonical_bytes;
use subtle::ConstantTimeEq;

use crate::record::{SiteId, UpdatePayload, UpdateRecord};

type HmacSha256 = Hmac<Sha256>;

/// Shared secret used to tag update records
#[derive(Clone)]
pub struct SigningKey(SecretString);

impl SigningKey {
    /// Wrap a secret
    ///
    /// # Errors
    /// Returns [`SigningError::EmptyKey`] for an empty secret
    pub fn new(secret: impl Into<String>) -> Result<Self, SigningError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(SigningError::EmptyKey);
        }
        Ok(Self(SecretString::from(secret)))
    }

    /// Read the secret from an environment variable
    ///
    /// # Errors
    /// Returns error if the variable is unset, not unicode, or empty
    pub fn from_env(var: &str) -> Result<Self, SigningError> {
        let secret = std::env::var(var).map_err(|_| SigningError::MissingKey {
            var: var.to_string(),
        })?;
        Self::new(secret)
    }

    fn expose(&self) -> &[u8] {
        self.0.expose_secret().as_bytes()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey([REDACTED])")
    }
}

impl From<SecretString> for SigningKey {
    fn from(secret: SecretString) -> Self {
        Self(secret)
    }
}

/// Exactly what a signature covers
#[derive(Debug, Clone, Serialize)]
pub struct SignedContent<'a> {
    pub site_id: &'a SiteId,
    pub from_version: Option<&'a str>,
    pub to_version: &'a str,
    pub payload: &'a UpdatePayload,
    pub signed_at: DateTime<Utc>,
}

impl<'a> SignedContent<'a> {
    /// Signed fields of a stored record
    #[must_use]
    pub fn of(record: &'a UpdateRecord) -> Self {
        Self {
            site_id: &record.site_id,
            from_version: record.from_version.as_deref(),
            to_version: &record.to_version,
            payload: &record.payload,
            signed_at: record.signed_at,
        }
    }

    /// Canonical bytes fed to the MAC
    ///
    /// # Errors
    /// Returns error if the payload cannot be encoded as JSON
    pub fn to_bytes(&self) -> Result<Vec<u8>, SigningError> {
        let value = serde_json::to_value(self).map_err(SigningError::Encoding)?;
        Ok(canonical_bytes(&value))
    }
}

/// Signs and verifies update records with one [`SigningKey`]
#[derive(Debug, Clone)]
pub struct UpdateSigner {
    key: SigningKey,
}

impl UpdateSigner {
    /// Signer bound to `key`
    #[must_use]
    pub const fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Lowercase hex tag over `content`
    ///
    /// # Errors
    /// Returns error if the content cannot be encoded
    pub fn sign(&self, content: &SignedContent<'_>) -> Result<String, SigningError> {
        let tag = self.tag(&content.to_bytes()?)?;
        Ok(hex::encode(tag))
    }

    /// Tag a record's stored fields
    ///
    /// # Errors
    /// Returns error if the content cannot be encoded
    pub fn sign_record(&self, record: &UpdateRecord) -> Result<String, SigningError> {
        self.sign(&SignedContent::of(record))
    }

    /// Check `signature` against `content`
    ///
    /// # Errors
    /// Returns [`SigningError::SignatureMismatch`] when the tag differs or is
    /// not valid hex
    pub fn verify(&self, content: &SignedContent<'_>, signature: &str) -> Result<(), SigningError> {
        self.verify_bytes(&content.to_bytes()?, signature)
    }

    /// Check a stored record's own signature
    ///
    /// # Errors
    /// Returns [`SigningError::SignatureMismatch`] on any tampering
    pub fn verify_record(&self, record: &UpdateRecord) -> Result<(), SigningError> {
        self.verify(&SignedContent::of(record), &record.signature)
            .map_err(|err| {
                tracing::warn!(
                    update_id = %record.id,
                    site = %record.site_id,
                    "update signature verification failed"
                );
                err
            })
    }

    /// [`Self::verify`] as a boolean
    #[must_use]
    pub fn is_valid(&self, content: &SignedContent<'_>, signature: &str) -> bool {
        self.verify(content, signature).is_ok()
    }

    /// Check a hex tag over raw bytes
    ///
    /// # Errors
    /// Returns [`SigningError::SignatureMismatch`] when the tag differs
    pub fn verify_bytes(&self, payload: &[u8], signature: &str) -> Result<(), SigningError> {
        let expected = hex::decode(signature).map_err(|_| SigningError::SignatureMismatch)?;
        let computed = self.tag(payload)?;

        if computed.ct_eq(&expected).into() {
            Ok(())
        } else {
            Err(SigningError::SignatureMismatch)
        }
    }

    fn tag(&self, payload: &[u8]) -> Result<Vec<u8>, SigningError> {
        let mut mac =
            HmacSha256::new_from_slice(self.key.expose()).map_err(|_| SigningError::InvalidKey)?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Signing failures
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("signing key is empty")]
    EmptyKey,

    #[error("signing key not set (expected environment variable {var})")]
    MissingKey { var: String },

    #[error("signing key rejected by MAC")]
    InvalidKey,

    #[error("failed to encode signed content: {0}")]
    Encoding(#[source] serde_json::Error),

    #[error("signature mismatch")]
    SignatureMismatch,
}
