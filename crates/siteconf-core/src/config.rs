//! Pipeline configuration
//!
//! Loaded from TOML or built in code:
//!
//! ```toml
//! initial_version = "1.0.0"
//! default_change_class = "minor"
//! allow_empty_updates = false
//! rollback_tag = "rollback"
//! signing_key_env = "SITECONF_SIGNING_KEY"
//! max_diff_depth = 256
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use siteconf_document::DiffOptions;

use crate::signing::{SigningError, SigningKey};
use crate::version::{ChangeClass, Version};

/// Environment variable holding the signing secret unless configured otherwise
pub const DEFAULT_SIGNING_KEY_ENV: &str = "SITECONF_SIGNING_KEY";

/// Update pipeline settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Label given to a site's first version
    pub initial_version: String,
    /// Change class used when a proposal does not name one
    pub default_change_class: ChangeClass,
    /// Accept proposals whose document equals the active one
    pub allow_empty_updates: bool,
    /// Tag prefix of rollback labels (`1.2.0-<tag>.<ulid>`)
    pub rollback_tag: String,
    /// Environment variable the signing secret is read from
    pub signing_key_env: String,
    /// Reject documents nested deeper than this
    pub max_diff_depth: Option<usize>,
}

impl PipelineConfig {
    /// Default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// Returns error on malformed TOML, unknown keys, or invalid values
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    #[must_use]
    pub fn with_initial_version(mut self, version: impl Into<String>) -> Self {
        self.initial_version = version.into();
        self
    }

    #[must_use]
    pub fn with_default_change_class(mut self, class: ChangeClass) -> Self {
        self.default_change_class = class;
        self
    }

    #[must_use]
    pub fn with_allow_empty_updates(mut self, allow: bool) -> Self {
        self.allow_empty_updates = allow;
        self
    }

    #[must_use]
    pub fn with_rollback_tag(mut self, tag: impl Into<String>) -> Self {
        self.rollback_tag = tag.into();
        self
    }

    #[must_use]
    pub fn with_signing_key_env(mut self, var: impl Into<String>) -> Self {
        self.signing_key_env = var.into();
        self
    }

    #[must_use]
    pub fn with_max_diff_depth(mut self, depth: usize) -> Self {
        self.max_diff_depth = Some(depth);
        self
    }

    /// Check field values
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let initial = Version::parse(&self.initial_version);
        if initial.tag.is_some() || initial.to_string() != self.initial_version.trim() {
            return Err(ConfigError::Invalid {
                field: "initial_version",
                reason: format!("{:?} is not a plain major.minor.patch label", self.initial_version),
            });
        }
        if self.rollback_tag.is_empty()
            || !self
                .rollback_tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.')
        {
            return Err(ConfigError::Invalid {
                field: "rollback_tag",
                reason: "must be non-empty ASCII alphanumerics or dots".to_string(),
            });
        }
        if self.signing_key_env.is_empty() {
            return Err(ConfigError::Invalid {
                field: "signing_key_env",
                reason: "must name an environment variable".to_string(),
            });
        }
        if self.max_diff_depth == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_diff_depth",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Diff options derived from this config
    #[must_use]
    pub fn diff_options(&self) -> DiffOptions {
        self.max_diff_depth
            .map_or_else(DiffOptions::default, DiffOptions::with_max_depth)
    }

    /// Read the signing key from [`Self::signing_key_env`]
    ///
    /// # Errors
    /// Returns error if the variable is unset or empty
    pub fn signing_key_from_env(&self) -> Result<SigningKey, SigningError> {
        SigningKey::from_env(&self.signing_key_env)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            initial_version: "1.0.0".to_string(),
            default_change_class: ChangeClass::Minor,
            allow_empty_updates: false,
            rollback_tag: "rollback".to_string(),
            signing_key_env: DEFAULT_SIGNING_KEY_ENV.to_string(),
            max_diff_depth: None,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
