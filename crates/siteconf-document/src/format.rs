//! Text formats for documents
//!
//! Documents are JSON values; operators may author them as JSON or YAML.

use std::path::Path;

use serde_json::Value;

/// Supported document encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFormat {
    /// JSON text
    #[default]
    Json,
    /// YAML text
    Yaml,
}

impl DocumentFormat {
    /// Guess the format from a file extension, defaulting to JSON
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::Yaml
            }
            _ => Self::Json,
        }
    }

    /// Parse text into a document
    ///
    /// # Errors
    /// Returns error if the text is not valid in this format
    pub fn parse(self, text: &str) -> Result<Value, FormatError> {
        match self {
            Self::Json => serde_json::from_str(text).map_err(FormatError::InvalidJson),
            Self::Yaml => serde_yaml::from_str(text).map_err(FormatError::InvalidYaml),
        }
    }

    /// Render a document as text
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn render(self, document: &Value) -> Result<String, FormatError> {
        match self {
            Self::Json => serde_json::to_string_pretty(document).map_err(FormatError::InvalidJson),
            Self::Yaml => serde_yaml::to_string(document).map_err(FormatError::InvalidYaml),
        }
    }
}

/// Document parse/render errors
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("invalid YAML: {0}")]
    InvalidYaml(#[source] serde_yaml::Error),
}
