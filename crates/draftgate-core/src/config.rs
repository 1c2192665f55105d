//! Gate configuration: acceptance threshold, attempt budget, rubric, oracle
//! invocation, and journal location.
//!
//! Loaded once from TOML (every field has a default) and then treated as
//! read-only. The threshold in particular is never adjusted after load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{MetaValue, is_valid_key};
use crate::score::Threshold;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("threshold must be within (0, 1], got {0}")]
    Threshold(f64),

    #[error("max_attempts must be at least 1")]
    MaxAttempts,

    #[error("concurrency must be at least 1")]
    Concurrency,

    #[error("oracle.timeout_secs must be at least 1")]
    OracleTimeout,

    #[error("oracle.program must not be empty")]
    OracleProgram,

    #[error("oracle.marker must not be empty")]
    OracleMarker,

    #[error("`{0}` is not a valid metadata field name (letters, digits, `_`, `-`, `.`)")]
    FieldName(String),

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level configuration for a gate run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    pub threshold: Threshold,
    pub max_attempts: u32,
    /// Documents processed concurrently in a batch.
    pub concurrency: usize,
    pub rubric: Rubric,
    pub oracle: OracleConfig,
    pub journal: JournalConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold: Threshold::DEFAULT,
            max_attempts: 5,
            concurrency: 4,
            rubric: Rubric::default(),
            oracle: OracleConfig::default(),
            journal: JournalConfig::default(),
        }
    }
}

impl GateConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::MaxAttempts);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Concurrency);
        }
        if self.oracle.timeout_secs == 0 {
            return Err(ConfigError::OracleTimeout);
        }
        if self.oracle.program.trim().is_empty() {
            return Err(ConfigError::OracleProgram);
        }
        if self.oracle.marker.trim().is_empty() {
            return Err(ConfigError::OracleMarker);
        }
        if let Some(name) = self
            .rubric
            .required_fields
            .iter()
            .chain(self.rubric.field_placeholders.keys())
            .find(|name| !is_valid_key(name))
        {
            return Err(ConfigError::FieldName(name.clone()));
        }
        Ok(())
    }
}

/// Structural checks every document must pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Rubric {
    pub required_sections: Vec<SectionRule>,
    pub min_external_links: usize,
    pub min_embedded_images: usize,
    pub min_word_count: usize,
    /// Words or phrases that disqualify image alt text.
    pub banned_alt_terms: Vec<String>,
    /// Metadata keys that must be present, in reporting order.
    pub required_fields: Vec<String>,
    /// Values used when a required field cannot be derived from the document.
    pub field_placeholders: BTreeMap<String, MetaValue>,
}

impl Default for Rubric {
    fn default() -> Self {
        Self {
            required_sections: vec![SectionRule::conclusion()],
            min_external_links: 2,
            min_embedded_images: 1,
            min_word_count: 1500,
            banned_alt_terms: ["image", "picture", "photo", "placeholder", "screenshot", "untitled"]
                .map(String::from)
                .to_vec(),
            required_fields: ["title", "keywords", "image"].map(String::from).to_vec(),
            field_placeholders: BTreeMap::from([(
                "image".to_string(),
                MetaValue::Scalar("/images/placeholder-hero.webp".to_string()),
            )]),
        }
    }
}

/// A section the body must contain, matched by heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectionRule {
    /// Heading written when the section is appended.
    pub heading: String,
    /// Accepted heading spellings, compared case-insensitively.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Paragraph written under the appended heading.
    #[serde(default)]
    pub template: String,
}

impl SectionRule {
    pub fn conclusion() -> Self {
        Self {
            heading: "Conclusion".to_string(),
            aliases: ["conclusion", "fazit", "summary", "zusammenfassung", "final thoughts"]
                .map(String::from)
                .to_vec(),
            template: "Taken together, the points above cover what matters most. \
                       Weigh them against your own needs and budget before making a decision."
                .to_string(),
        }
    }

    /// Heading plus aliases, lowercased.
    pub fn spellings(&self) -> impl Iterator<Item = String> {
        std::iter::once(&self.heading)
            .chain(&self.aliases)
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
    }
}

/// External scoring process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OracleConfig {
    pub program: String,
    /// Arguments; `{path}` is replaced with the document path. Without a
    /// placeholder the path is appended.
    pub args: Vec<String>,
    pub timeout_secs: u64,
    /// Text preceding the percentage in the oracle output.
    pub marker: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            program: "quality-check".to_string(),
            args: vec!["{path}".to_string()],
            timeout_secs: 120,
            marker: "Quality Score:".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JournalConfig {
    pub path: PathBuf,
    /// Oldest entries are dropped once the journal grows past this count.
    pub max_entries: Option<usize>,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("quality_journal.ndjson"),
            max_entries: None,
        }
    }
}
