//! Core types for the draftgate quality gate: document model, rubric
//! configuration, issue analysis, and deterministic fixes.

pub mod analyze;
pub mod config;
pub mod document;
pub mod fix;
pub mod markers;
pub mod score;

pub use analyze::{Issue, IssueKind, analyze};
pub use config::{ConfigError, GateConfig, JournalConfig, OracleConfig, Rubric, SectionRule};
pub use document::{Document, MetaValue, ParseError, is_valid_key};
pub use fix::{FixReport, apply};
pub use score::{QualityScore, Threshold};
