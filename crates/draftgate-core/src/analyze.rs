//! Issue analyzer: checks a document against the rubric.
//!
//! Issues are reported in a fixed kind order (metadata block, sections, links,
//! images, alt text, word count, required fields) and, within a kind, in
//! rubric or document order. Only ordered collections are walked, so the same
//! input always yields the same list.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{Rubric, SectionRule};
use crate::document::Document;
use crate::markers::{self, MarkerKind};

/// A structural deficiency found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    MissingMetadataBlock,
    MissingSection { name: String },
    InsufficientExternalLinks { found: usize, required: usize },
    InsufficientEmbeddedImages { found: usize, required: usize },
    ForbiddenAltText { target: String, alt: String },
    WordCountBelowMinimum { found: usize, required: usize },
    MissingRequiredField { name: String },
}

/// Payload-free issue tag, used for reporting and journal entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingMetadataBlock,
    MissingSection,
    InsufficientExternalLinks,
    InsufficientEmbeddedImages,
    ForbiddenAltText,
    WordCountBelowMinimum,
    MissingRequiredField,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingMetadataBlock => "missing_metadata_block",
            Self::MissingSection => "missing_section",
            Self::InsufficientExternalLinks => "insufficient_external_links",
            Self::InsufficientEmbeddedImages => "insufficient_embedded_images",
            Self::ForbiddenAltText => "forbidden_alt_text",
            Self::WordCountBelowMinimum => "word_count_below_minimum",
            Self::MissingRequiredField => "missing_required_field",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Issue {
    pub fn kind(&self) -> IssueKind {
        match self {
            Self::MissingMetadataBlock => IssueKind::MissingMetadataBlock,
            Self::MissingSection { .. } => IssueKind::MissingSection,
            Self::InsufficientExternalLinks { .. } => IssueKind::InsufficientExternalLinks,
            Self::InsufficientEmbeddedImages { .. } => IssueKind::InsufficientEmbeddedImages,
            Self::ForbiddenAltText { .. } => IssueKind::ForbiddenAltText,
            Self::WordCountBelowMinimum { .. } => IssueKind::WordCountBelowMinimum,
            Self::MissingRequiredField { .. } => IssueKind::MissingRequiredField,
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMetadataBlock => write!(f, "document has no metadata block"),
            Self::MissingSection { name } => write!(f, "missing required section \"{name}\""),
            Self::InsufficientExternalLinks { found, required } => {
                write!(f, "{found} external links, at least {required} required")
            }
            Self::InsufficientEmbeddedImages { found, required } => {
                write!(f, "{found} embedded images, at least {required} required")
            }
            Self::ForbiddenAltText { target, alt } if alt.trim().is_empty() => {
                write!(f, "image {target} has empty alt text")
            }
            Self::ForbiddenAltText { target, alt } => {
                write!(f, "image {target} has banned alt text \"{alt}\"")
            }
            Self::WordCountBelowMinimum { found, required } => {
                write!(f, "{found} words, at least {required} required")
            }
            Self::MissingRequiredField { name } => {
                write!(f, "missing required metadata field \"{name}\"")
            }
        }
    }
}

/// Inspect a document and return every rubric violation.
pub fn analyze(doc: &Document, rubric: &Rubric) -> Vec<Issue> {
    let body = doc.body();
    let mut issues = Vec::new();

    if !doc.has_metadata_block() {
        issues.push(Issue::MissingMetadataBlock);
    }

    for rule in &rubric.required_sections {
        if !section_present(body, rule) {
            issues.push(Issue::MissingSection {
                name: rule.heading.clone(),
            });
        }
    }

    let found = markers::markers(body);

    let links = found.iter().filter(|m| m.is_external_link()).count();
    if links < rubric.min_external_links {
        issues.push(Issue::InsufficientExternalLinks {
            found: links,
            required: rubric.min_external_links,
        });
    }

    let images: Vec<_> = found.iter().filter(|m| m.kind == MarkerKind::Image).collect();
    if images.len() < rubric.min_embedded_images {
        issues.push(Issue::InsufficientEmbeddedImages {
            found: images.len(),
            required: rubric.min_embedded_images,
        });
    }

    for image in &images {
        if alt_is_forbidden(image.text, &rubric.banned_alt_terms) {
            issues.push(Issue::ForbiddenAltText {
                target: image.target.to_string(),
                alt: image.text.to_string(),
            });
        }
    }

    let words = markers::word_count(body);
    if words < rubric.min_word_count {
        issues.push(Issue::WordCountBelowMinimum {
            found: words,
            required: rubric.min_word_count,
        });
    }

    for name in &rubric.required_fields {
        if !doc.contains(name) {
            issues.push(Issue::MissingRequiredField { name: name.clone() });
        }
    }

    issues
}

/// Whether any heading matches the rule's heading or aliases.
///
/// A heading matches when it equals a spelling or starts with one followed by
/// a non-alphanumeric character ("Fazit: unser Tipp").
pub fn section_present(body: &str, rule: &SectionRule) -> bool {
    let spellings: Vec<String> = rule.spellings().collect();
    markers::headings(body).iter().any(|heading| {
        let text = heading.text.to_lowercase();
        spellings.iter().any(|spelling| {
            text.strip_prefix(spelling.as_str())
                .is_some_and(|rest| rest.chars().next().is_none_or(|c| !c.is_alphanumeric()))
        })
    })
}

/// Alt text is forbidden when blank or containing a banned word or phrase.
pub fn alt_is_forbidden(alt: &str, banned: &[String]) -> bool {
    if alt.trim().is_empty() {
        return true;
    }
    let haystack = format!(" {} ", normalize_words(alt));
    banned
        .iter()
        .map(|term| normalize_words(term))
        .filter(|term| !term.is_empty())
        .any(|term| haystack.contains(&format!(" {term} ")))
}

/// Lowercase, with every run of non-alphanumeric characters collapsed to one space.
pub(crate) fn normalize_words(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
