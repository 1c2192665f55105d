//! Deterministic repairs, one transform per issue kind.
//!
//! Every transform re-checks its own condition against the current document
//! before touching it, so applying the same issue list twice leaves the
//! document as it was after the first pass. Kinds with no safe remediation
//! (link count, image count, word count) are reported as skipped.

use serde::Serialize;
use tracing::debug;

use crate::analyze::{Issue, IssueKind, alt_is_forbidden, normalize_words, section_present};
use crate::config::{Rubric, SectionRule};
use crate::document::{Document, MetaValue};
use crate::markers::{self, MarkerKind};

/// Longest derived `description` value, in characters.
const DESCRIPTION_MAX_CHARS: usize = 160;

/// What a fix pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FixReport {
    pub applied: Vec<IssueKind>,
    pub skipped: Vec<IssueKind>,
}

impl FixReport {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Apply one transform per issue, in issue order.
pub fn apply(doc: &mut Document, issues: &[Issue], rubric: &Rubric) -> FixReport {
    let mut report = FixReport::default();
    for issue in issues {
        let changed = match issue {
            Issue::MissingMetadataBlock => doc.ensure_metadata_block(),
            Issue::MissingSection { name } => fix_section(doc, name, rubric),
            Issue::MissingRequiredField { name } => fix_field(doc, name, rubric),
            Issue::ForbiddenAltText { target, alt } => fix_alt_text(doc, target, alt, rubric),
            Issue::InsufficientExternalLinks { .. }
            | Issue::InsufficientEmbeddedImages { .. }
            | Issue::WordCountBelowMinimum { .. } => false,
        };
        debug!(issue = %issue, changed, "fix transform");
        if changed {
            report.applied.push(issue.kind());
        } else {
            report.skipped.push(issue.kind());
        }
    }
    report
}

fn fix_section(doc: &mut Document, name: &str, rubric: &Rubric) -> bool {
    let rule = rubric
        .required_sections
        .iter()
        .find(|rule| rule.heading == name)
        .cloned()
        .unwrap_or_else(|| SectionRule {
            heading: name.to_string(),
            aliases: Vec::new(),
            template: String::new(),
        });
    if section_present(doc.body(), &rule) {
        return false;
    }

    let open_fence = markers::unclosed_fence(doc.body()).map(str::to_string);
    let body = doc.body_mut();
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }
    // A heading appended inside an open fence would never be seen again.
    if let Some(fence) = open_fence {
        body.push_str(&fence);
        body.push('\n');
    }
    body.push_str("\n## ");
    body.push_str(&rule.heading);
    body.push('\n');
    if !rule.template.trim().is_empty() {
        body.push('\n');
        body.push_str(rule.template.trim());
        body.push('\n');
    }
    true
}

fn fix_field(doc: &mut Document, name: &str, rubric: &Rubric) -> bool {
    if doc.contains(name) {
        return false;
    }
    let value = derive_field(doc, name)
        .or_else(|| rubric.field_placeholders.get(name).cloned())
        .unwrap_or_else(|| empty_value(name));
    doc.set(name, value);
    true
}

fn is_list_field(name: &str) -> bool {
    matches!(name, "keywords" | "tags" | "categories")
}

fn empty_value(name: &str) -> MetaValue {
    if is_list_field(name) {
        MetaValue::List(Vec::new())
    } else {
        MetaValue::Scalar(String::new())
    }
}

/// Default for a required field, derived from data already in the document.
fn derive_field(doc: &Document, name: &str) -> Option<MetaValue> {
    match name {
        "keywords" => sibling_list(doc, &["tags", "keyword", "title"]),
        "tags" => sibling_list(doc, &["keywords", "keyword"]),
        "keyword" => ["keywords", "tags", "title"]
            .iter()
            .find_map(|key| doc.get(key).and_then(MetaValue::first))
            .map(|s| MetaValue::Scalar(s.to_string())),
        "image" => markers::images(doc.body())
            .next()
            .map(|m| MetaValue::Scalar(m.target.to_string())),
        "title" => markers::headings(doc.body())
            .into_iter()
            .find(|h| h.level == 1 && !h.text.is_empty())
            .map(|h| MetaValue::Scalar(markers::strip_markup(h.text))),
        "description" => first_paragraph(doc.body()).map(MetaValue::Scalar),
        _ => None,
    }
}

/// First non-empty list among `sources`; a scalar source becomes a one-item list.
fn sibling_list(doc: &Document, sources: &[&str]) -> Option<MetaValue> {
    sources.iter().find_map(|key| match doc.get(key)? {
        MetaValue::List(items) if !items.is_empty() => Some(MetaValue::List(items.clone())),
        MetaValue::Scalar(s) if !s.trim().is_empty() => {
            Some(MetaValue::List(vec![s.trim().to_string()]))
        }
        _ => None,
    })
}

/// First prose paragraph, whitespace-collapsed and cut at a word boundary.
fn first_paragraph(body: &str) -> Option<String> {
    let block = body
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .find(|block| !block.starts_with(['#', '!', '-', '*', '>', '|', '`', '<']))?;

    let text = markers::strip_markup(block)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if text.chars().count() <= DESCRIPTION_MAX_CHARS {
        return Some(text);
    }

    let mut out = String::new();
    for word in text.split(' ') {
        if out.chars().count() + word.chars().count() + 1 > DESCRIPTION_MAX_CHARS {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    Some(out)
}

fn fix_alt_text(doc: &mut Document, target: &str, alt: &str, rubric: &Rubric) -> bool {
    let banned = &rubric.banned_alt_terms;
    let range = markers::markers(doc.body())
        .into_iter()
        .find(|m| {
            m.kind == MarkerKind::Image
                && m.target == target
                && m.text == alt
                && alt_is_forbidden(m.text, banned)
        })
        .map(|m| m.text_range);
    let Some(range) = range else {
        return false;
    };

    let subject = alt_subject(doc);
    let Some(description) = describe_image(target, &subject, banned) else {
        return false;
    };
    doc.body_mut().replace_range(range, &description);
    true
}

/// Topic used in generated alt text: the document keyword with markup
/// characters removed.
fn alt_subject(doc: &Document) -> String {
    doc.keyword()
        .chars()
        .map(|c| match c {
            '[' | ']' | '(' | ')' | '\n' | '\r' => ' ',
            '-' | '_' => ' ',
            c => c,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

const IMAGE_HINTS: &[(&[&str], &str)] = &[
    (&["hero", "cover", "banner", "header"], "overview"),
    (&["chart", "graph", "diagram"], "chart"),
    (&["step", "howto", "tutorial"], "step by step"),
];

/// Alt text for an image, chosen from hints in its path.
///
/// Returns `None` when no wording survives the banned-term filter.
pub fn describe_image(target: &str, subject: &str, banned: &[String]) -> Option<String> {
    let path = target.to_lowercase();
    let suffix = IMAGE_HINTS
        .iter()
        .find(|(hints, _)| hints.iter().any(|hint| path.contains(hint)))
        .map_or("detail", |(_, suffix)| *suffix);

    let banned_words: Vec<String> = banned.iter().map(|t| normalize_words(t)).collect();
    let words: Vec<&str> = subject
        .split_whitespace()
        .chain(suffix.split(' '))
        .filter(|word| !banned_words.contains(&normalize_words(word)))
        .collect();

    let mut candidate = words.join(" ");
    if let Some(first) = candidate.chars().next()
        && subject.trim().is_empty()
    {
        candidate.replace_range(..first.len_utf8(), &first.to_uppercase().to_string());
    }

    (!alt_is_forbidden(&candidate, banned)).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::analyze;
    use crate::analyze::tests::article_body;

    fn doc(raw: &str) -> Document {
        Document::parse("drafts/best-espresso.md", raw).unwrap()
    }

    #[test]
    fn one_pass_resolves_section_and_fields() {
        let rubric = Rubric::default();
        let raw = format!(
            "---\ntitle: Espresso\ntags: [espresso, coffee]\n---\n{}",
            article_body(1800, false)
        );
        let mut d = doc(&raw);
        let issues = analyze(&d, &rubric);
        assert_eq!(issues.len(), 3);

        let report = apply(&mut d, &issues, &rubric);
        assert!(report.changed());
        assert_eq!(
            report.applied,
            vec![
                IssueKind::MissingSection,
                IssueKind::MissingRequiredField,
                IssueKind::MissingRequiredField
            ]
        );
        assert!(analyze(&d, &rubric).is_empty());
        assert_eq!(
            d.get("keywords"),
            Some(&MetaValue::List(vec!["espresso".into(), "coffee".into()]))
        );
        assert_eq!(
            d.get("image"),
            Some(&MetaValue::Scalar("/img/espresso-counter.webp".into()))
        );
        assert!(d.body().contains("\n## Conclusion\n\nTaken together"));
    }

    #[test]
    fn fixes_are_idempotent() {
        let rubric = Rubric::default();
        let raw = "Intro with ![](/img/espresso-hero.webp) and ![photo](/img/x.png)\n";
        let mut once = doc(raw);
        let issues = analyze(&once, &rubric);
        apply(&mut once, &issues, &rubric);

        let mut twice = once.clone();
        let report = apply(&mut twice, &issues, &rubric);
        assert!(!report.changed());
        assert_eq!(twice, once);
        assert_eq!(twice.serialize(), once.serialize());
    }

    #[test]
    fn section_after_unclosed_fence_is_added_once() {
        let rubric = Rubric::default();
        let mut d = doc("Intro\n\n```sh\necho hi\n");
        for _ in 0..3 {
            let issues = analyze(&d, &rubric);
            apply(&mut d, &issues, &rubric);
        }
        assert_eq!(d.body().matches("## Conclusion").count(), 1);
        assert!(d.body().starts_with("Intro\n\n```sh\necho hi\n```\n\n## Conclusion\n"));
        assert!(markers::unclosed_fence(d.body()).is_none());
        assert!(
            !analyze(&d, &rubric)
                .iter()
                .any(|i| i.kind() == IssueKind::MissingSection)
        );
    }

    #[test]
    fn empty_hero_alt_gets_clean_description() {
        let rubric = Rubric::default();
        let raw = "---\nkeyword: espresso machines\n---\nText ![](/img/espresso-hero.webp) end\n";
        let mut d = doc(raw);
        let issues: Vec<Issue> = analyze(&d, &rubric)
            .into_iter()
            .filter(|i| i.kind() == IssueKind::ForbiddenAltText)
            .collect();
        assert_eq!(issues.len(), 1);

        let report = apply(&mut d, &issues, &rubric);
        assert_eq!(report.applied, vec![IssueKind::ForbiddenAltText]);
        assert!(d
            .body()
            .contains("![espresso machines overview](/img/espresso-hero.webp)"));
        assert!(
            !analyze(&d, &rubric)
                .iter()
                .any(|i| i.kind() == IssueKind::ForbiddenAltText)
        );
    }

    #[test]
    fn only_the_offending_marker_is_rewritten() {
        let rubric = Rubric::default();
        let raw = "---\nkeyword: grinders\n---\n![Burr grinder](/a.png) ![picture](/b-chart.png)\n";
        let mut d = doc(raw);
        let issues = analyze(&d, &rubric);
        apply(&mut d, &issues, &rubric);
        assert!(d.body().starts_with("![Burr grinder](/a.png) ![grinders chart](/b-chart.png)"));
    }

    #[test]
    fn banned_words_are_removed_from_generated_alt() {
        let banned = vec!["photo".to_string(), "overview".to_string()];
        assert_eq!(
            describe_image("/img/hero.png", "photo printers", &banned),
            Some("printers".to_string())
        );
        assert_eq!(
            describe_image("/img/x.png", "", &[]),
            Some("Detail".to_string())
        );
        let everything = vec!["detail".to_string()];
        assert_eq!(describe_image("/img/x.png", "", &everything), None);
    }

    #[test]
    fn unfixable_issues_are_skipped() {
        let rubric = Rubric::default();
        let mut d = doc("---\ntitle: t\nkeywords: [k]\nimage: /i.png\n---\nshort\n## Conclusion\n");
        let issues = analyze(&d, &rubric);
        let before = d.clone();
        let report = apply(&mut d, &issues, &rubric);
        assert!(!report.changed());
        assert!(report.skipped.contains(&IssueKind::InsufficientExternalLinks));
        assert!(report.skipped.contains(&IssueKind::InsufficientEmbeddedImages));
        assert!(report.skipped.contains(&IssueKind::WordCountBelowMinimum));
        assert_eq!(d, before);
    }

    #[test]
    fn missing_block_and_fields_are_created_together() {
        let rubric = Rubric::default();
        let mut d = doc("# Espresso at Home\n\nPulling a good shot takes practice.\n");
        let issues = analyze(&d, &rubric);
        apply(&mut d, &issues, &rubric);
        assert!(d.has_metadata_block());
        assert_eq!(
            d.get("title"),
            Some(&MetaValue::Scalar("Espresso at Home".into()))
        );
        assert_eq!(
            d.get("keywords"),
            Some(&MetaValue::List(vec!["Espresso at Home".into()]))
        );
        assert_eq!(
            d.get("image"),
            Some(&MetaValue::Scalar("/images/placeholder-hero.webp".into()))
        );
        assert!(d.serialize().starts_with("---\ntitle: Espresso at Home\n"));
    }

    #[test]
    fn description_is_cut_at_word_boundary() {
        let rubric = Rubric {
            required_fields: vec!["description".into()],
            ..Rubric::default()
        };
        let body = format!("# T\n\n{}\n", "word ".repeat(100));
        let mut d = doc(&body);
        apply(
            &mut d,
            &[Issue::MissingRequiredField {
                name: "description".into(),
            }],
            &rubric,
        );
        let description = d.get("description").and_then(MetaValue::as_scalar).unwrap();
        assert!(description.len() <= DESCRIPTION_MAX_CHARS);
        assert!(description.ends_with("word"));
    }
}
