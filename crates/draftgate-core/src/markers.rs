//! Lightweight scanning of Markdown body structure: headings, links, images.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// `[text](target)` or `![alt](target "title")`.
static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(!?)\[([^\]\n]*)\]\(\s*([^)\s]+)(?:\s+"[^"\n]*")?\s*\)"#)
        .expect("marker pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Link,
    Image,
}

/// A link or image reference found in the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker<'a> {
    pub kind: MarkerKind,
    /// Link text or image alt text.
    pub text: &'a str,
    pub target: &'a str,
    /// Byte range of `text` within the body.
    pub text_range: Range<usize>,
}

impl Marker<'_> {
    pub fn is_external_link(&self) -> bool {
        self.kind == MarkerKind::Link && is_external(self.target)
    }
}

pub fn is_external(target: &str) -> bool {
    let lower = target.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// All link and image markers, in document order.
pub fn markers(body: &str) -> Vec<Marker<'_>> {
    MARKER
        .captures_iter(body)
        .filter_map(|caps| {
            let bang = caps.get(1)?;
            let text = caps.get(2)?;
            let target = caps.get(3)?;
            Some(Marker {
                kind: if bang.as_str().is_empty() {
                    MarkerKind::Link
                } else {
                    MarkerKind::Image
                },
                text: text.as_str(),
                target: target.as_str(),
                text_range: text.range(),
            })
        })
        .collect()
}

pub fn images(body: &str) -> impl Iterator<Item = Marker<'_>> {
    markers(body)
        .into_iter()
        .filter(|m| m.kind == MarkerKind::Image)
}

/// Replace link and image markup with its visible text.
pub fn strip_markup(text: &str) -> String {
    MARKER.replace_all(text, "$2").into_owned()
}

/// ATX heading texts (`#` through `######`) outside fenced code blocks.
pub fn headings(body: &str) -> Vec<Heading<'_>> {
    let mut out = Vec::new();
    let mut in_fence = false;
    for line in body.lines() {
        if fence_run(line).is_some() {
            in_fence = !in_fence;
            continue;
        }
        let trimmed = line.trim_start();
        if in_fence || line.len() - trimmed.len() > 3 {
            continue;
        }
        let level = trimmed.chars().take_while(|&c| c == '#').count();
        if !(1..=6).contains(&level) {
            continue;
        }
        let rest = &trimmed[level..];
        if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
            continue;
        }
        let text = rest.trim().trim_end_matches('#').trim_end();
        out.push(Heading { level, text });
    }
    out
}

/// Opening fence run (three or more backticks or tildes) still open at the
/// end of `body`, using the same toggling as [`headings`].
pub fn unclosed_fence(body: &str) -> Option<&str> {
    let mut open = None;
    for line in body.lines() {
        if let Some(run) = fence_run(line) {
            open = if open.is_some() { None } else { Some(run) };
        }
    }
    open
}

fn fence_run(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let fence = trimmed.chars().next().filter(|c| matches!(*c, '`' | '~'))?;
    let len = trimmed.chars().take_while(|&c| c == fence).count();
    (len >= 3).then(|| &trimmed[..len])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heading<'a> {
    pub level: usize,
    pub text: &'a str,
}

pub fn word_count(body: &str) -> usize {
    body.split_whitespace().count()
}
