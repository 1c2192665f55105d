//! Document model: an optional sentinel-delimited metadata block followed by
//! a Markdown-like body.
//!
//! # Metadata grammar
//!
//! ```text
//! block   := "---" NL { line NL } "---" NL
//! line    := field | opaque
//! field   := KEY ":" [ WS value ]        KEY = [A-Za-z0-9_.-]+ at column 0
//! value   := list | scalar
//! list    := "[" [ item { "," item } ] "]"
//! item    := quoted | bare               bare excludes [ ] { } , "
//! scalar  := quoted | rest-of-line
//! opaque  := blank | "#" comment | any column-0 line without a KEY ":" prefix
//! ```
//!
//! Double-quoted strings accept `\"` and `\\`; single-quoted strings accept
//! `''`. Nested and multi-line values (indented continuations, `- item`
//! sequences, `{}` maps, nested lists, block scalars) are rejected with a
//! [`ParseError`] rather than flattened.
//!
//! Fields that are never modified serialize byte-for-byte from their source
//! line; opaque lines are carried through verbatim in their original position.

use std::fmt;
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::str::Chars;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Line that opens and closes the metadata block.
pub const SENTINEL: &str = "---";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("metadata block opened on line 1 is never closed")]
    UnterminatedBlock,

    #[error("line {line}: duplicate metadata key `{key}`")]
    DuplicateKey { line: usize, key: String },

    #[error("line {line}: unsupported metadata value ({reason})")]
    UnsupportedValue { line: usize, reason: &'static str },
}

/// A metadata value: a scalar string or an ordered list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Scalar(String),
    List(Vec<String>),
}

impl MetaValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            Self::Scalar(_) => None,
        }
    }

    /// First meaningful string: the scalar itself or the first list item.
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s.as_str()).filter(|s| !s.trim().is_empty()),
            Self::List(items) => items.iter().map(String::as_str).find(|s| !s.trim().is_empty()),
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        render_value(&mut out, self);
        f.write_str(&out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MetaLine {
    Field {
        key: String,
        value: MetaValue,
        /// Source line, kept until the field is modified.
        raw: Option<String>,
    },
    Opaque(String),
}

/// A candidate article: storage path, metadata block, and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    path: PathBuf,
    lines: Vec<MetaLine>,
    has_metadata_block: bool,
    body: String,
}

impl Document {
    /// Parse raw document text. `path` identifies where the document lives.
    pub fn parse(path: impl Into<PathBuf>, raw: &str) -> Result<Self, ParseError> {
        let path = path.into();
        let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);

        let mut segments = text.split_inclusive('\n');
        let opens_block = segments
            .next()
            .is_some_and(|first| strip_eol(first) == SENTINEL);
        if !opens_block {
            return Ok(Self {
                path,
                lines: Vec::new(),
                has_metadata_block: false,
                body: text.to_string(),
            });
        }

        let mut offset = text.split_inclusive('\n').next().map_or(0, str::len);
        let mut lines: Vec<MetaLine> = Vec::new();
        let mut closed = false;

        for (idx, segment) in segments.enumerate() {
            offset += segment.len();
            let line = strip_eol(segment);
            // Line 1 is the opening sentinel.
            let line_no = idx + 2;
            if line == SENTINEL {
                closed = true;
                break;
            }
            let parsed = parse_line(line, line_no)?;
            if let MetaLine::Field { key, .. } = &parsed
                && lines.iter().any(|l| matches!(l, MetaLine::Field { key: k, .. } if k == key))
            {
                return Err(ParseError::DuplicateKey {
                    line: line_no,
                    key: key.clone(),
                });
            }
            lines.push(parsed);
        }

        if !closed {
            return Err(ParseError::UnterminatedBlock);
        }

        Ok(Self {
            path,
            lines,
            has_metadata_block: true,
            body: text[offset..].to_string(),
        })
    }

    /// Render the document back to text.
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 256);
        if self.has_metadata_block {
            out.push_str(SENTINEL);
            out.push('\n');
            for line in &self.lines {
                match line {
                    MetaLine::Field {
                        raw: Some(raw), ..
                    } => out.push_str(raw),
                    MetaLine::Field { key, value, .. } => {
                        out.push_str(key);
                        out.push_str(": ");
                        render_value(&mut out, value);
                    }
                    MetaLine::Opaque(text) => out.push_str(text),
                }
                out.push('\n');
            }
            out.push_str(SENTINEL);
            out.push('\n');
        }
        out.push_str(&self.body);
        out
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut String {
        &mut self.body
    }

    pub fn has_metadata_block(&self) -> bool {
        self.has_metadata_block
    }

    /// Create an empty metadata block if the document has none.
    ///
    /// Returns `true` if a block was created.
    pub fn ensure_metadata_block(&mut self) -> bool {
        let created = !self.has_metadata_block;
        self.has_metadata_block = true;
        created
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.lines.iter().find_map(|line| match line {
            MetaLine::Field { key: k, value, .. } if k == key => Some(value),
            _ => None,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set a metadata field, replacing an existing value in place or
    /// appending a new field at the end of the block.
    ///
    /// Newlines inside values are written as spaces.
    pub fn set(&mut self, key: impl Into<String>, value: MetaValue) {
        let key = key.into();
        debug_assert!(is_valid_key(&key), "invalid metadata key {key:?}");
        self.has_metadata_block = true;
        for line in &mut self.lines {
            if let MetaLine::Field {
                key: k,
                value: v,
                raw,
            } = line
                && *k == key
            {
                if *v != value {
                    *v = value;
                    *raw = None;
                }
                return;
            }
        }
        self.lines.push(MetaLine::Field {
            key,
            value,
            raw: None,
        });
    }

    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        let pos = self
            .lines
            .iter()
            .position(|line| matches!(line, MetaLine::Field { key: k, .. } if k == key))?;
        match self.lines.remove(pos) {
            MetaLine::Field { value, .. } => Some(value),
            MetaLine::Opaque(_) => None,
        }
    }

    /// Metadata fields in block order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.lines.iter().filter_map(|line| match line {
            MetaLine::Field { key, value, .. } => Some((key.as_str(), value)),
            MetaLine::Opaque(_) => None,
        })
    }

    /// Identifier used in logs and journal entries: the `keyword` field,
    /// then `title`, then the file stem.
    pub fn keyword(&self) -> String {
        ["keyword", "title"]
            .iter()
            .find_map(|key| self.get(key).and_then(MetaValue::first))
            .map(|s| s.trim().to_string())
            .or_else(|| {
                self.path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "untitled".to_string())
    }
}

fn strip_eol(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Whether `key` can be written as a metadata field and read back as one.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(is_key_char)
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn parse_line(line: &str, line_no: usize) -> Result<MetaLine, ParseError> {
    let unsupported = |reason| ParseError::UnsupportedValue {
        line: line_no,
        reason,
    };

    if line.trim().is_empty() || line.starts_with('#') {
        return Ok(MetaLine::Opaque(line.to_string()));
    }
    if line.starts_with([' ', '\t']) {
        return Err(unsupported("indented continuation lines are not supported"));
    }
    if line == "-" || line.starts_with("- ") {
        return Err(unsupported("block sequences are not supported"));
    }

    let Some((key, rest)) = line.split_once(':') else {
        return Ok(MetaLine::Opaque(line.to_string()));
    };
    if !is_valid_key(key) {
        return Ok(MetaLine::Opaque(line.to_string()));
    }
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return Ok(MetaLine::Opaque(line.to_string()));
    }

    let value = parse_value(rest.trim()).map_err(unsupported)?;
    Ok(MetaLine::Field {
        key: key.to_string(),
        value,
        raw: Some(line.to_string()),
    })
}

fn parse_value(text: &str) -> Result<MetaValue, &'static str> {
    if text.starts_with('{') {
        return Err("inline maps are not supported");
    }
    if text.starts_with(['|', '>'])
        && text[1..].chars().all(|c| matches!(c, '-' | '+') || c.is_ascii_digit())
    {
        return Err("block scalars are not supported");
    }
    if text.starts_with('[') {
        return parse_list(text).map(MetaValue::List);
    }
    if let Some(quote) = text.chars().next().filter(|c| matches!(*c, '"' | '\'')) {
        let mut chars = text.chars().peekable();
        chars.next();
        let value = take_quoted(&mut chars, quote)?;
        if chars.any(|c| !c.is_whitespace()) {
            return Err("text after closing quote");
        }
        return Ok(MetaValue::Scalar(value));
    }
    Ok(MetaValue::Scalar(text.to_string()))
}

fn parse_list(text: &str) -> Result<Vec<String>, &'static str> {
    let inner = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or("list is not closed on the same line")?;

    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();
    skip_ws(&mut chars);
    if chars.peek().is_none() {
        return Ok(items);
    }

    loop {
        skip_ws(&mut chars);
        let item = match chars.peek().copied() {
            None => return Err("empty list item"),
            Some(q @ ('"' | '\'')) => {
                chars.next();
                take_quoted(&mut chars, q)?
            }
            Some(_) => {
                let mut bare = String::new();
                while let Some(&c) = chars.peek() {
                    if c == ',' {
                        break;
                    }
                    if matches!(c, '[' | ']' | '{' | '}' | '"') {
                        return Err("nested values are not supported");
                    }
                    bare.push(c);
                    chars.next();
                }
                let bare = bare.trim().to_string();
                if bare.is_empty() {
                    return Err("empty list item");
                }
                bare
            }
        };
        items.push(item);

        skip_ws(&mut chars);
        match chars.next() {
            None => return Ok(items),
            Some(',') => continue,
            Some(_) => return Err("expected `,` between list items"),
        }
    }
}

fn skip_ws(chars: &mut Peekable<Chars<'_>>) {
    while chars.next_if(|c| c.is_whitespace()).is_some() {}
}

/// Read a quoted string whose opening quote has already been consumed.
fn take_quoted(chars: &mut Peekable<Chars<'_>>, quote: char) -> Result<String, &'static str> {
    let mut out = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' if quote == '"' => match chars.next() {
                Some(escaped @ ('"' | '\\')) => out.push(escaped),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return Err("unterminated quoted string"),
            },
            '\'' if quote == '\'' && chars.peek() == Some(&'\'') => {
                chars.next();
                out.push('\'');
            }
            c if c == quote => return Ok(out),
            c => out.push(c),
        }
    }
    Err("unterminated quoted string")
}

fn render_value(out: &mut String, value: &MetaValue) {
    match value {
        MetaValue::Scalar(s) => {
            let s = flatten(s);
            if scalar_needs_quotes(&s) {
                push_quoted(out, &s);
            } else {
                out.push_str(&s);
            }
        }
        MetaValue::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let item = flatten(item);
                if item_needs_quotes(&item) {
                    push_quoted(out, &item);
                } else {
                    out.push_str(&item);
                }
            }
            out.push(']');
        }
    }
}

fn flatten(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}

fn has_edge_whitespace(s: &str) -> bool {
    s.trim() != s
}

fn scalar_needs_quotes(s: &str) -> bool {
    s.is_empty() || has_edge_whitespace(s) || s.starts_with(['[', '{', '"', '\'', '|', '>'])
}

fn item_needs_quotes(s: &str) -> bool {
    s.is_empty()
        || has_edge_whitespace(s)
        || s.starts_with('\'')
        || s.contains([',', '[', ']', '{', '}', '"'])
}

fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}
