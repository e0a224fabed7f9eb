//! Placeholder substitution of invoice data into an XML template.
//!
//! Templates use `{{field}}` for top-level scalars, `{{section.field}}` and
//! `{{section.field.subfield}}` for the known sections, and a single
//! `{{#each invoice_line}} ... {{/each}}` block whose body is repeated per line
//! with `{{@index}}` bound to the 1-based line number.
use super::request::{Group, InvoiceRequest, Section};
use quick_xml::escape::escape;
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

const BLOCK_OPEN: &str = "#each invoice_line";
const BLOCK_CLOSE: &str = "/each";
const INDEX: &str = "@index";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("repeating block opened at byte {offset} is never closed")]
    UnterminatedBlock { offset: usize },
    #[error("repeating block at byte {offset} is nested inside another block")]
    NestedBlock { offset: usize },
    #[error("second repeating block at byte {offset}; only one is supported")]
    MultipleBlocks { offset: usize },
    #[error("block end at byte {offset} has no matching start")]
    UnmatchedBlockEnd { offset: usize },
    #[error("invalid unmatched-placeholder policy: {input}")]
    InvalidPolicy { input: String },
}

/// What to do with a placeholder that has no value in the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnmatchedPlaceholders {
    /// Leave the `{{token}}` in the output verbatim.
    #[default]
    Keep,
    /// Render the token as an empty string.
    Remove,
}

impl UnmatchedPlaceholders {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnmatchedPlaceholders::Keep => "keep",
            UnmatchedPlaceholders::Remove => "remove",
        }
    }
}

impl FromStr for UnmatchedPlaceholders {
    type Err = TemplateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "keep" => Ok(UnmatchedPlaceholders::Keep),
            "remove" | "empty" => Ok(UnmatchedPlaceholders::Remove),
            _ => Err(TemplateError::InvalidPolicy {
                input: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for UnmatchedPlaceholders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Placeholder {
    key: String,
    raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Placeholder(Placeholder),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Piece(Piece),
    Block(Vec<Piece>),
}

/// A compiled invoice template.
///
/// # Examples
/// ```rust
/// use firs_core::invoice::request::{Group, InvoiceRequest};
/// use firs_core::invoice::template::Template;
///
/// let template = Template::parse(
///     "<Invoice><ID>{{irn}}</ID>{{#each invoice_line}}<Line n=\"{{@index}}\">{{item_name}}</Line>{{/each}}</Invoice>",
/// )?;
/// let request = InvoiceRequest::new("INV001").with_line(Group::new().with("item_name", "Widget"));
/// assert_eq!(
///     template.render(&request),
///     "<Invoice><ID>INV001</ID><Line n=\"1\">Widget</Line></Invoice>"
/// );
/// # Ok::<(), firs_core::invoice::template::TemplateError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
    unmatched: UnmatchedPlaceholders,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut block: Option<(usize, Vec<Piece>)> = None;
        let mut seen_block = false;
        let mut literal = String::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(open) = rest.find("{{") {
            let after = &rest[open + 2..];
            let Some(close) = after.find("}}") else {
                break;
            };
            let consumed = open + 2 + close + 2;
            let raw = &rest[open..consumed];
            let token = after[..close].trim();
            let at = offset + open;
            literal.push_str(&rest[..open]);

            match token {
                BLOCK_OPEN => {
                    if block.is_some() {
                        return Err(TemplateError::NestedBlock { offset: at });
                    }
                    if seen_block {
                        return Err(TemplateError::MultipleBlocks { offset: at });
                    }
                    flush(&mut literal, &mut segments, &mut block);
                    block = Some((at, Vec::new()));
                    seen_block = true;
                }
                BLOCK_CLOSE => {
                    flush(&mut literal, &mut segments, &mut block);
                    let Some((_, body)) = block.take() else {
                        return Err(TemplateError::UnmatchedBlockEnd { offset: at });
                    };
                    segments.push(Segment::Block(body));
                }
                "" => literal.push_str(raw),
                key => {
                    flush(&mut literal, &mut segments, &mut block);
                    push_piece(
                        &mut segments,
                        &mut block,
                        Piece::Placeholder(Placeholder {
                            key: key.to_string(),
                            raw: raw.to_string(),
                        }),
                    );
                }
            }

            rest = &rest[consumed..];
            offset += consumed;
        }
        literal.push_str(rest);

        if let Some((offset, _)) = block {
            return Err(TemplateError::UnterminatedBlock { offset });
        }
        flush(&mut literal, &mut segments, &mut block);

        Ok(Self {
            segments,
            unmatched: UnmatchedPlaceholders::default(),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let template = Template::parse(&source)?;
        debug!(path = %path.display(), has_block = template.has_block(), "loaded invoice template");
        Ok(template)
    }

    pub fn with_unmatched(mut self, policy: UnmatchedPlaceholders) -> Self {
        self.unmatched = policy;
        self
    }

    pub fn unmatched(&self) -> UnmatchedPlaceholders {
        self.unmatched
    }

    /// Whether the template contains the repeating line block.
    pub fn has_block(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Block(_)))
    }

    /// Substitute `request` into the template in a single pass; substituted
    /// values are XML-escaped and never rescanned for placeholders.
    pub fn render(&self, request: &InvoiceRequest) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Piece(Piece::Literal(text)) => out.push_str(text),
                Segment::Piece(Piece::Placeholder(placeholder)) => {
                    self.substitute(&mut out, placeholder, lookup(request, &placeholder.key));
                }
                Segment::Block(body) => {
                    for (index, line) in request.lines().iter().enumerate() {
                        for piece in body {
                            match piece {
                                Piece::Literal(text) => out.push_str(text),
                                Piece::Placeholder(placeholder) => {
                                    let value =
                                        lookup_in_line(request, line, index + 1, &placeholder.key);
                                    self.substitute(&mut out, placeholder, value);
                                }
                            }
                        }
                    }
                }
            }
        }
        out
    }

    fn substitute(&self, out: &mut String, placeholder: &Placeholder, value: Option<Cow<'_, str>>) {
        match (value, self.unmatched) {
            (Some(value), _) => out.push_str(&escape(value.as_ref())),
            (None, UnmatchedPlaceholders::Keep) => out.push_str(&placeholder.raw),
            (None, UnmatchedPlaceholders::Remove) => {}
        }
    }
}

/// Render a template string with the default unmatched-placeholder policy.
pub fn render(template: &str, request: &InvoiceRequest) -> Result<String, TemplateError> {
    Ok(Template::parse(template)?.render(request))
}

fn flush(literal: &mut String, segments: &mut Vec<Segment>, block: &mut Option<(usize, Vec<Piece>)>) {
    if !literal.is_empty() {
        push_piece(segments, block, Piece::Literal(std::mem::take(literal)));
    }
}

fn push_piece(segments: &mut Vec<Segment>, block: &mut Option<(usize, Vec<Piece>)>, piece: Piece) {
    match block {
        Some((_, body)) => body.push(piece),
        None => segments.push(Segment::Piece(piece)),
    }
}

/// Top-level scalars first, then `section.field` / `section.field.subfield`.
fn lookup<'a>(request: &'a InvoiceRequest, key: &str) -> Option<Cow<'a, str>> {
    if let Some(value) = request.scalar(key) {
        return Some(Cow::Borrowed(value));
    }
    let (section, path) = key.split_once('.')?;
    let section: Section = section.parse().ok()?;
    request
        .section(section)
        .and_then(|group| group.get(path))
        .map(Cow::Borrowed)
}

fn lookup_in_line<'a>(
    request: &'a InvoiceRequest,
    line: &'a Group,
    index: usize,
    key: &str,
) -> Option<Cow<'a, str>> {
    if let Some(value) = lookup(request, key) {
        return Some(value);
    }
    if key == INDEX {
        return Some(Cow::Owned(index.to_string()));
    }
    line.get(key).map(Cow::Borrowed)
}
