//! XML parsing into the owned tree.
use super::{Attribute, Element, Node, XmlDocument, XmlError};
use quick_xml::{
    Reader,
    escape::unescape,
    events::{BytesStart, Event},
};

/// Parse an XML string into an [`XmlDocument`].
///
/// Line endings are normalized to `\n`, literal whitespace in attribute
/// values is normalized to spaces and entity references are resolved, so
/// the tree holds the same information an XML processor would expose.
///
/// # Examples
/// ```rust
/// use firs_core::invoice::xml::parse_document;
///
/// let doc = parse_document("<Invoice><ID>INV001</ID></Invoice>")?;
/// assert_eq!(doc.root().child("ID").map(|id| id.text()).as_deref(), Some("INV001"));
/// # Ok::<(), firs_core::invoice::xml::XmlError>(())
/// ```
pub fn parse_document(xml: &str) -> Result<XmlDocument, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut prolog = Vec::new();
    let mut epilog = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| XmlError::Syntax {
            position: reader.error_position(),
            message: e.to_string(),
        })?;
        let position = reader.buffer_position();
        match event {
            Event::Start(start) => {
                if stack.is_empty() && root.is_some() {
                    return Err(XmlError::MultipleRoots);
                }
                stack.push(element_from_start(&start, position)?);
            }
            Event::Empty(start) => {
                let element = element_from_start(&start, position)?;
                attach(&mut stack, &mut root, Node::Element(element))?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| XmlError::Syntax {
                    position,
                    message: "unexpected end tag".into(),
                })?;
                attach(&mut stack, &mut root, Node::Element(element))?;
            }
            Event::Text(text) => {
                let raw = std::str::from_utf8(&text).map_err(|_| XmlError::Utf8)?;
                if let Some(parent) = stack.last_mut() {
                    let value = unescape(&normalize_newlines(raw))
                        .map_err(|e| XmlError::Escape(e.to_string()))?
                        .into_owned();
                    push_text(parent, value);
                } else if !raw.trim().is_empty() {
                    return Err(XmlError::TextOutsideRoot);
                }
            }
            Event::CData(data) => {
                let raw = std::str::from_utf8(&data).map_err(|_| XmlError::Utf8)?;
                match stack.last_mut() {
                    Some(parent) => push_text(parent, normalize_newlines(raw)),
                    None => return Err(XmlError::TextOutsideRoot),
                }
            }
            Event::Comment(comment) => {
                let raw = std::str::from_utf8(&comment).map_err(|_| XmlError::Utf8)?;
                let node = Node::Comment(normalize_newlines(raw));
                misc(&mut stack, &root, &mut prolog, &mut epilog, node);
            }
            Event::PI(pi) => {
                let target = std::str::from_utf8(pi.target()).map_err(|_| XmlError::Utf8)?;
                let data = std::str::from_utf8(pi.content()).map_err(|_| XmlError::Utf8)?;
                let node = Node::ProcessingInstruction {
                    target: target.to_string(),
                    data: normalize_newlines(data.trim_start()),
                };
                misc(&mut stack, &root, &mut prolog, &mut epilog, node);
            }
            Event::Decl(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    if let Some(open) = stack.pop() {
        return Err(XmlError::Unclosed(open.name));
    }
    let root = root.ok_or(XmlError::MissingRoot)?;
    Ok(XmlDocument {
        prolog,
        root,
        epilog,
    })
}

/// Location of the root element's closing markup in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RootClose {
    /// Byte offset of the `</` that starts the root end tag.
    EndTag { start: usize },
    /// Byte range of the `/>` of a self-closing root element.
    SelfClosing { start: usize, end: usize },
}

/// Find where the root element closes, so content can be spliced in as its
/// last child without reserializing the document.
pub(crate) fn root_close(xml: &str) -> Result<(String, RootClose), XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut root_name = None;
    loop {
        let event = reader.read_event().map_err(|e| XmlError::Syntax {
            position: reader.error_position(),
            message: e.to_string(),
        })?;
        let end = reader.buffer_position() as usize;
        match event {
            Event::Start(start) => {
                if depth == 0 {
                    root_name = Some(qname(&start)?);
                }
                depth += 1;
            }
            Event::Empty(start) if depth == 0 => {
                let name = qname(&start)?;
                return Ok((
                    name,
                    RootClose::SelfClosing {
                        start: end - 2,
                        end,
                    },
                ));
            }
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    let start = xml[..end].rfind("</").ok_or(XmlError::MissingRoot)?;
                    let name = root_name.ok_or(XmlError::MissingRoot)?;
                    return Ok((name, RootClose::EndTag { start }));
                }
            }
            Event::Eof => return Err(XmlError::MissingRoot),
            _ => {}
        }
    }
}

fn element_from_start(start: &BytesStart<'_>, position: u64) -> Result<Element, XmlError> {
    let mut element = Element::new(qname(start)?);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Attribute {
            position,
            message: e.to_string(),
        })?;
        let name = std::str::from_utf8(attr.key.as_ref()).map_err(|_| XmlError::Utf8)?;
        let raw = std::str::from_utf8(&attr.value).map_err(|_| XmlError::Utf8)?;
        let normalized = normalize_newlines(raw).replace(['\t', '\n'], " ");
        let value = unescape(&normalized)
            .map_err(|e| XmlError::Escape(e.to_string()))?
            .into_owned();
        element.attributes.push(Attribute {
            name: name.to_string(),
            value,
        });
    }
    Ok(element)
}

fn qname(start: &BytesStart<'_>) -> Result<String, XmlError> {
    std::str::from_utf8(start.name().as_ref())
        .map(str::to_string)
        .map_err(|_| XmlError::Utf8)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    node: Node,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_some() {
                return Err(XmlError::MultipleRoots);
            }
            if let Node::Element(element) = node {
                *root = Some(element);
            }
        }
    }
    Ok(())
}

fn misc(
    stack: &mut [Element],
    root: &Option<Element>,
    prolog: &mut Vec<Node>,
    epilog: &mut Vec<Node>,
    node: Node,
) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_some() => epilog.push(node),
        None => prolog.push(node),
    }
}

fn push_text(parent: &mut Element, value: String) {
    if let Some(Node::Text(existing)) = parent.children.last_mut() {
        existing.push_str(&value);
    } else {
        parent.children.push(Node::Text(value));
    }
}

fn normalize_newlines(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n")
}
