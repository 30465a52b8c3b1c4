//! Byte-span scanning and splicing helpers for surgical XML edits.
//!
//! Slicer bookkeeping touches parts we only partially understand (worksheets, workbooks, caches).
//! Rather than round-tripping those parts through a model, we locate element spans with a
//! streaming reader and splice new content in, leaving every other byte untouched.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::XlsxError;

/// Location of one element inside a source string. All offsets are byte offsets into the
/// string the span was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ElementSpan {
    /// Qualified name as written (e.g. `x:extLst`).
    pub name: String,
    /// Offset of the opening `<`.
    pub start: usize,
    /// Offset just past the `>` of the start tag.
    pub start_tag_end: usize,
    /// Offset of the `</` of the end tag (equal to `end` for self-closing elements).
    pub content_end: usize,
    /// Offset just past the element.
    pub end: usize,
    pub empty: bool,
}

impl ElementSpan {
    pub fn local_name(&self) -> &str {
        local_name_str(&self.name)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.rsplit_once(':').map(|(prefix, _)| prefix)
    }

    pub fn inner<'a>(&self, xml: &'a str) -> &'a str {
        if self.empty {
            ""
        } else {
            &xml[self.start_tag_end..self.content_end]
        }
    }

    pub fn outer<'a>(&self, xml: &'a str) -> &'a str {
        &xml[self.start..self.end]
    }

    pub fn start_tag<'a>(&self, xml: &'a str) -> &'a str {
        &xml[self.start..self.start_tag_end]
    }
}

pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

pub(crate) fn local_name_str(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

/// Build `prefix:local` (or just `local` when `prefix` is `None`).
pub(crate) fn qualified(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
        _ => local.to_string(),
    }
}

pub(crate) fn escape_attr(value: &str) -> String {
    escape(value).into_owned()
}

/// Scan the top-level elements of `xml`, reporting offsets shifted by `base`.
fn scan_top_level(xml: &str, base: usize) -> Result<Vec<ElementSpan>, XlsxError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut open: Option<(String, usize, usize)> = None;

    loop {
        let event = reader.read_event()?;
        let after = reader.buffer_position() as usize;
        match event {
            Event::Start(e) => {
                if depth == 0 {
                    let start = xml[..after].rfind('<').unwrap_or(0);
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    open = Some((name, start, after));
                }
                depth += 1;
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some((name, start, start_tag_end)) = open.take() {
                        let content_end = xml[..after].rfind("</").unwrap_or(start_tag_end);
                        out.push(ElementSpan {
                            name,
                            start: base + start,
                            start_tag_end: base + start_tag_end,
                            content_end: base + content_end,
                            end: base + after,
                            empty: false,
                        });
                    }
                }
            }
            Event::Empty(e) => {
                if depth == 0 {
                    let start = xml[..after].rfind('<').unwrap_or(0);
                    out.push(ElementSpan {
                        name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                        start: base + start,
                        start_tag_end: base + after,
                        content_end: base + after,
                        end: base + after,
                        empty: true,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out)
}

/// Locate the document element.
pub(crate) fn root_element(xml: &str) -> Result<ElementSpan, XlsxError> {
    scan_top_level(xml, 0)?
        .into_iter()
        .next()
        .ok_or_else(|| XlsxError::Invalid("xml document has no root element".to_string()))
}

/// Direct child elements of `parent`, in document order.
pub(crate) fn child_elements(
    xml: &str,
    parent: &ElementSpan,
) -> Result<Vec<ElementSpan>, XlsxError> {
    if parent.empty {
        return Ok(Vec::new());
    }
    scan_top_level(
        &xml[parent.start_tag_end..parent.content_end],
        parent.start_tag_end,
    )
}

pub(crate) fn find_child(
    xml: &str,
    parent: &ElementSpan,
    local: &str,
) -> Result<Option<ElementSpan>, XlsxError> {
    Ok(child_elements(xml, parent)?
        .into_iter()
        .find(|child| child.local_name() == local))
}

/// Unescaped attributes of an element's start tag, keyed by qualified name.
pub(crate) fn attributes(xml: &str, span: &ElementSpan) -> Result<Vec<(String, String)>, XlsxError> {
    let mut reader = Reader::from_str(span.start_tag(xml));
    let mut out = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                for attr in e.attributes().with_checks(false) {
                    let attr = attr?;
                    out.push((
                        String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                        attr.unescape_value()?.into_owned(),
                    ));
                }
                break;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// Value of the attribute whose *local* name is `local`.
pub(crate) fn attribute(
    xml: &str,
    span: &ElementSpan,
    local: &str,
) -> Result<Option<String>, XlsxError> {
    Ok(attributes(xml, span)?
        .into_iter()
        .find(|(key, _)| local_name_str(key) == local && !key.starts_with("xmlns"))
        .map(|(_, value)| value))
}

pub(crate) fn splice(xml: &str, start: usize, end: usize, replacement: &str) -> String {
    let mut out = String::with_capacity(xml.len() + replacement.len());
    out.push_str(&xml[..start]);
    out.push_str(replacement);
    out.push_str(&xml[end..]);
    out
}

/// Insert `fragment` as the last child of `parent`, or before the first child whose local name
/// appears in `before`. Self-closing parents are expanded.
pub(crate) fn insert_child(
    xml: &str,
    parent: &ElementSpan,
    before: &[&str],
    fragment: &str,
) -> Result<String, XlsxError> {
    if parent.empty {
        let tag = parent.start_tag(xml);
        let open = tag
            .trim_end_matches('>')
            .trim_end()
            .trim_end_matches('/')
            .trim_end();
        let expanded = format!("{open}>{fragment}</{}>", parent.name);
        return Ok(splice(xml, parent.start, parent.end, &expanded));
    }

    let at = child_elements(xml, parent)?
        .into_iter()
        .find(|child| before.contains(&child.local_name()))
        .map(|child| child.start)
        .unwrap_or(parent.content_end);
    Ok(splice(xml, at, at, fragment))
}

/// Ensure the document element declares `xmlns:{prefix}="{uri}"`.
pub(crate) fn ensure_root_namespace(xml: &str, prefix: &str, uri: &str) -> Result<String, XlsxError> {
    let root = root_element(xml)?;
    let key = format!("xmlns:{prefix}");
    if attributes(xml, &root)?.iter().any(|(k, _)| *k == key) {
        return Ok(xml.to_string());
    }

    let tag = root.start_tag(xml);
    let insert_at = if root.empty {
        let trimmed = tag.trim_end_matches('>').trim_end_matches('/').trim_end();
        root.start + trimmed.len()
    } else {
        let trimmed = tag.trim_end_matches('>').trim_end();
        root.start + trimmed.len()
    };
    Ok(splice(
        xml,
        insert_at,
        insert_at,
        &format!(" {key}=\"{}\"", escape_attr(uri)),
    ))
}
