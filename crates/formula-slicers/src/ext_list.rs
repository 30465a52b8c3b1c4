//! Codec for `<extLst>` extension lists.
//!
//! An extension list is a sequence of `<ext uri="...">` blocks. Blocks are opaque: the codec
//! keeps each block's inner XML verbatim and only interprets payloads whose URI is one of the
//! slicer-related URIs (see [`KnownExtension`]), and only when asked to via
//! [`ExtensionBlock::decode`]. Lists are kept in a per-parent priority order.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::package::XlsxError;
use crate::schema::*;
use crate::xml::{self, escape_attr, local_name, qualified};

/// Canonical order of extension blocks in a worksheet `<extLst>`.
pub const WORKSHEET_EXT_URI_PRIORITY: &[&str] = &[
    EXT_URI_CONDITIONAL_FORMATTINGS,
    EXT_URI_DATA_VALIDATIONS,
    EXT_URI_SPARKLINE_GROUPS,
    EXT_URI_SLICER_LIST_X14,
    EXT_URI_PROTECTED_RANGES,
    EXT_URI_IGNORED_ERRORS,
    EXT_URI_WEB_EXTENSIONS,
    EXT_URI_SLICER_LIST_X15,
    EXT_URI_TIMELINE_REFS,
    EXT_URI_EXTERNAL_LINK_PR,
];

/// Canonical order of extension blocks in the workbook `<extLst>`.
pub const WORKBOOK_EXT_URI_PRIORITY: &[&str] = &[
    EXT_URI_PIVOT_CACHES_X14,
    EXT_URI_SLICER_CACHES_X14,
    EXT_URI_SLICER_CACHES_X15,
    EXT_URI_WORKBOOK_PR_X14A,
    EXT_URI_PIVOT_CACHES_X15,
    EXT_URI_PIVOT_TABLE_REFERENCES,
    EXT_URI_TIMELINE_CACHE_PIVOT_CACHES,
    EXT_URI_TIMELINE_CACHE_REFS,
    EXT_URI_WORKBOOK_PR_X15,
    EXT_URI_DATA_MODEL,
    EXT_URI_CALC_FEATURES,
    EXT_URI_EXTERNAL_LINK_PR,
];

/// One `<ext>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionBlock {
    /// Qualified element name as written (`ext`, `x:ext`, ...).
    pub tag: String,
    pub uri: String,
    /// `xmlns:*` declarations on the element, as `(prefix, namespace)`; prefix `""` is the
    /// default namespace.
    pub namespaces: Vec<(String, String)>,
    /// Inner XML, verbatim.
    pub content: String,
}

impl ExtensionBlock {
    pub fn new(uri: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tag: "ext".to_string(),
            uri: uri.into(),
            namespaces: Vec::new(),
            content: content.into(),
        }
    }

    pub fn with_namespace(mut self, prefix: &str, namespace: &str) -> Self {
        self.add_namespace(prefix, namespace);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    fn add_namespace(&mut self, prefix: &str, namespace: &str) {
        if !self.namespaces.iter().any(|(p, _)| p == prefix) {
            self.namespaces
                .push((prefix.to_string(), namespace.to_string()));
        }
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push('<');
        out.push_str(&self.tag);
        out.push_str(" uri=\"");
        out.push_str(&escape_attr(&self.uri));
        out.push('"');
        for (prefix, namespace) in &self.namespaces {
            if prefix.is_empty() {
                out.push_str(" xmlns=\"");
            } else {
                out.push_str(" xmlns:");
                out.push_str(prefix);
                out.push_str("=\"");
            }
            out.push_str(&escape_attr(namespace));
            out.push('"');
        }
        out.push('>');
        out.push_str(&self.content);
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
        out
    }

    /// Decode the payload when this block's URI is a slicer-related one.
    ///
    /// Returns `Ok(None)` for every other URI without looking at the content.
    pub fn decode(&self) -> Result<Option<KnownExtension>, XlsxError> {
        match self.uri.as_str() {
            EXT_URI_SLICER_LIST_X14 | EXT_URI_SLICER_LIST_X15 => Ok(Some(
                KnownExtension::SlicerList {
                    rids: collect_rids(&self.content, b"slicer")?,
                },
            )),
            EXT_URI_SLICER_CACHES_X14 | EXT_URI_SLICER_CACHES_X15 => Ok(Some(
                KnownExtension::SlicerCaches {
                    rids: collect_rids(&self.content, b"slicerCache")?,
                },
            )),
            EXT_URI_SLICER_CACHE_DEFINITION => decode_table_slicer_cache(&self.content),
            EXT_URI_PIVOT_CACHE_DEFINITION => decode_pivot_cache_definition(&self.content),
            _ => Ok(None),
        }
    }
}

/// Typed view of the extension payloads this crate reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnownExtension {
    /// Sheet-level list of slicer part relationship ids.
    SlicerList { rids: Vec<String> },
    /// Workbook-level list of slicer cache relationship ids.
    SlicerCaches { rids: Vec<String> },
    /// Table source of a slicer cache; `column` is 1-based.
    TableSlicerCache {
        table_id: u32,
        column: u32,
        sort_order: Option<String>,
    },
    PivotCacheDefinition { pivot_cache_id: u32 },
}

impl KnownExtension {
    /// Encode as an extension block for `uri`.
    ///
    /// The x15 flavours of the rid lists wrap `x14:` children in an `x15:` element, matching
    /// what Excel writes for table slicers.
    pub fn to_block(&self, uri: &str) -> ExtensionBlock {
        match self {
            KnownExtension::SlicerList { rids } => {
                rid_list_block(uri, EXT_URI_SLICER_LIST_X15, "slicerList", "slicer", rids)
            }
            KnownExtension::SlicerCaches { rids } => rid_list_block(
                uri,
                EXT_URI_SLICER_CACHES_X15,
                "slicerCaches",
                "slicerCache",
                rids,
            ),
            KnownExtension::TableSlicerCache {
                table_id,
                column,
                sort_order,
            } => {
                let sort_order = sort_order
                    .as_deref()
                    .map(|order| format!(r#" sortOrder="{}""#, escape_attr(order)))
                    .unwrap_or_default();
                ExtensionBlock::new(
                    uri,
                    format!(
                        r#"<x15:tableSlicerCache tableId="{table_id}" column="{column}"{sort_order}/>"#
                    ),
                )
                .with_namespace("x15", NS_X15)
            }
            KnownExtension::PivotCacheDefinition { pivot_cache_id } => ExtensionBlock::new(
                uri,
                format!(r#"<x14:pivotCacheDefinition pivotCacheId="{pivot_cache_id}"/>"#),
            )
            .with_namespace("x14", NS_X14),
        }
    }
}

fn rid_list_block(
    uri: &str,
    x15_uri: &str,
    list: &str,
    item: &str,
    rids: &[String],
) -> ExtensionBlock {
    let items: String = rids
        .iter()
        .map(|rid| format!(r#"<x14:{item} r:id="{}"/>"#, escape_attr(rid)))
        .collect();
    if uri == x15_uri {
        ExtensionBlock::new(
            uri,
            format!(r#"<x15:{list} xmlns:x14="{NS_X14}">{items}</x15:{list}>"#),
        )
        .with_namespace("x15", NS_X15)
    } else {
        ExtensionBlock::new(uri, format!("<x14:{list}>{items}</x14:{list}>"))
            .with_namespace("x14", NS_X14)
    }
}

fn payload_elements(
    content: &str,
    mut visit: impl FnMut(&BytesStart<'_>) -> Result<(), XlsxError>,
) -> Result<(), XlsxError> {
    let mut reader = Reader::from_str(content);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => visit(&e)?,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

fn attr_value(e: &BytesStart<'_>, local: &[u8]) -> Result<Option<String>, XlsxError> {
    for attr in e.attributes().with_checks(false) {
        let attr = attr?;
        let key = attr.key.as_ref();
        if local_name(key) == local && !key.starts_with(b"xmlns") {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn collect_rids(content: &str, item: &[u8]) -> Result<Vec<String>, XlsxError> {
    let mut rids = Vec::new();
    payload_elements(content, |e| {
        if local_name(e.name().as_ref()) == item {
            if let Some(rid) = attr_value(e, b"id")? {
                rids.push(rid);
            }
        }
        Ok(())
    })?;
    Ok(rids)
}

fn parse_u32_attr(e: &BytesStart<'_>, local: &[u8]) -> Result<Option<u32>, XlsxError> {
    match attr_value(e, local)? {
        Some(value) => value.trim().parse::<u32>().map(Some).map_err(|_| {
            XlsxError::Invalid(format!(
                "invalid {} attribute: {value}",
                String::from_utf8_lossy(local)
            ))
        }),
        None => Ok(None),
    }
}

fn decode_table_slicer_cache(content: &str) -> Result<Option<KnownExtension>, XlsxError> {
    let mut found = None;
    payload_elements(content, |e| {
        if found.is_none() && local_name(e.name().as_ref()) == b"tableSlicerCache" {
            let table_id = parse_u32_attr(e, b"tableId")?.ok_or_else(|| {
                XlsxError::Invalid("tableSlicerCache without tableId".to_string())
            })?;
            let column = parse_u32_attr(e, b"column")?.ok_or_else(|| {
                XlsxError::Invalid("tableSlicerCache without column".to_string())
            })?;
            found = Some(KnownExtension::TableSlicerCache {
                table_id,
                column,
                sort_order: attr_value(e, b"sortOrder")?,
            });
        }
        Ok(())
    })?;
    Ok(found)
}

fn decode_pivot_cache_definition(content: &str) -> Result<Option<KnownExtension>, XlsxError> {
    let mut found = None;
    payload_elements(content, |e| {
        if found.is_none() && local_name(e.name().as_ref()) == b"pivotCacheDefinition" {
            if let Some(pivot_cache_id) = parse_u32_attr(e, b"pivotCacheId")? {
                found = Some(KnownExtension::PivotCacheDefinition { pivot_cache_id });
            }
        }
        Ok(())
    })?;
    Ok(found)
}

/// An ordered extension list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionList {
    blocks: Vec<ExtensionBlock>,
}

struct OpenBlock {
    tag: String,
    uri: String,
    namespaces: Vec<(String, String)>,
    content_start: usize,
}

fn open_block(e: &BytesStart<'_>, content_start: usize) -> Result<OpenBlock, XlsxError> {
    let mut uri = String::new();
    let mut namespaces = Vec::new();
    for attr in e.attributes().with_checks(false) {
        let attr = attr?;
        let key = attr.key.as_ref();
        let value = attr.unescape_value()?.into_owned();
        if key == b"xmlns" {
            namespaces.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            namespaces.push((String::from_utf8_lossy(prefix).into_owned(), value));
        } else if local_name(key) == b"uri" {
            uri = value;
        }
    }
    Ok(OpenBlock {
        tag: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        uri,
        namespaces,
        content_start,
    })
}

impl ExtensionList {
    /// Decode the inner content of an `<extLst>` element.
    ///
    /// Empty input and input that ends inside an unfinished element decode to an empty list.
    pub fn parse(fragment: &str) -> Result<Self, XlsxError> {
        if fragment.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut reader = Reader::from_str(fragment);
        reader.config_mut().trim_text(false);

        let mut blocks = Vec::new();
        let mut depth = 0usize;
        let mut open: Option<OpenBlock> = None;

        loop {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(quick_xml::Error::Syntax(err)) => {
                    log::debug!("extension list ends mid-element ({err}); treating as empty");
                    return Ok(Self::default());
                }
                Err(err) => return Err(err.into()),
            };
            let after = reader.buffer_position() as usize;
            match event {
                Event::Start(e) => {
                    if depth == 0 && local_name(e.name().as_ref()) == b"ext" {
                        open = Some(open_block(&e, after)?);
                    }
                    depth += 1;
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        if let Some(block) = open.take() {
                            let content_end = fragment[..after]
                                .rfind("</")
                                .unwrap_or(block.content_start);
                            blocks.push(ExtensionBlock {
                                tag: block.tag,
                                uri: block.uri,
                                namespaces: block.namespaces,
                                content: fragment[block.content_start..content_end].to_string(),
                            });
                        }
                    }
                }
                Event::Empty(e) => {
                    if depth == 0 && local_name(e.name().as_ref()) == b"ext" {
                        let block = open_block(&e, after)?;
                        blocks.push(ExtensionBlock {
                            tag: block.tag,
                            uri: block.uri,
                            namespaces: block.namespaces,
                            content: String::new(),
                        });
                    }
                }
                Event::Eof => {
                    if depth > 0 {
                        log::debug!("extension list ends with {depth} open element(s); treating as empty");
                        return Ok(Self::default());
                    }
                    break;
                }
                _ => {}
            }
        }

        let mut list = Self::default();
        for block in blocks {
            // Duplicate URIs collapse onto the first occurrence.
            if list.find(&block.uri).is_none() {
                list.blocks.push(block);
            }
        }
        Ok(list)
    }

    pub fn blocks(&self) -> &[ExtensionBlock] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn find(&self, uri: &str) -> Option<&ExtensionBlock> {
        self.blocks.iter().find(|block| block.uri == uri)
    }

    /// Insert or replace the block for `block.uri`, then restore priority order.
    ///
    /// A replaced block keeps its position and tag; its namespace declarations become the union
    /// of the old and new ones.
    pub fn merge(&mut self, block: ExtensionBlock, priority: &[&str]) {
        match self.blocks.iter_mut().find(|existing| existing.uri == block.uri) {
            Some(existing) => {
                existing.content = block.content;
                for (prefix, namespace) in &block.namespaces {
                    existing.add_namespace(prefix, namespace);
                }
            }
            None => self.blocks.push(block),
        }
        self.sort(priority);
    }

    /// Stable sort by `priority`; URIs missing from the table go last.
    pub fn sort(&mut self, priority: &[&str]) {
        self.blocks.sort_by_key(|block| {
            priority
                .iter()
                .position(|uri| *uri == block.uri)
                .unwrap_or(priority.len())
        });
    }

    pub fn remove(&mut self, uri: &str) -> Option<ExtensionBlock> {
        let idx = self.blocks.iter().position(|block| block.uri == uri)?;
        Some(self.blocks.remove(idx))
    }

    pub fn retain(&mut self, keep: impl FnMut(&ExtensionBlock) -> bool) {
        self.blocks.retain(keep);
    }

    /// Serialize the blocks without an enclosing `<extLst>`.
    pub fn to_xml(&self) -> String {
        self.blocks.iter().map(ExtensionBlock::to_xml).collect()
    }
}

/// Merge `block` into the serialized list `fragment`.
pub fn merge_fragment(
    fragment: &str,
    block: ExtensionBlock,
    priority: &[&str],
) -> Result<String, XlsxError> {
    let mut list = ExtensionList::parse(fragment)?;
    list.merge(block, priority);
    Ok(list.to_xml())
}

pub fn find_in_fragment(fragment: &str, uri: &str) -> Result<Option<ExtensionBlock>, XlsxError> {
    Ok(ExtensionList::parse(fragment)?.find(uri).cloned())
}

/// Drop every block matching `predicate` from the serialized list `fragment`.
pub fn remove_from_fragment(
    fragment: &str,
    mut predicate: impl FnMut(&ExtensionBlock) -> bool,
) -> Result<String, XlsxError> {
    let mut list = ExtensionList::parse(fragment)?;
    list.retain(|block| !predicate(block));
    Ok(list.to_xml())
}

/// Inner content of the document element's `<extLst>` child.
pub(crate) fn part_ext_list(part_xml: &str) -> Result<Option<String>, XlsxError> {
    let root = xml::root_element(part_xml)?;
    Ok(xml::find_child(part_xml, &root, "extLst")?.map(|ext_lst| ext_lst.inner(part_xml).to_string()))
}

/// Replace the inner content of the document element's `<extLst>`.
///
/// A blank `inner` removes the element; a missing element is appended as the last child, using
/// the document element's prefix.
pub(crate) fn replace_part_ext_list(part_xml: &str, inner: &str) -> Result<String, XlsxError> {
    let root = xml::root_element(part_xml)?;
    let existing = xml::find_child(part_xml, &root, "extLst")?;
    let blank = inner.trim().is_empty();
    match existing {
        Some(ext_lst) if blank => Ok(xml::splice(part_xml, ext_lst.start, ext_lst.end, "")),
        Some(ext_lst) => {
            let replacement = format!("<{tag}>{inner}</{tag}>", tag = ext_lst.name);
            Ok(xml::splice(part_xml, ext_lst.start, ext_lst.end, &replacement))
        }
        None if blank => Ok(part_xml.to_string()),
        None => {
            let tag = qualified(root.prefix(), "extLst");
            xml::insert_child(part_xml, &root, &[], &format!("<{tag}>{inner}</{tag}>"))
        }
    }
}
