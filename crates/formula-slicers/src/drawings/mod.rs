//! In-memory drawing parts (`xl/drawings/drawing{N}.xml`).
//!
//! Anchors are kept as raw XML so content produced by other features (charts, pictures,
//! shapes) survives untouched. The package owns one [`DrawingPart`] per path behind a mutex;
//! callers lock it for the whole read-append-write of an anchor.

pub mod anchor;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use quick_xml::events::Event;
use quick_xml::Reader;
use roxmltree::{Document, Node};

use crate::package::{XlsxError, XlsxPackage};
use crate::schema::{NS_A, NS_RELATIONSHIPS, NS_XDR};
use crate::xml;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawingPart {
    pub path: String,
    /// Qualified name of the document element (normally `xdr:wsDr`).
    root_name: String,
    /// Namespace declarations found on the document element.
    root_xmlns: BTreeMap<String, String>,
    anchors: Vec<String>,
}

impl DrawingPart {
    pub fn new_empty(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            root_name: "xdr:wsDr".to_string(),
            root_xmlns: BTreeMap::new(),
            anchors: Vec::new(),
        }
    }

    pub fn parse(path: impl Into<String>, drawing_xml: &str) -> Result<Self, XlsxError> {
        let doc = Document::parse(drawing_xml)?;
        let root_xmlns = extract_root_xmlns(doc.root_element());

        let root = xml::root_element(drawing_xml)?;
        let anchors = xml::child_elements(drawing_xml, &root)?
            .iter()
            .map(|child| child.outer(drawing_xml).to_string())
            .collect();

        Ok(Self {
            path: path.into(),
            root_name: root.name,
            root_xmlns,
            anchors,
        })
    }

    pub fn anchors(&self) -> &[String] {
        &self.anchors
    }

    pub fn push_anchor(&mut self, anchor_xml: String) {
        self.anchors.push(anchor_xml);
    }

    pub fn remove_anchor(&mut self, index: usize) -> Option<String> {
        (index < self.anchors.len()).then(|| self.anchors.remove(index))
    }

    /// Largest `cNvPr@id` used by any anchor (0 when there are none).
    pub fn max_shape_id(&self) -> u32 {
        self.anchors
            .iter()
            .filter_map(|anchor| max_c_nv_pr_id(anchor))
            .max()
            .unwrap_or(0)
    }

    pub fn to_xml(&self) -> String {
        let mut xmlns = BTreeMap::new();
        xmlns.insert("xdr".to_string(), NS_XDR.to_string());
        xmlns.insert("a".to_string(), NS_A.to_string());
        xmlns.insert("r".to_string(), NS_RELATIONSHIPS.to_string());
        for (prefix, uri) in &self.root_xmlns {
            xmlns.insert(prefix.clone(), uri.clone());
        }

        let mut out = String::new();
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        out.push('\n');
        out.push('<');
        out.push_str(&self.root_name);
        for (prefix, uri) in xmlns {
            out.push(' ');
            if prefix.is_empty() {
                out.push_str("xmlns=\"");
            } else {
                out.push_str("xmlns:");
                out.push_str(&prefix);
                out.push_str("=\"");
            }
            out.push_str(&xml::escape_attr(&uri));
            out.push('"');
        }
        out.push('>');
        for anchor in &self.anchors {
            out.push_str(anchor);
        }
        out.push_str("</");
        out.push_str(&self.root_name);
        out.push('>');
        out
    }
}

fn extract_root_xmlns(root: Node<'_, '_>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for ns in root.namespaces() {
        let prefix = ns.name().unwrap_or("").to_string();
        out.insert(prefix, ns.uri().to_string());
    }
    out
}

fn max_c_nv_pr_id(anchor_xml: &str) -> Option<u32> {
    let mut reader = Reader::from_str(anchor_xml);
    let mut max = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() != b"cNvPr" {
                    continue;
                }
                let id = e
                    .try_get_attribute("id")
                    .ok()
                    .flatten()
                    .and_then(|a| a.unescape_value().ok())
                    .and_then(|v| v.trim().parse::<u32>().ok());
                max = max.max(id);
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    max
}

impl XlsxPackage {
    /// The shared in-memory drawing at `path`, loaded from the part store on first use (or
    /// created empty when the part does not exist yet).
    pub(crate) fn drawing(&self, path: &str) -> Result<Arc<Mutex<DrawingPart>>, XlsxError> {
        if let Some(existing) = self.drawings.get(path) {
            return Ok(Arc::clone(existing.value()));
        }
        let entry = self
            .drawings
            .entry(path.to_string())
            .or_try_insert_with(|| {
                let part = match self.part_str(path)? {
                    Some(drawing_xml) => DrawingPart::parse(path, &drawing_xml)?,
                    None => DrawingPart::new_empty(path),
                };
                Ok::<_, XlsxError>(Arc::new(Mutex::new(part)))
            })?;
        Ok(Arc::clone(entry.value()))
    }

    /// Run `f` over the drawing at `path` without loading it into the shared drawing cache.
    /// Returns `None` when the drawing does not exist.
    pub(crate) fn inspect_drawing<R>(
        &self,
        path: &str,
        f: impl FnOnce(&DrawingPart) -> R,
    ) -> Result<Option<R>, XlsxError> {
        let cached = self.drawings.get(path).map(|e| Arc::clone(e.value()));
        if let Some(drawing) = cached {
            let guard = lock_drawing(&drawing, path)?;
            return Ok(Some(f(&guard)));
        }
        match self.part_str(path)? {
            Some(drawing_xml) => Ok(Some(f(&DrawingPart::parse(path, &drawing_xml)?))),
            None => Ok(None),
        }
    }
}

pub(crate) fn lock_drawing<'a>(
    drawing: &'a Mutex<DrawingPart>,
    path: &str,
) -> Result<MutexGuard<'a, DrawingPart>, XlsxError> {
    drawing
        .lock()
        .map_err(|_| XlsxError::LockPoisoned(path.to_string()))
}
