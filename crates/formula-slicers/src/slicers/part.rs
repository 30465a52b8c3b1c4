//! Slicer list parts (`xl/slicers/slicer{N}.xml`).
//!
//! One part per sheet and slicer-list flavour holds a `<slicer>` entry per slicer. Entries are
//! edited in place so attributes written by other producers (style, column count, revision
//! uids) are preserved.

use crate::package::XlsxError;
use crate::schema::{NS_MC, NS_SPREADSHEETML, NS_X14, NS_XR10};
use crate::xml::{self, escape_attr, qualified};

/// Row height, in EMU, Excel uses for new slicers.
pub const DEFAULT_SLICER_ROW_HEIGHT: u32 = 251883;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlicerEntry {
    pub name: String,
    pub cache: String,
    pub caption: Option<String>,
    pub show_caption: bool,
    pub row_height: u32,
}

impl SlicerEntry {
    fn to_xml(&self, prefix: Option<&str>) -> String {
        let mut out = format!(
            r#"<{} name="{}" cache="{}""#,
            qualified(prefix, "slicer"),
            escape_attr(&self.name),
            escape_attr(&self.cache)
        );
        if let Some(caption) = &self.caption {
            out.push_str(&format!(r#" caption="{}""#, escape_attr(caption)));
        }
        if !self.show_caption {
            out.push_str(r#" showCaption="0""#);
        }
        out.push_str(&format!(r#" rowHeight="{}"/>"#, self.row_height));
        out
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

pub fn parse_slicer_entries(part_xml: &str) -> Result<Vec<SlicerEntry>, XlsxError> {
    let root = xml::root_element(part_xml)?;
    let mut out = Vec::new();
    for child in xml::child_elements(part_xml, &root)? {
        if child.local_name() != "slicer" {
            continue;
        }
        let attr = |name: &str| xml::attribute(part_xml, &child, name);
        out.push(SlicerEntry {
            name: attr("name")?.unwrap_or_default(),
            cache: attr("cache")?.unwrap_or_default(),
            caption: attr("caption")?,
            show_caption: attr("showCaption")?
                .as_deref()
                .and_then(parse_bool)
                .unwrap_or(true),
            row_height: attr("rowHeight")?
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_SLICER_ROW_HEIGHT),
        });
    }
    Ok(out)
}

/// Append `entry` to an existing slicer part, or start a new one.
pub fn add_slicer_entry(part_xml: Option<&str>, entry: &SlicerEntry) -> Result<String, XlsxError> {
    match part_xml {
        Some(existing) => {
            let root = xml::root_element(existing)?;
            xml::insert_child(existing, &root, &["extLst"], &entry.to_xml(root.prefix()))
        }
        None => Ok(format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<slicers xmlns="{NS_X14}" xmlns:mc="{NS_MC}" mc:Ignorable="x xr10" xmlns:x="{NS_SPREADSHEETML}" xmlns:xr10="{NS_XR10}">{}</slicers>"#,
            entry.to_xml(None)
        )),
    }
}

/// Remove every entry named `name`. Returns the rewritten part and the number of entries left.
pub fn remove_slicer_entry(part_xml: &str, name: &str) -> Result<(String, usize), XlsxError> {
    let root = xml::root_element(part_xml)?;
    let mut out = part_xml.to_string();
    let mut remaining = 0;
    // Back to front so earlier spans stay valid.
    for child in xml::child_elements(part_xml, &root)?.iter().rev() {
        if child.local_name() != "slicer" {
            continue;
        }
        if xml::attribute(part_xml, child, "name")?.as_deref() == Some(name) {
            out = xml::splice(&out, child.start, child.end, "");
        } else {
            remaining += 1;
        }
    }
    Ok((out, remaining))
}
