//! `xl/workbook.xml`: sheet list, workbook-scope defined names and the workbook extension list.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::ext_list;
use crate::openxml;
use crate::package::{XlsxError, XlsxPackage};
use crate::path::resolve_target;
use crate::schema::REL_TYPE_WORKSHEET;
use crate::xml::{self, escape_attr, local_name, qualified};

pub const WORKBOOK_PART: &str = "xl/workbook.xml";

/// Children of `<workbook>` that must follow `<definedNames>`.
const AFTER_DEFINED_NAMES: &[&str] = &[
    "calcPr",
    "oleSize",
    "customWorkbookViews",
    "pivotCaches",
    "smartTagPr",
    "smartTagTypes",
    "webPublishing",
    "fileRecoveryPr",
    "webPublishObjects",
    "extLst",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkbookSheetInfo {
    pub name: String,
    pub sheet_id: u32,
    pub rel_id: String,
}

/// A workbook sheet whose relationship resolves to a worksheet part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorksheetPartInfo {
    pub name: String,
    pub sheet_id: u32,
    pub rel_id: String,
    /// ZIP entry name for the worksheet XML (e.g. `xl/worksheets/sheet1.xml`).
    pub worksheet_part: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefinedName {
    pub name: String,
    /// `None` for workbook scope.
    pub local_sheet_id: Option<u32>,
    pub formula: String,
}

pub fn parse_workbook_sheets(workbook_xml: &str) -> Result<Vec<WorkbookSheetInfo>, XlsxError> {
    let mut reader = Reader::from_str(workbook_xml);
    reader.config_mut().trim_text(true);

    let mut sheets = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Empty(e) | Event::Start(e) => {
                if e.local_name().as_ref() == b"sheet" {
                    sheets.push(parse_sheet_element(&e)?);
                }
            }
            _ => {}
        }
    }
    Ok(sheets)
}

fn parse_sheet_element(e: &BytesStart<'_>) -> Result<WorkbookSheetInfo, XlsxError> {
    let mut name = None;
    let mut sheet_id = None;
    let mut rel_id = None;

    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        match key {
            b"name" => name = Some(attr.unescape_value()?.into_owned()),
            b"sheetId" => {
                let v = attr.unescape_value()?;
                sheet_id = Some(
                    v.parse::<u32>()
                        .map_err(|_| XlsxError::Invalid(format!("invalid sheetId {v}")))?,
                );
            }
            _ if local_name(key) == b"id" => rel_id = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }

    Ok(WorkbookSheetInfo {
        name: name.ok_or_else(|| XlsxError::Invalid("sheet without name".to_string()))?,
        sheet_id: sheet_id.ok_or_else(|| XlsxError::Invalid("sheet without sheetId".to_string()))?,
        rel_id: rel_id.ok_or_else(|| XlsxError::Invalid("sheet without r:id".to_string()))?,
    })
}

pub fn parse_defined_names(workbook_xml: &str) -> Result<Vec<DefinedName>, XlsxError> {
    let doc = roxmltree::Document::parse(workbook_xml)?;
    let mut out = Vec::new();
    for node in doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "definedName")
    {
        let Some(name) = node.attribute("name") else {
            continue;
        };
        out.push(DefinedName {
            name: name.to_string(),
            local_sheet_id: node.attribute("localSheetId").and_then(|v| v.parse().ok()),
            formula: node.text().unwrap_or_default().to_string(),
        });
    }
    Ok(out)
}

impl XlsxPackage {
    pub(crate) fn workbook_xml(&self) -> Result<String, XlsxError> {
        self.part_str(WORKBOOK_PART)?
            .ok_or_else(|| XlsxError::MissingPart(WORKBOOK_PART.to_string()))
    }

    /// Ordered `<sheet>` entries of `xl/workbook.xml`.
    pub fn workbook_sheets(&self) -> Result<Vec<WorkbookSheetInfo>, XlsxError> {
        parse_workbook_sheets(&self.workbook_xml()?)
    }

    /// Workbook sheets backed by worksheet parts. Chartsheets and dialog sheets are skipped.
    pub fn worksheet_parts(&self) -> Result<Vec<WorksheetPartInfo>, XlsxError> {
        let relationships = openxml::relationships_for(self, WORKBOOK_PART)?;
        let mut out = Vec::new();
        for sheet in self.workbook_sheets()? {
            let Some(rel) = relationships.iter().find(|rel| rel.id == sheet.rel_id) else {
                return Err(XlsxError::Invalid(format!(
                    "missing relationship for {}",
                    sheet.rel_id
                )));
            };
            if rel.type_uri != REL_TYPE_WORKSHEET {
                continue;
            }
            out.push(WorksheetPartInfo {
                name: sheet.name,
                sheet_id: sheet.sheet_id,
                rel_id: sheet.rel_id,
                worksheet_part: resolve_target(WORKBOOK_PART, &rel.target),
            });
        }
        Ok(out)
    }

    /// Resolve a sheet name (compared case-insensitively) to its worksheet part.
    pub fn worksheet_part_for(&self, sheet: &str) -> Result<WorksheetPartInfo, XlsxError> {
        self.worksheet_parts()?
            .into_iter()
            .find(|info| info.name.to_lowercase() == sheet.to_lowercase())
            .ok_or_else(|| XlsxError::SheetNotFound(sheet.to_string()))
    }

    pub fn defined_names(&self) -> Result<Vec<DefinedName>, XlsxError> {
        parse_defined_names(&self.workbook_xml()?)
    }

    /// Append a workbook-scope `<definedName>`.
    pub(crate) fn add_defined_name(&self, name: &str, formula: &str) -> Result<(), XlsxError> {
        let workbook = self.workbook_xml()?;
        let root = xml::root_element(&workbook)?;
        let prefix = root.prefix();
        let element = format!(
            r#"<{tag} name="{}">{}</{tag}>"#,
            escape_attr(name),
            quick_xml::escape::escape(formula),
            tag = qualified(prefix, "definedName"),
        );

        let updated = match xml::find_child(&workbook, &root, "definedNames")? {
            Some(defined_names) => xml::insert_child(&workbook, &defined_names, &[], &element)?,
            None => {
                let wrapper = format!(
                    "<{tag}>{element}</{tag}>",
                    tag = qualified(prefix, "definedNames")
                );
                xml::insert_child(&workbook, &root, AFTER_DEFINED_NAMES, &wrapper)?
            }
        };
        self.set_part(WORKBOOK_PART, updated.into_bytes());
        Ok(())
    }

    /// Remove the workbook-scope defined name `name`. Returns whether one was removed; the
    /// `<definedNames>` wrapper is dropped once empty.
    pub(crate) fn delete_defined_name(&self, name: &str) -> Result<bool, XlsxError> {
        let workbook = self.workbook_xml()?;
        let root = xml::root_element(&workbook)?;
        let Some(defined_names) = xml::find_child(&workbook, &root, "definedNames")? else {
            return Ok(false);
        };
        let children = xml::child_elements(&workbook, &defined_names)?;
        for child in &children {
            if child.local_name() != "definedName" {
                continue;
            }
            let attrs = xml::attributes(&workbook, child)?;
            let is_match = attrs.iter().any(|(k, v)| k == "name" && v.eq_ignore_ascii_case(name));
            let workbook_scope = !attrs.iter().any(|(k, _)| k == "localSheetId");
            if !(is_match && workbook_scope) {
                continue;
            }
            let updated = if children.len() == 1 {
                xml::splice(&workbook, defined_names.start, defined_names.end, "")
            } else {
                xml::splice(&workbook, child.start, child.end, "")
            };
            self.set_part(WORKBOOK_PART, updated.into_bytes());
            return Ok(true);
        }
        Ok(false)
    }

    /// Inner content of the workbook `<extLst>`.
    pub(crate) fn workbook_ext_list(&self) -> Result<Option<String>, XlsxError> {
        ext_list::part_ext_list(&self.workbook_xml()?)
    }

    pub(crate) fn set_workbook_ext_list(&self, inner: &str) -> Result<(), XlsxError> {
        let updated = ext_list::replace_part_ext_list(&self.workbook_xml()?, inner)?;
        self.set_part(WORKBOOK_PART, updated.into_bytes());
        Ok(())
    }
}
