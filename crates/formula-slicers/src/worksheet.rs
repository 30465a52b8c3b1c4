//! Worksheet part edits needed by slicers: the extension list, root namespace declarations and
//! the `<drawing>` reference.

use crate::ext_list;
use crate::package::{XlsxError, XlsxPackage};
use crate::schema::NS_RELATIONSHIPS;
use crate::xml::{self, escape_attr, qualified};

/// Children of `<worksheet>` that must follow `<drawing>`.
const AFTER_DRAWING: &[&str] = &[
    "legacyDrawing",
    "legacyDrawingHF",
    "drawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
    "extLst",
];

impl XlsxPackage {
    pub(crate) fn worksheet_xml(&self, worksheet_part: &str) -> Result<String, XlsxError> {
        self.part_str(worksheet_part)?
            .ok_or_else(|| XlsxError::MissingPart(worksheet_part.to_string()))
    }

    pub(crate) fn worksheet_ext_list(&self, worksheet_part: &str) -> Result<Option<String>, XlsxError> {
        ext_list::part_ext_list(&self.worksheet_xml(worksheet_part)?)
    }

    pub(crate) fn set_worksheet_ext_list(
        &self,
        worksheet_part: &str,
        inner: &str,
    ) -> Result<(), XlsxError> {
        let updated = ext_list::replace_part_ext_list(&self.worksheet_xml(worksheet_part)?, inner)?;
        self.set_part(worksheet_part, updated.into_bytes());
        Ok(())
    }

    /// Declare `xmlns:{prefix}` on the worksheet's document element if it is missing.
    pub(crate) fn ensure_worksheet_namespace(
        &self,
        worksheet_part: &str,
        prefix: &str,
        namespace: &str,
    ) -> Result<(), XlsxError> {
        let sheet = self.worksheet_xml(worksheet_part)?;
        let updated = xml::ensure_root_namespace(&sheet, prefix, namespace)?;
        if updated != sheet {
            self.set_part(worksheet_part, updated.into_bytes());
        }
        Ok(())
    }

    /// Relationship id of the sheet's `<drawing r:id>`, if it has one.
    pub(crate) fn worksheet_drawing_rid(&self, worksheet_part: &str) -> Result<Option<String>, XlsxError> {
        let sheet = self.worksheet_xml(worksheet_part)?;
        let root = xml::root_element(&sheet)?;
        match xml::find_child(&sheet, &root, "drawing")? {
            Some(drawing) => xml::attribute(&sheet, &drawing, "id"),
            None => Ok(None),
        }
    }

    /// Insert `<drawing r:id="{rid}"/>` at its schema position.
    pub(crate) fn set_worksheet_drawing_rid(
        &self,
        worksheet_part: &str,
        rid: &str,
    ) -> Result<(), XlsxError> {
        self.ensure_worksheet_namespace(worksheet_part, "r", NS_RELATIONSHIPS)?;
        let sheet = self.worksheet_xml(worksheet_part)?;
        let root = xml::root_element(&sheet)?;
        let element = format!(
            r#"<{} r:id="{}"/>"#,
            qualified(root.prefix(), "drawing"),
            escape_attr(rid)
        );
        let updated = match xml::find_child(&sheet, &root, "drawing")? {
            Some(existing) => xml::splice(&sheet, existing.start, existing.end, &element),
            None => xml::insert_child(&sheet, &root, AFTER_DRAWING, &element)?,
        };
        self.set_part(worksheet_part, updated.into_bytes());
        Ok(())
    }
}
