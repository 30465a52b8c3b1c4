//! Pivot-table metadata needed to attach slicers: pivot names, their cache definitions, the
//! cache's worksheet source and the pivot-cache extension id.

use crate::address::Range;
use crate::ext_list::{self, ExtensionList, KnownExtension};
use crate::openxml;
use crate::package::{XlsxError, XlsxPackage};
use crate::schema::{
    EXT_URI_PIVOT_CACHE_DEFINITION, PIVOT_CACHE_PART_PREFIX, REL_TYPE_PIVOT_CACHE_DEFINITION,
    REL_TYPE_PIVOT_TABLE,
};
use crate::workbook::WorksheetPartInfo;
use crate::xml;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotTableInfo {
    pub name: String,
    pub part: String,
    pub cache_definition_part: String,
    /// Sheet name hosting the pivot table.
    pub sheet: String,
    pub sheet_id: u32,
}

/// `cacheSource/worksheetSource` of a pivot cache definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorksheetSource {
    pub reference: Option<String>,
    pub sheet: Option<String>,
    /// Table or defined name used instead of `ref`/`sheet`.
    pub name: Option<String>,
}

pub fn parse_worksheet_source(cache_xml: &str) -> Result<Option<WorksheetSource>, XlsxError> {
    let doc = roxmltree::Document::parse(cache_xml)?;
    Ok(doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "worksheetSource")
        .map(|node| WorksheetSource {
            reference: node.attribute("ref").map(str::to_string),
            sheet: node.attribute("sheet").map(str::to_string),
            name: node.attribute("name").map(str::to_string),
        }))
}

/// Split `Sheet1!$A$1:$C$9` (or `'My Sheet'!A1:C9`) into sheet and range.
fn split_sheet_reference(formula: &str) -> Option<(String, &str)> {
    let (sheet, range) = formula.trim().trim_start_matches('=').rsplit_once('!')?;
    let sheet = sheet
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .map(|s| s.replace("''", "'"))
        .unwrap_or_else(|| sheet.to_string());
    Some((sheet, range))
}

impl XlsxPackage {
    pub(crate) fn pivot_tables_on_sheet(
        &self,
        sheet: &WorksheetPartInfo,
    ) -> Result<Vec<PivotTableInfo>, XlsxError> {
        let mut out = Vec::new();
        for (_, part) in openxml::targets_of_type(self, &sheet.worksheet_part, REL_TYPE_PIVOT_TABLE)? {
            let Some(definition) = self.part_str(&part)? else {
                continue;
            };
            let root = xml::root_element(&definition)?;
            let Some(name) = xml::attribute(&definition, &root, "name")? else {
                continue;
            };
            let Some((_, cache_definition_part)) =
                openxml::targets_of_type(self, &part, REL_TYPE_PIVOT_CACHE_DEFINITION)?
                    .into_iter()
                    .next()
            else {
                log::warn!("pivot table {part} has no cache definition relationship");
                continue;
            };
            out.push(PivotTableInfo {
                name,
                part,
                cache_definition_part,
                sheet: sheet.name.clone(),
                sheet_id: sheet.sheet_id,
            });
        }
        Ok(out)
    }

    /// Every pivot table in the workbook.
    pub fn pivot_tables(&self) -> Result<Vec<PivotTableInfo>, XlsxError> {
        let mut out = Vec::new();
        for sheet in self.worksheet_parts()? {
            out.extend(self.pivot_tables_on_sheet(&sheet)?);
        }
        Ok(out)
    }

    /// Field names of the pivot table's source range, read from its header row.
    pub(crate) fn pivot_field_order(&self, pivot: &PivotTableInfo) -> Result<Vec<String>, XlsxError> {
        let cache_xml = self
            .part_str(&pivot.cache_definition_part)?
            .ok_or_else(|| XlsxError::MissingPart(pivot.cache_definition_part.clone()))?;
        let source = parse_worksheet_source(&cache_xml)?.ok_or_else(|| {
            XlsxError::Invalid(format!(
                "pivot cache {} has no worksheet source",
                pivot.cache_definition_part
            ))
        })?;

        if let (Some(reference), Some(sheet)) = (&source.reference, &source.sheet) {
            return self.range_field_order(sheet, reference);
        }

        let name = source.name.ok_or_else(|| {
            XlsxError::Invalid(format!(
                "pivot cache {} has an empty worksheet source",
                pivot.cache_definition_part
            ))
        })?;
        if let Some(table) = self.tables()?.into_iter().find(|t| t.is_named(&name)) {
            return self.table_field_order(&table);
        }
        let defined = self
            .defined_names()?
            .into_iter()
            .find(|dn| dn.name.eq_ignore_ascii_case(&name))
            .ok_or_else(|| XlsxError::Invalid(format!("pivot source {name} does not resolve")))?;
        let (sheet, reference) = split_sheet_reference(&defined.formula).ok_or_else(|| {
            XlsxError::Invalid(format!("defined name {name} is not a sheet range"))
        })?;
        self.range_field_order(&sheet, reference)
    }

    fn range_field_order(&self, sheet: &str, reference: &str) -> Result<Vec<String>, XlsxError> {
        let sheet = self.worksheet_part_for(sheet)?;
        let range = Range::from_a1(reference)
            .map_err(|e| XlsxError::Invalid(format!("invalid pivot source {reference}: {e}")))?;
        Ok(self
            .header_row_values(&sheet.worksheet_part, &range)?
            .into_iter()
            .take_while(|name| !name.is_empty())
            .collect())
    }

    /// The `x14:pivotCacheDefinition@pivotCacheId` of a pivot cache, decoded leniently.
    fn pivot_cache_ext_id(&self, cache_part: &str) -> Option<u32> {
        let xml = self.part_str(cache_part).ok().flatten()?;
        let inner = ext_list::part_ext_list(&xml).ok().flatten()?;
        let list = ExtensionList::parse(&inner).ok()?;
        match list.find(EXT_URI_PIVOT_CACHE_DEFINITION)?.decode() {
            Ok(Some(KnownExtension::PivotCacheDefinition { pivot_cache_id })) => Some(pivot_cache_id),
            _ => None,
        }
    }

    /// Return the pivot cache's extension id, assigning `max + 1` over all pivot caches when it
    /// has none yet.
    pub(crate) fn ensure_pivot_cache_ext_id(&self, cache_part: &str) -> Result<u32, XlsxError> {
        if let Some(id) = self.pivot_cache_ext_id(cache_part) {
            return Ok(id);
        }

        let next = self
            .part_names()
            .iter()
            .filter(|name| name.starts_with(PIVOT_CACHE_PART_PREFIX) && !name.contains("/_rels/"))
            .filter_map(|name| self.pivot_cache_ext_id(name))
            .max()
            .unwrap_or(0)
            + 1;

        let xml = self
            .part_str(cache_part)?
            .ok_or_else(|| XlsxError::MissingPart(cache_part.to_string()))?;
        let inner = ext_list::part_ext_list(&xml)?.unwrap_or_default();
        let block = KnownExtension::PivotCacheDefinition {
            pivot_cache_id: next,
        }
        .to_block(EXT_URI_PIVOT_CACHE_DEFINITION);
        let inner = ext_list::merge_fragment(&inner, block, &[])?;
        let updated = ext_list::replace_part_ext_list(&xml, &inner)?;
        self.set_part(cache_part, updated.into_bytes());
        log::debug!("assigned pivot cache id {next} to {cache_part}");
        Ok(next)
    }
}
