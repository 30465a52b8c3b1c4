use quick_xml::de::from_str;
use serde::Deserialize;

use crate::address::Range;
use crate::openxml;
use crate::package::{XlsxError, XlsxPackage};
use crate::schema::REL_TYPE_TABLE;
use crate::workbook::WorksheetPartInfo;

#[derive(Debug, Deserialize)]
#[serde(rename = "table")]
struct TableXml {
    #[serde(rename = "@id")]
    id: u32,
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "@displayName")]
    display_name: String,
    #[serde(rename = "@ref")]
    reference: String,
    #[serde(rename = "@headerRowCount")]
    header_row_count: Option<u32>,
    #[serde(rename = "tableColumns")]
    table_columns: Option<TableColumnsXml>,
}

#[derive(Debug, Deserialize)]
struct TableColumnsXml {
    #[serde(rename = "tableColumn", default)]
    columns: Vec<TableColumnXml>,
}

#[derive(Debug, Deserialize)]
struct TableColumnXml {
    #[serde(rename = "@name")]
    name: String,
}

/// A table (ListObject) and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub id: u32,
    pub name: String,
    pub display_name: String,
    pub reference: Range,
    pub has_header_row: bool,
    /// `tableColumn@name` values in column order.
    pub column_names: Vec<String>,
    /// Sheet name owning the table.
    pub sheet: String,
    pub worksheet_part: String,
    pub part: String,
}

impl TableInfo {
    /// Whether `name` refers to this table (display name or internal name).
    pub fn is_named(&self, name: &str) -> bool {
        self.display_name == name || self.name == name
    }
}

fn parse_table(xml: &str, sheet: &WorksheetPartInfo, part: &str) -> Result<TableInfo, XlsxError> {
    let table: TableXml = from_str(xml)?;
    let reference = Range::from_a1(&table.reference)
        .map_err(|e| XlsxError::Invalid(format!("table {part} has invalid ref: {e}")))?;
    Ok(TableInfo {
        id: table.id,
        name: table.name.unwrap_or_else(|| table.display_name.clone()),
        display_name: table.display_name,
        reference,
        has_header_row: table.header_row_count != Some(0),
        column_names: table
            .table_columns
            .map(|cols| cols.columns.into_iter().map(|c| c.name).collect())
            .unwrap_or_default(),
        sheet: sheet.name.clone(),
        worksheet_part: sheet.worksheet_part.clone(),
        part: part.to_string(),
    })
}

impl XlsxPackage {
    /// Tables attached to `sheet` through its relationships, in relationship order.
    pub(crate) fn tables_on_sheet(&self, sheet: &WorksheetPartInfo) -> Result<Vec<TableInfo>, XlsxError> {
        let mut out = Vec::new();
        for (_, part) in openxml::targets_of_type(self, &sheet.worksheet_part, REL_TYPE_TABLE)? {
            let Some(xml) = self.part_str(&part)? else {
                continue;
            };
            out.push(parse_table(&xml, sheet, &part)?);
        }
        Ok(out)
    }

    /// Every table in the workbook.
    pub fn tables(&self) -> Result<Vec<TableInfo>, XlsxError> {
        let mut out = Vec::new();
        for sheet in self.worksheet_parts()? {
            out.extend(self.tables_on_sheet(&sheet)?);
        }
        Ok(out)
    }

    /// Field names of a table: its header row, or the column names when it has none. The order
    /// stops at the first empty header cell.
    pub(crate) fn table_field_order(&self, table: &TableInfo) -> Result<Vec<String>, XlsxError> {
        let names = if table.has_header_row {
            self.header_row_values(&table.worksheet_part, &table.reference)?
        } else {
            table.column_names.clone()
        };
        Ok(names.into_iter().take_while(|name| !name.is_empty()).collect())
    }
}
