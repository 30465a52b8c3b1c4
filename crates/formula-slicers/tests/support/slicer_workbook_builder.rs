#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use formula_slicers::XlsxPackage;

/// Test helper for constructing synthetic XLSX ZIPs with tables, pivot tables and drawings, the
/// sources slicers attach to.
///
/// Cell text is stored through `xl/sharedStrings.xml`; numeric-looking values are written as
/// plain numbers. The builder does not validate the XML it is given.
#[derive(Debug, Clone, Default)]
pub struct SlicerWorkbookBuilder {
    sheets: Vec<SheetSpec>,
    pivots: Vec<PivotSpec>,
    shared_strings: Vec<String>,
    workbook_ext_list: Option<String>,
    defined_names: Vec<(String, String)>,
    extra_parts: BTreeMap<String, Vec<u8>>,
    content_type_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct SheetSpec {
    name: String,
    rows: Vec<Vec<String>>,
    tables: Vec<TableSpec>,
    drawing_xml: Option<String>,
    ext_list: Option<String>,
}

#[derive(Debug, Clone)]
struct TableSpec {
    id: u32,
    name: String,
    reference: String,
    columns: Vec<String>,
}

#[derive(Debug, Clone)]
struct PivotSpec {
    sheet: String,
    name: String,
    source_sheet: String,
    source_ref: String,
}

pub const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PACKAGE_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

const REL_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const REL_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
const REL_TABLE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/table";
const REL_PIVOT_TABLE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/pivotTable";
const REL_PIVOT_CACHE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/pivotCacheDefinition";
const REL_DRAWING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";

impl SlicerWorkbookBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sheet whose first rows hold `rows` starting at `A1`.
    pub fn sheet(mut self, name: impl Into<String>, rows: &[&[&str]]) -> Self {
        self.sheets.push(SheetSpec {
            name: name.into(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|v| v.to_string()).collect())
                .collect(),
            tables: Vec::new(),
            drawing_xml: None,
            ext_list: None,
        });
        self
    }

    /// Add a table on `sheet`; column names are taken from the header row of `reference`.
    pub fn table(mut self, sheet: &str, id: u32, name: &str, reference: &str) -> Self {
        let columns = self.header_values(sheet, reference);
        let spec = self.sheet_mut(sheet);
        spec.tables.push(TableSpec {
            id,
            name: name.to_string(),
            reference: reference.to_string(),
            columns,
        });
        self
    }

    /// Add a pivot table on `sheet` whose cache reads `source_ref` on `source_sheet`.
    pub fn pivot_table(
        mut self,
        sheet: &str,
        name: &str,
        source_sheet: &str,
        source_ref: &str,
    ) -> Self {
        self.pivots.push(PivotSpec {
            sheet: sheet.to_string(),
            name: name.to_string(),
            source_sheet: source_sheet.to_string(),
            source_ref: source_ref.to_string(),
        });
        self
    }

    /// Give `sheet` an existing drawing part with the given XML.
    pub fn drawing(mut self, sheet: &str, drawing_xml: impl Into<String>) -> Self {
        self.sheet_mut(sheet).drawing_xml = Some(drawing_xml.into());
        self
    }

    /// Inner XML of the sheet's `<extLst>`.
    pub fn sheet_ext_list(mut self, sheet: &str, inner: impl Into<String>) -> Self {
        self.sheet_mut(sheet).ext_list = Some(inner.into());
        self
    }

    /// Inner XML of the workbook `<extLst>`.
    pub fn workbook_ext_list(mut self, inner: impl Into<String>) -> Self {
        self.workbook_ext_list = Some(inner.into());
        self
    }

    pub fn defined_name(mut self, name: &str, formula: &str) -> Self {
        self.defined_names
            .push((name.to_string(), formula.to_string()));
        self
    }

    /// Add an arbitrary extra part to the ZIP.
    pub fn part(mut self, part_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.extra_parts.insert(part_name.into(), bytes.into());
        self
    }

    pub fn content_type_override(mut self, part_name: &str, content_type: &str) -> Self {
        self.content_type_overrides
            .push((part_name.to_string(), content_type.to_string()));
        self
    }

    pub fn build_package(self) -> XlsxPackage {
        XlsxPackage::from_bytes(&self.build_bytes()).expect("synthetic workbook loads")
    }

    pub fn build_bytes(self) -> Vec<u8> {
        write_zip(self.build_parts_map())
    }

    fn sheet_mut(&mut self, sheet: &str) -> &mut SheetSpec {
        self.sheets
            .iter_mut()
            .find(|s| s.name == sheet)
            .unwrap_or_else(|| panic!("unknown sheet {sheet}"))
    }

    fn header_values(&self, sheet: &str, reference: &str) -> Vec<String> {
        let spec = self
            .sheets
            .iter()
            .find(|s| s.name == sheet)
            .unwrap_or_else(|| panic!("unknown sheet {sheet}"));
        let (start, end) = reference.split_once(':').unwrap_or((reference, reference));
        let (c0, r0) = split_cell(start);
        let (c1, _) = split_cell(end);
        (c0..=c1)
            .map(|c| {
                spec.rows
                    .get(r0)
                    .and_then(|row| row.get(c))
                    .cloned()
                    .unwrap_or_else(|| format!("Column{}", c - c0 + 1))
            })
            .collect()
    }

    fn shared_string(&mut self, value: &str) -> usize {
        match self.shared_strings.iter().position(|s| s == value) {
            Some(idx) => idx,
            None => {
                self.shared_strings.push(value.to_string());
                self.shared_strings.len() - 1
            }
        }
    }

    fn build_parts_map(mut self) -> BTreeMap<String, Vec<u8>> {
        let mut parts: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        let mut overrides: Vec<(String, String)> = vec![(
            "/xl/workbook.xml".to_string(),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"
                .to_string(),
        )];

        let sheets = std::mem::take(&mut self.sheets);
        let mut workbook_rels = Vec::new();
        let mut drawing_count = 0;

        for (idx, sheet) in sheets.iter().enumerate() {
            let n = idx + 1;
            let part_name = format!("xl/worksheets/sheet{n}.xml");
            workbook_rels.push((
                format!("rId{n}"),
                REL_WORKSHEET.to_string(),
                format!("worksheets/sheet{n}.xml"),
            ));
            overrides.push((
                format!("/{part_name}"),
                "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"
                    .to_string(),
            ));

            let mut sheet_rels = Vec::new();
            let mut table_rids = Vec::new();
            for table in &sheet.tables {
                let rid = format!("rId{}", sheet_rels.len() + 1);
                sheet_rels.push((
                    rid.clone(),
                    REL_TABLE.to_string(),
                    format!("../tables/table{}.xml", table.id),
                ));
                table_rids.push(rid);
                parts.insert(
                    format!("xl/tables/table{}.xml", table.id),
                    table_xml(table).into_bytes(),
                );
                overrides.push((
                    format!("/xl/tables/table{}.xml", table.id),
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.table+xml"
                        .to_string(),
                ));
            }

            for (p, pivot) in self.pivots.iter().enumerate() {
                if pivot.sheet != sheet.name {
                    continue;
                }
                let p = p + 1;
                let rid = format!("rId{}", sheet_rels.len() + 1);
                sheet_rels.push((
                    rid,
                    REL_PIVOT_TABLE.to_string(),
                    format!("../pivotTables/pivotTable{p}.xml"),
                ));
            }

            let mut drawing_rid = None;
            if let Some(drawing) = &sheet.drawing_xml {
                drawing_count += 1;
                let rid = format!("rId{}", sheet_rels.len() + 1);
                sheet_rels.push((
                    rid.clone(),
                    REL_DRAWING.to_string(),
                    format!("../drawings/drawing{drawing_count}.xml"),
                ));
                parts.insert(
                    format!("xl/drawings/drawing{drawing_count}.xml"),
                    drawing.clone().into_bytes(),
                );
                overrides.push((
                    format!("/xl/drawings/drawing{drawing_count}.xml"),
                    "application/vnd.openxmlformats-officedocument.drawing+xml".to_string(),
                ));
                drawing_rid = Some(rid);
            }

            let worksheet = self.worksheet_xml(sheet, drawing_rid.as_deref(), &table_rids);
            parts.insert(part_name, worksheet.into_bytes());
            if !sheet_rels.is_empty() {
                parts.insert(
                    format!("xl/worksheets/_rels/sheet{n}.xml.rels"),
                    relationships_xml(&sheet_rels).into_bytes(),
                );
            }
        }

        for (p, pivot) in self.pivots.iter().enumerate() {
            let p = p + 1;
            parts.insert(
                format!("xl/pivotTables/pivotTable{p}.xml"),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<pivotTableDefinition xmlns="{NS_MAIN}" name="{}" cacheId="{}" dataCaption="Values"><location ref="A3:B7" firstHeaderRow="1" firstDataRow="1" firstDataCol="1"/></pivotTableDefinition>"#,
                    xml_escape(&pivot.name),
                    p
                )
                .into_bytes(),
            );
            parts.insert(
                format!("xl/pivotTables/_rels/pivotTable{p}.xml.rels"),
                relationships_xml(&[(
                    "rId1".to_string(),
                    REL_PIVOT_CACHE.to_string(),
                    format!("../pivotCache/pivotCacheDefinition{p}.xml"),
                )])
                .into_bytes(),
            );
            parts.insert(
                format!("xl/pivotCache/pivotCacheDefinition{p}.xml"),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<pivotCacheDefinition xmlns="{NS_MAIN}" xmlns:r="{NS_R}" refreshOnLoad="1"><cacheSource type="worksheet"><worksheetSource ref="{}" sheet="{}"/></cacheSource></pivotCacheDefinition>"#,
                    xml_escape(&pivot.source_ref),
                    xml_escape(&pivot.source_sheet)
                )
                .into_bytes(),
            );
            workbook_rels.push((
                format!("rId{}", workbook_rels.len() + 1),
                REL_PIVOT_CACHE.to_string(),
                format!("pivotCache/pivotCacheDefinition{p}.xml"),
            ));
        }

        workbook_rels.push((
            format!("rId{}", workbook_rels.len() + 1),
            REL_SHARED_STRINGS.to_string(),
            "sharedStrings.xml".to_string(),
        ));

        parts.insert(
            "xl/workbook.xml".to_string(),
            self.workbook_xml(&sheets).into_bytes(),
        );
        parts.insert(
            "xl/_rels/workbook.xml.rels".to_string(),
            relationships_xml(&workbook_rels).into_bytes(),
        );
        parts.insert(
            "xl/sharedStrings.xml".to_string(),
            shared_strings_xml(&self.shared_strings).into_bytes(),
        );
        parts.insert("_rels/.rels".to_string(), root_rels_xml().into_bytes());

        overrides.extend(self.content_type_overrides.iter().cloned());
        parts.insert(
            "[Content_Types].xml".to_string(),
            content_types_xml(&overrides).into_bytes(),
        );

        parts.extend(self.extra_parts);
        parts
    }

    fn worksheet_xml(
        &mut self,
        sheet: &SheetSpec,
        drawing_rid: Option<&str>,
        table_rids: &[String],
    ) -> String {
        let mut out = String::new();
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        out.push('\n');
        out.push_str(&format!(r#"<worksheet xmlns="{NS_MAIN}" xmlns:r="{NS_R}">"#));
        out.push_str("<sheetData>");
        for (r, row) in sheet.rows.iter().enumerate() {
            out.push_str(&format!(r#"<row r="{}">"#, r + 1));
            for (c, value) in row.iter().enumerate() {
                let cell = format!("{}{}", col_name(c), r + 1);
                if value.is_empty() {
                    continue;
                }
                if value.parse::<f64>().is_ok() {
                    out.push_str(&format!(r#"<c r="{cell}"><v>{value}</v></c>"#));
                } else {
                    let idx = self.shared_string(value);
                    out.push_str(&format!(r#"<c r="{cell}" t="s"><v>{idx}</v></c>"#));
                }
            }
            out.push_str("</row>");
        }
        out.push_str("</sheetData>");
        if let Some(rid) = drawing_rid {
            out.push_str(&format!(r#"<drawing r:id="{rid}"/>"#));
        }
        if !table_rids.is_empty() {
            out.push_str(&format!(r#"<tableParts count="{}">"#, table_rids.len()));
            for rid in table_rids {
                out.push_str(&format!(r#"<tablePart r:id="{rid}"/>"#));
            }
            out.push_str("</tableParts>");
        }
        if let Some(ext) = &sheet.ext_list {
            out.push_str(&format!("<extLst>{ext}</extLst>"));
        }
        out.push_str("</worksheet>");
        out
    }

    fn workbook_xml(&self, sheets: &[SheetSpec]) -> String {
        let mut out = String::new();
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        out.push('\n');
        out.push_str(&format!(r#"<workbook xmlns="{NS_MAIN}" xmlns:r="{NS_R}">"#));
        out.push_str("<sheets>");
        for (idx, sheet) in sheets.iter().enumerate() {
            out.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                xml_escape(&sheet.name),
                idx + 1,
                idx + 1
            ));
        }
        out.push_str("</sheets>");
        if !self.defined_names.is_empty() {
            out.push_str("<definedNames>");
            for (name, formula) in &self.defined_names {
                out.push_str(&format!(
                    r#"<definedName name="{}">{}</definedName>"#,
                    xml_escape(name),
                    xml_escape(formula)
                ));
            }
            out.push_str("</definedNames>");
        }
        out.push_str(r#"<calcPr calcId="191029"/>"#);
        if let Some(ext) = &self.workbook_ext_list {
            out.push_str(&format!("<extLst>{ext}</extLst>"));
        }
        out.push_str("</workbook>");
        out
    }
}

fn table_xml(table: &TableSpec) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(&format!(
        r#"<table xmlns="{NS_MAIN}" id="{}" name="{}" displayName="{}" ref="{}" totalsRowShown="0">"#,
        table.id,
        xml_escape(&table.name),
        xml_escape(&table.name),
        table.reference
    ));
    out.push_str(&format!(r#"<autoFilter ref="{}"/>"#, table.reference));
    out.push_str(&format!(r#"<tableColumns count="{}">"#, table.columns.len()));
    for (idx, column) in table.columns.iter().enumerate() {
        out.push_str(&format!(
            r#"<tableColumn id="{}" name="{}"/>"#,
            idx + 1,
            xml_escape(column)
        ));
    }
    out.push_str("</tableColumns>");
    out.push_str(r#"<tableStyleInfo name="TableStyleMedium2" showRowStripes="1"/>"#);
    out.push_str("</table>");
    out
}

fn shared_strings_xml(strings: &[String]) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(&format!(
        r#"<sst xmlns="{NS_MAIN}" count="{}" uniqueCount="{}">"#,
        strings.len(),
        strings.len()
    ));
    for s in strings {
        out.push_str(&format!("<si><t>{}</t></si>", xml_escape(s)));
    }
    out.push_str("</sst>");
    out
}

fn relationships_xml(rels: &[(String, String, String)]) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(&format!(r#"<Relationships xmlns="{NS_PACKAGE_RELS}">"#));
    for (id, type_uri, target) in rels {
        out.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
            xml_escape(id),
            xml_escape(type_uri),
            xml_escape(target)
        ));
    }
    out.push_str("</Relationships>");
    out
}

fn root_rels_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#
        .to_string()
}

fn content_types_xml(overrides: &[(String, String)]) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(
        r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    );
    out.push_str(r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#);
    out.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
    for (part, content_type) in overrides {
        out.push_str(&format!(
            r#"<Override PartName="{}" ContentType="{}"/>"#,
            xml_escape(part),
            xml_escape(content_type)
        ));
    }
    out.push_str("</Types>");
    out
}

fn split_cell(cell: &str) -> (usize, usize) {
    let cell = cell.replace('$', "");
    let letters: String = cell.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = &cell[letters.len()..];
    let col = letters
        .to_ascii_uppercase()
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize)
        - 1;
    let row = digits.parse::<usize>().expect("row number") - 1;
    (col, row)
}

fn col_name(mut col: usize) -> String {
    let mut out = Vec::new();
    col += 1;
    while col > 0 {
        let rem = (col - 1) % 26;
        out.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).expect("ascii column name")
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn write_zip(parts: BTreeMap<String, Vec<u8>>) -> Vec<u8> {
    let cursor = Cursor::new(Vec::new());
    let mut zip = zip::ZipWriter::new(cursor);
    let options = zip::write::FileOptions::<()>::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for (name, bytes) in parts {
        zip.start_file(name, options).expect("start zip entry");
        zip.write_all(&bytes).expect("write zip entry");
    }

    zip.finish().expect("finish zip").into_inner()
}
