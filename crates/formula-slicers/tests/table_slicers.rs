mod support;

use std::collections::BTreeMap;

use formula_slicers::schema::{EXT_URI_SLICER_CACHES_X15, EXT_URI_SLICER_LIST_X15};
use formula_slicers::{overrides, ErrorKind, SlicerOptions, XlsxError, XlsxPackage};
use pretty_assertions::assert_eq;
use support::slicer_workbook_builder::SlicerWorkbookBuilder;

const SALES: &[&[&str]] = &[
    &["Date", "Region", "Units"],
    &["2024-01-01", "East", "10"],
    &["2024-01-02", "West", "12"],
    &["2024-01-03", "East", "7"],
];

fn sales_workbook() -> XlsxPackage {
    SlicerWorkbookBuilder::new()
        .sheet("Sheet1", SALES)
        .table("Sheet1", 1, "Table1", "A1:C4")
        .build_package()
}

fn snapshot(pkg: &XlsxPackage) -> BTreeMap<String, Vec<u8>> {
    pkg.part_names()
        .into_iter()
        .filter_map(|name| pkg.part(&name).map(|bytes| (name, bytes)))
        .collect()
}

fn part(pkg: &XlsxPackage, name: &str) -> String {
    pkg.part_str(name)
        .unwrap()
        .unwrap_or_else(|| panic!("missing part {name}"))
}

fn has_override(pkg: &XlsxPackage, part_name: &str) -> bool {
    overrides(pkg)
        .unwrap()
        .iter()
        .any(|(name, _)| name == part_name)
}

#[test]
fn first_slicer_creates_cache_part_drawing_and_defined_name() {
    let pkg = sales_workbook();
    pkg.add_slicer("Sheet1", &SlicerOptions::new("Region", "E1", "Sheet1", "Table1"))
        .unwrap();
    pkg.flush_drawings().unwrap();

    let cache = part(&pkg, "xl/slicerCaches/slicerCache1.xml");
    assert!(cache.contains(r#"name="Slicer_Region""#));
    assert!(cache.contains(r#"sourceName="Region""#));
    assert!(cache.contains(r#"tableId="1" column="2""#));

    let slicers = part(&pkg, "xl/slicers/slicer1.xml");
    assert!(slicers.contains(r#"name="Region" cache="Slicer_Region""#));
    assert!(slicers.contains(r#"rowHeight="251883""#));

    let drawing = part(&pkg, "xl/drawings/drawing1.xml");
    assert!(drawing.contains(r#"name="Region""#));
    assert!(drawing.contains(r#"Requires="sle15""#));

    for name in [
        "/xl/slicerCaches/slicerCache1.xml",
        "/xl/slicers/slicer1.xml",
        "/xl/drawings/drawing1.xml",
    ] {
        assert!(has_override(&pkg, name), "no content type for {name}");
    }

    let names = pkg.defined_names().unwrap();
    let cache_name = names.iter().find(|dn| dn.name == "Slicer_Region").unwrap();
    assert_eq!(cache_name.local_sheet_id, None);
    assert_eq!(cache_name.formula, "#N/A");

    let sheet = part(&pkg, "xl/worksheets/sheet1.xml");
    assert!(sheet.contains(EXT_URI_SLICER_LIST_X15));
    assert!(sheet.contains("<drawing r:id="));
    let workbook = part(&pkg, "xl/workbook.xml");
    assert!(workbook.contains(EXT_URI_SLICER_CACHES_X15));
}

#[test]
fn second_slicer_on_same_field_shares_cache_and_gets_suffixed_name() {
    let pkg = sales_workbook();
    let options = SlicerOptions::new("Region", "E1", "Sheet1", "Table1");
    pkg.add_slicer("Sheet1", &options).unwrap();
    pkg.add_slicer("Sheet1", &options).unwrap();
    pkg.add_slicer("Sheet1", &options).unwrap();

    let slicers = pkg.get_slicers("Sheet1").unwrap();
    let names: Vec<&str> = slicers.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Region", "Region 1", "Region 2"]);
    assert!(slicers.iter().all(|s| s.cache_name == "Slicer_Region"));
    assert!(slicers.iter().all(|s| s.slicer_part() == "xl/slicers/slicer1.xml"));

    assert!(!pkg.has_part("xl/slicerCaches/slicerCache2.xml"));
    assert!(!pkg.has_part("xl/slicers/slicer2.xml"));
    let cache_names = pkg
        .defined_names()
        .unwrap()
        .into_iter()
        .filter(|dn| dn.name.starts_with("Slicer_"))
        .count();
    assert_eq!(cache_names, 1);
}

#[test]
fn different_fields_get_their_own_caches() {
    let pkg = sales_workbook();
    pkg.add_slicer("Sheet1", &SlicerOptions::new("Region", "E1", "Sheet1", "Table1"))
        .unwrap();
    pkg.add_slicer("Sheet1", &SlicerOptions::new("units", "H1", "Sheet1", "Table1"))
        .unwrap();

    let cache2 = part(&pkg, "xl/slicerCaches/slicerCache2.xml");
    assert!(cache2.contains(r#"name="Slicer_units""#));
    assert!(cache2.contains(r#"column="3""#));

    let slicers = pkg.get_slicers("Sheet1").unwrap();
    assert_eq!(slicers[1].name, "units");
    assert_eq!(slicers[1].cache_name, "Slicer_units");
}

#[test]
fn same_field_of_another_table_gets_a_suffixed_cache_name() {
    let pkg = SlicerWorkbookBuilder::new()
        .sheet("Sheet1", SALES)
        .sheet("Sheet2", SALES)
        .table("Sheet1", 1, "Table1", "A1:C4")
        .table("Sheet2", 2, "Table2", "A1:C4")
        .build_package();

    pkg.add_slicer("Sheet1", &SlicerOptions::new("Region", "E1", "Sheet1", "Table1"))
        .unwrap();
    pkg.add_slicer("Sheet1", &SlicerOptions::new("Region", "E12", "Sheet2", "Table2"))
        .unwrap();

    let slicers = pkg.get_slicers("Sheet1").unwrap();
    assert_eq!(
        slicers
            .iter()
            .map(|s| (s.name.as_str(), s.cache_name.as_str(), s.table_name.as_deref()))
            .collect::<Vec<_>>(),
        vec![
            ("Region", "Slicer_Region", Some("Table1")),
            ("Region 1", "Slicer_Region1", Some("Table2")),
        ]
    );
    assert_eq!(slicers[1].table_sheet.as_deref(), Some("Sheet2"));
}

#[test]
fn added_slicer_reads_back() {
    let pkg = sales_workbook();
    let mut options = SlicerOptions::new("Region", "E1", "Sheet1", "Table1");
    options.caption = Some("Pick a region".into());
    options.macro_name = Some("Button1_Click".into());
    options.display_header = Some(false);
    options.item_desc = true;
    pkg.add_slicer("Sheet1", &options).unwrap();

    let slicers = pkg.get_slicers("Sheet1").unwrap();
    assert_eq!(slicers.len(), 1);
    let slicer = &slicers[0];
    assert_eq!(slicer.name, "Region");
    assert_eq!(slicer.cell.as_deref(), Some("E1"));
    assert_eq!(slicer.table_sheet.as_deref(), Some("Sheet1"));
    assert_eq!(slicer.table_name.as_deref(), Some("Table1"));
    assert_eq!(slicer.caption.as_deref(), Some("Pick a region"));
    assert_eq!(slicer.macro_name.as_deref(), Some("Button1_Click"));
    assert!(!slicer.display_header);
    assert!(slicer.item_desc);
    assert_eq!(slicer.sheet(), "Sheet1");

    let cache = part(&pkg, "xl/slicerCaches/slicerCache1.xml");
    assert!(cache.contains(r#"sortOrder="descending""#));
}

#[test]
fn slicers_survive_a_write_and_reload() {
    let pkg = sales_workbook();
    pkg.add_slicer("Sheet1", &SlicerOptions::new("Region", "E1", "Sheet1", "Table1"))
        .unwrap();
    pkg.add_slicer("Sheet1", &SlicerOptions::new("Units", "H3", "Sheet1", "Table1"))
        .unwrap();
    let before = pkg.get_slicers("Sheet1").unwrap();

    let reloaded = XlsxPackage::from_bytes(&pkg.write_to_bytes().unwrap()).unwrap();
    assert_eq!(reloaded.get_slicers("Sheet1").unwrap(), before);
    assert_eq!(before[1].cell.as_deref(), Some("H3"));
}

#[test]
fn slicer_on_a_sheet_with_an_existing_drawing_appends_to_it() {
    let chart_drawing = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><xdr:twoCellAnchor><xdr:from><xdr:col>0</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>5</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from><xdr:to><xdr:col>4</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>15</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:to><xdr:graphicFrame macro=""><xdr:nvGraphicFramePr><xdr:cNvPr id="2" name="Chart 1"/><xdr:cNvGraphicFramePr/></xdr:nvGraphicFramePr><xdr:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/></xdr:xfrm><a:graphic/></xdr:graphicFrame><xdr:clientData/></xdr:twoCellAnchor></xdr:wsDr>"#;
    let pkg = SlicerWorkbookBuilder::new()
        .sheet("Sheet1", SALES)
        .table("Sheet1", 1, "Table1", "A1:C4")
        .drawing("Sheet1", chart_drawing)
        .build_package();

    pkg.add_slicer("Sheet1", &SlicerOptions::new("Region", "E1", "Sheet1", "Table1"))
        .unwrap();
    pkg.flush_drawings().unwrap();

    assert!(!pkg.has_part("xl/drawings/drawing2.xml"));
    let drawing = part(&pkg, "xl/drawings/drawing1.xml");
    assert!(drawing.contains(r#"name="Chart 1""#));
    assert!(drawing.contains(r#"<xdr:cNvPr id="3" name="Region""#));
    assert!(drawing.find("Chart 1").unwrap() < drawing.find(r#"name="Region""#).unwrap());
}

#[test]
fn sheet_extension_blocks_keep_their_priority_order() {
    let conditional = r#"<ext uri="{78C0D931-6437-407d-A8EE-F0AAD7539E65}" xmlns:x14="http://schemas.microsoft.com/office/spreadsheetml/2009/9/main"><x14:conditionalFormattings/></ext>"#;
    let unknown =
        r#"<ext uri="{C0FFEE00-0000-4000-8000-000000000000}"><custom xmlns="urn:custom" keep="1"/></ext>"#;
    let pkg = SlicerWorkbookBuilder::new()
        .sheet("Sheet1", SALES)
        .table("Sheet1", 1, "Table1", "A1:C4")
        .sheet_ext_list("Sheet1", format!("{unknown}{conditional}"))
        .build_package();

    pkg.add_slicer("Sheet1", &SlicerOptions::new("Region", "E1", "Sheet1", "Table1"))
        .unwrap();

    let sheet = part(&pkg, "xl/worksheets/sheet1.xml");
    let conditional_at = sheet.find("{78C0D931-6437-407d-A8EE-F0AAD7539E65}").unwrap();
    let slicers_at = sheet.find(EXT_URI_SLICER_LIST_X15).unwrap();
    let unknown_at = sheet.find("{C0FFEE00-0000-4000-8000-000000000000}").unwrap();
    assert!(conditional_at < slicers_at);
    assert!(slicers_at < unknown_at);
    assert!(sheet.contains(r#"<custom xmlns="urn:custom" keep="1"/>"#));
    assert_eq!(sheet.matches("<extLst>").count(), 1);
}

#[test]
fn invalid_requests_fail_without_writing() {
    let pkg = sales_workbook();
    let before = snapshot(&pkg);

    let err = pkg
        .add_slicer("Sheet1", &SlicerOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ParameterRequired);

    let err = pkg
        .add_slicer("Sheet1", &SlicerOptions::new("Region", "E0", "Sheet1", "Table1"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ParameterInvalid);

    let err = pkg
        .add_slicer("Nope", &SlicerOptions::new("Region", "E1", "Sheet1", "Table1"))
        .unwrap_err();
    assert!(matches!(err, XlsxError::SheetNotFound(ref name) if name == "Nope"));

    let err = pkg
        .add_slicer("Sheet1", &SlicerOptions::new("Region", "E1", "Sheet1", "Table9"))
        .unwrap_err();
    assert!(matches!(err, XlsxError::TableNotFound(_)));

    let err = pkg
        .add_slicer("Sheet1", &SlicerOptions::new("Profit", "E1", "Sheet1", "Table1"))
        .unwrap_err();
    assert!(matches!(err, XlsxError::InvalidSlicerField(ref field) if field == "Profit"));
    assert!(err.is_not_found());

    assert_eq!(snapshot(&pkg), before);
}

#[test]
fn deleting_an_unknown_slicer_changes_nothing() {
    let pkg = sales_workbook();
    pkg.add_slicer("Sheet1", &SlicerOptions::new("Region", "E1", "Sheet1", "Table1"))
        .unwrap();
    pkg.flush_drawings().unwrap();
    let before = snapshot(&pkg);

    let err = pkg.delete_slicer("Region 7").unwrap_err();
    assert!(matches!(err, XlsxError::SlicerNotFound(ref name) if name == "Region 7"));

    pkg.flush_drawings().unwrap();
    assert_eq!(snapshot(&pkg), before);
}

#[test]
fn cache_is_torn_down_with_its_last_slicer() {
    let pkg = sales_workbook();
    let options = SlicerOptions::new("Region", "E1", "Sheet1", "Table1");
    pkg.add_slicer("Sheet1", &options).unwrap();
    pkg.add_slicer("Sheet1", &options).unwrap();

    pkg.delete_slicer("Region").unwrap();
    let remaining = pkg.get_slicers("Sheet1").unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "Region 1");
    assert!(pkg.has_part("xl/slicerCaches/slicerCache1.xml"));
    assert!(pkg
        .defined_names()
        .unwrap()
        .iter()
        .any(|dn| dn.name == "Slicer_Region"));

    pkg.delete_slicer("Region 1").unwrap();
    pkg.flush_drawings().unwrap();
    assert!(pkg.get_slicers("Sheet1").unwrap().is_empty());

    for gone in ["xl/slicerCaches/slicerCache1.xml", "xl/slicers/slicer1.xml"] {
        assert!(!pkg.has_part(gone), "{gone} still present");
        assert!(!has_override(&pkg, &format!("/{gone}")));
    }
    assert!(!pkg
        .defined_names()
        .unwrap()
        .iter()
        .any(|dn| dn.name == "Slicer_Region"));

    let workbook = part(&pkg, "xl/workbook.xml");
    assert!(!workbook.contains(EXT_URI_SLICER_CACHES_X15));
    let workbook_rels = part(&pkg, "xl/_rels/workbook.xml.rels");
    assert!(!workbook_rels.contains("slicerCache"));

    let sheet = part(&pkg, "xl/worksheets/sheet1.xml");
    assert!(!sheet.contains(EXT_URI_SLICER_LIST_X15));
    let sheet_rels = part(&pkg, "xl/worksheets/_rels/sheet1.xml.rels");
    assert!(!sheet_rels.contains("slicers/slicer1.xml"));

    let drawing = part(&pkg, "xl/drawings/drawing1.xml");
    assert!(!drawing.contains("Region"));
}

#[test]
fn a_new_slicer_after_full_teardown_starts_over() {
    let pkg = sales_workbook();
    let options = SlicerOptions::new("Region", "E1", "Sheet1", "Table1");
    pkg.add_slicer("Sheet1", &options).unwrap();
    pkg.delete_slicer("Region").unwrap();
    pkg.add_slicer("Sheet1", &options).unwrap();

    let slicers = pkg.get_slicers("Sheet1").unwrap();
    assert_eq!(slicers.len(), 1);
    assert_eq!(slicers[0].name, "Region");
    assert_eq!(slicers[0].cache_name, "Slicer_Region");
    assert!(pkg.has_part("xl/slicerCaches/slicerCache1.xml"));
    assert!(pkg.has_part("xl/slicers/slicer1.xml"));
}

#[test]
fn all_slicers_spans_sheets() {
    let pkg = SlicerWorkbookBuilder::new()
        .sheet("Sheet1", SALES)
        .sheet("Dashboard", &[])
        .table("Sheet1", 1, "Table1", "A1:C4")
        .build_package();
    pkg.add_slicer("Sheet1", &SlicerOptions::new("Region", "E1", "Sheet1", "Table1"))
        .unwrap();
    pkg.add_slicer("Dashboard", &SlicerOptions::new("Region", "B2", "Sheet1", "Table1"))
        .unwrap();

    assert!(pkg.has_part("xl/slicers/slicer2.xml"));
    assert!(pkg.has_part("xl/drawings/drawing2.xml"));

    let all = pkg.all_slicers().unwrap();
    assert_eq!(
        all.iter()
            .map(|s| (s.sheet(), s.name.as_str(), s.cell.as_deref()))
            .collect::<Vec<_>>(),
        vec![("Sheet1", "Region", Some("E1")), ("Dashboard", "Region 1", Some("B2"))]
    );

    pkg.delete_slicer("Region 1").unwrap();
    assert!(pkg.get_slicers("Dashboard").unwrap().is_empty());
    assert_eq!(pkg.get_slicers("Sheet1").unwrap().len(), 1);
    assert!(pkg.has_part("xl/slicerCaches/slicerCache1.xml"));
}

#[test]
fn oversized_slicer_is_rejected_and_the_sheet_stays_usable() {
    let pkg = sales_workbook();
    let before = snapshot(&pkg);

    let mut options = SlicerOptions::new("Region", "E1", "Sheet1", "Table1");
    options.width = u32::MAX;
    options.format.offset_x = 10;
    let err = pkg.add_slicer("Sheet1", &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ParameterInvalid);
    assert_eq!(snapshot(&pkg), before);

    pkg.add_slicer("Sheet1", &SlicerOptions::new("Region", "E1", "Sheet1", "Table1"))
        .unwrap();
    pkg.delete_slicer("Region").unwrap();
}

#[test]
fn slicer_without_its_cache_part_is_not_listed() {
    let pkg = sales_workbook();
    pkg.add_slicer("Sheet1", &SlicerOptions::new("Region", "E1", "Sheet1", "Table1"))
        .unwrap();
    pkg.remove_part("xl/slicerCaches/slicerCache1.xml");

    assert_eq!(pkg.get_slicers("Sheet1").unwrap(), vec![]);
    let err = pkg.delete_slicer("Region").unwrap_err();
    assert!(matches!(err, XlsxError::SlicerNotFound(ref name) if name == "Region"));
}
