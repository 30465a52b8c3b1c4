//! Namespace URIs, relationship types, content types and extension URIs used by slicer parts.

pub const NS_SPREADSHEETML: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub const NS_X14: &str = "http://schemas.microsoft.com/office/spreadsheetml/2009/9/main";
pub const NS_X15: &str = "http://schemas.microsoft.com/office/spreadsheetml/2010/11/main";
pub const NS_XR10: &str = "http://schemas.microsoft.com/office/spreadsheetml/2016/revision10";
pub const NS_MC: &str = "http://schemas.openxmlformats.org/markup-compatibility/2006";
pub const NS_RELATIONSHIPS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub const NS_PACKAGE_RELATIONSHIPS: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships";
pub const NS_CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

pub const NS_XDR: &str = "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing";
pub const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
/// `a14`: pivot-table slicers are gated on this namespace in `mc:Choice`.
pub const NS_A14: &str = "http://schemas.microsoft.com/office/drawing/2010/main";
/// `sle15`: table slicers are gated on this namespace in `mc:Choice`.
pub const NS_SLE15: &str = "http://schemas.microsoft.com/office/drawing/2012/slicer";
/// `sle`: graphic data URI and element namespace of the slicer graphic itself.
pub const NS_SLE: &str = "http://schemas.microsoft.com/office/drawing/2010/slicer";

pub const REL_TYPE_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
pub const REL_TYPE_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
pub const REL_TYPE_TABLE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/table";
pub const REL_TYPE_PIVOT_TABLE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/pivotTable";
pub const REL_TYPE_PIVOT_CACHE_DEFINITION: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/pivotCacheDefinition";
pub const REL_TYPE_DRAWING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";
pub const REL_TYPE_SLICER: &str = "http://schemas.microsoft.com/office/2007/relationships/slicer";
pub const REL_TYPE_SLICER_CACHE: &str =
    "http://schemas.microsoft.com/office/2007/relationships/slicerCache";

pub const CONTENT_TYPE_SLICER: &str = "application/vnd.ms-excel.slicer+xml";
pub const CONTENT_TYPE_SLICER_CACHE: &str = "application/vnd.ms-excel.slicerCache+xml";
pub const CONTENT_TYPE_DRAWING: &str = "application/vnd.openxmlformats-officedocument.drawing+xml";

pub const EXT_URI_CONDITIONAL_FORMATTINGS: &str = "{78C0D931-6437-407d-A8EE-F0AAD7539E65}";
pub const EXT_URI_DATA_VALIDATIONS: &str = "{CCE6A557-97BC-4b89-ADB6-D9C93CAAB3DF}";
pub const EXT_URI_SPARKLINE_GROUPS: &str = "{05C60535-1F16-4fd2-B633-F4F36F0B64E0}";
/// Sheet-level slicer list gated on x14 (pivot-table slicers).
pub const EXT_URI_SLICER_LIST_X14: &str = "{A8765BA9-456A-4dab-B4F3-ACF838C121DE}";
pub const EXT_URI_PROTECTED_RANGES: &str = "{FC87AEE6-9EDD-4A0A-B7FB-166176984837}";
pub const EXT_URI_IGNORED_ERRORS: &str = "{01252117-D84E-4E92-8308-4BE1C098FCBB}";
pub const EXT_URI_WEB_EXTENSIONS: &str = "{F7C9EE02-42E1-4005-9D12-6889AFFD525C}";
/// Sheet-level slicer list gated on x15 (table slicers).
pub const EXT_URI_SLICER_LIST_X15: &str = "{3A4CF648-6AED-40f4-86FF-DC5316D8AED3}";
pub const EXT_URI_TIMELINE_REFS: &str = "{7E03D99C-DC04-49d9-9315-930204A7B6E9}";

/// Slicer-cache-level block carrying `x15:tableSlicerCache` (table id + 1-based column).
pub const EXT_URI_SLICER_CACHE_DEFINITION: &str = "{2F2917AC-EB37-4324-AD4E-5DD8C200BD13}";
/// Pivot-cache-level block carrying `x14:pivotCacheDefinition@pivotCacheId`.
pub const EXT_URI_PIVOT_CACHE_DEFINITION: &str = "{725AE2AE-9491-48be-B2B4-4EB974FC3084}";

pub const EXT_URI_PIVOT_CACHES_X14: &str = "{876F7934-8845-4945-9796-88D515C7AA90}";
/// Workbook-level aggregate of pivot-table slicer caches.
pub const EXT_URI_SLICER_CACHES_X14: &str = "{BBE1A952-AA13-448e-AADC-164F8A28A991}";
/// Workbook-level aggregate of table slicer caches.
pub const EXT_URI_SLICER_CACHES_X15: &str = "{46BE6895-7355-4a93-B00E-2C351335B9C9}";
pub const EXT_URI_WORKBOOK_PR_X14A: &str = "{79F54976-1DA5-4618-B147-4CDE4B953A38}";
pub const EXT_URI_PIVOT_CACHES_X15: &str = "{841E416B-1EF1-43b6-AB56-02D37102CBD5}";
pub const EXT_URI_PIVOT_TABLE_REFERENCES: &str = "{983426D0-5260-488c-9760-48F4B6AC55F4}";
pub const EXT_URI_TIMELINE_CACHE_PIVOT_CACHES: &str = "{A2CB5862-8E78-49c6-8D9D-AF26E26ADB89}";
pub const EXT_URI_TIMELINE_CACHE_REFS: &str = "{D0CA8CA8-9F24-4464-BF8E-62219DCF47F9}";
pub const EXT_URI_WORKBOOK_PR_X15: &str = "{140A7094-0E35-4892-8432-C4D2E57EDEB5}";
pub const EXT_URI_DATA_MODEL: &str = "{FCE2AD5D-F65C-4FA6-A056-5C36A1767C68}";
pub const EXT_URI_CALC_FEATURES: &str = "{B58B0392-4F1F-4190-BB64-5DF3571DCE5F}";
pub const EXT_URI_EXTERNAL_LINK_PR: &str = "{FCE6A71B-6B00-49CD-AB44-F6B1AE7CDE65}";

/// Part name prefixes for the numbered part families.
pub const SLICER_PART_PREFIX: &str = "xl/slicers/slicer";
pub const SLICER_CACHE_PART_PREFIX: &str = "xl/slicerCaches/slicerCache";
pub const DRAWING_PART_PREFIX: &str = "xl/drawings/drawing";
pub const TIMELINE_PART_PREFIX: &str = "xl/timelines/timeline";
pub const PIVOT_CACHE_PART_PREFIX: &str = "xl/pivotCache/pivotCacheDefinition";

pub fn slicer_part_name(id: u32) -> String {
    format!("{SLICER_PART_PREFIX}{id}.xml")
}

pub fn slicer_cache_part_name(id: u32) -> String {
    format!("{SLICER_CACHE_PART_PREFIX}{id}.xml")
}

pub fn drawing_part_name(id: u32) -> String {
    format!("{DRAWING_PART_PREFIX}{id}.xml")
}
