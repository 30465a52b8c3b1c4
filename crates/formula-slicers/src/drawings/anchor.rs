//! Slicer anchors inside worksheet drawings.
//!
//! A slicer is drawn as an `xdr:twoCellAnchor` whose payload is wrapped in
//! `mc:AlternateContent`: the `mc:Choice` branch holds the slicer graphic frame, the
//! `mc:Fallback` branch a plain text box for consumers that cannot render slicers.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::address::CellRef;
use crate::content_types;
use crate::drawings::{lock_drawing, DrawingPart};
use crate::ids;
use crate::openxml;
use crate::package::{XlsxError, XlsxPackage};
use crate::schema::{
    drawing_part_name, CONTENT_TYPE_DRAWING, DRAWING_PART_PREFIX, NS_A14, NS_MC, NS_SLE, NS_SLE15,
    REL_TYPE_DRAWING,
};
use crate::slicers::GraphicOptions;
use crate::workbook::WorksheetPartInfo;
use crate::xml::escape_attr;

pub const EMU_PER_PIXEL: i64 = 9525;
/// Width of a column with the default 8.43 character width.
pub const DEFAULT_COL_WIDTH_PX: u32 = 64;
/// Height of a row with the default 15pt height.
pub const DEFAULT_ROW_HEIGHT_PX: u32 = 20;

const FALLBACK_OFFSET: (i64, i64) = (2914650, 152400);
const FALLBACK_EXTENT: (i64, i64) = (1828800, 2238375);

const TABLE_FALLBACK_TEXT: [&str; 2] = [
    "This shape represents a table slicer. Table slicers are not supported in this version of Excel.",
    "If the shape was modified in an earlier version of Excel, or if the workbook was saved in Excel 2007 or earlier, the slicer can't be used.",
];
const PIVOT_FALLBACK_TEXT: [&str; 2] = [
    "This shape represents a slicer. Slicers are supported in Excel 2010 or later.",
    "If the shape was modified in an earlier version of Excel, or if the workbook was saved in Excel 2003 or earlier, the slicer can't be used.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorPoint {
    pub col: u32,
    pub col_off_emu: i64,
    pub row: u32,
    pub row_off_emu: i64,
}

impl AnchorPoint {
    fn to_xml(self, tag: &str) -> String {
        format!(
            "<xdr:{tag}><xdr:col>{}</xdr:col><xdr:colOff>{}</xdr:colOff><xdr:row>{}</xdr:row><xdr:rowOff>{}</xdr:rowOff></xdr:{tag}>",
            self.col, self.col_off_emu, self.row, self.row_off_emu
        )
    }
}

/// Place an object of `width_px` x `height_px` whose top-left corner sits `offset` pixels into
/// `cell`, assuming default column widths and row heights.
pub fn position_object(
    cell: CellRef,
    offset_x_px: i32,
    offset_y_px: i32,
    width_px: u32,
    height_px: u32,
) -> (AnchorPoint, AnchorPoint) {
    let (col, x1) = advance(cell.col, offset_x_px.max(0) as u32, DEFAULT_COL_WIDTH_PX);
    let (row, y1) = advance(cell.row, offset_y_px.max(0) as u32, DEFAULT_ROW_HEIGHT_PX);
    let (col_end, x2) = advance(col, x1.saturating_add(width_px), DEFAULT_COL_WIDTH_PX);
    let (row_end, y2) = advance(row, y1.saturating_add(height_px), DEFAULT_ROW_HEIGHT_PX);

    let px = |v: u32| i64::from(v) * EMU_PER_PIXEL;
    (
        AnchorPoint {
            col,
            col_off_emu: px(x1),
            row,
            row_off_emu: px(y1),
        },
        AnchorPoint {
            col: col_end,
            col_off_emu: px(x2),
            row: row_end,
            row_off_emu: px(y2),
        },
    )
}

fn advance(start: u32, offset: u32, step: u32) -> (u32, u32) {
    (start.saturating_add(offset / step), offset % step)
}

/// `size` scaled and rounded; saturates at `u32::MAX`.
fn scaled(size: u32, scale: f64) -> u32 {
    (f64::from(size) * scale).round() as u32
}

/// The cell range a slicer covers, as `(from, to)` anchor points.
pub(crate) fn slicer_extent(
    cell: CellRef,
    width_px: u32,
    height_px: u32,
    format: &GraphicOptions,
) -> (AnchorPoint, AnchorPoint) {
    let (scale_x, scale_y) = format.scale();
    position_object(
        cell,
        format.offset_x,
        format.offset_y,
        scaled(width_px, scale_x),
        scaled(height_px, scale_y),
    )
}

/// Inputs for [`build_slicer_anchor`].
#[derive(Debug, Clone)]
pub struct SlicerAnchor<'a> {
    pub slicer_name: &'a str,
    pub shape_id: u32,
    pub cell: CellRef,
    /// Unscaled size; `format` scale factors are applied when positioning.
    pub width_px: u32,
    pub height_px: u32,
    pub macro_name: Option<&'a str>,
    pub format: &'a GraphicOptions,
    /// Table slicers require `sle15`; pivot-table slicers `a14`.
    pub for_table: bool,
}

pub fn build_slicer_anchor(anchor: &SlicerAnchor<'_>) -> String {
    let format = anchor.format;
    let (from, to) = slicer_extent(anchor.cell, anchor.width_px, anchor.height_px, format);
    let name = escape_attr(anchor.slicer_name);
    let macro_name = escape_attr(anchor.macro_name.unwrap_or_default());
    let id = anchor.shape_id;

    let mut out = String::new();
    out.push_str(&format!(
        r#"<xdr:twoCellAnchor editAs="{}">"#,
        escape_attr(format.positioning())
    ));
    out.push_str(&from.to_xml("from"));
    out.push_str(&to.to_xml("to"));

    out.push_str(&format!(r#"<mc:AlternateContent xmlns:mc="{NS_MC}">"#));
    if anchor.for_table {
        out.push_str(&format!(r#"<mc:Choice xmlns:sle15="{NS_SLE15}" Requires="sle15">"#));
    } else {
        out.push_str(&format!(r#"<mc:Choice xmlns:a14="{NS_A14}" Requires="a14">"#));
    }
    out.push_str(&format!(
        r#"<xdr:graphicFrame macro="{macro_name}"><xdr:nvGraphicFramePr><xdr:cNvPr id="{id}" name="{name}"/><xdr:cNvGraphicFramePr/></xdr:nvGraphicFramePr><xdr:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/></xdr:xfrm><a:graphic><a:graphicData uri="{NS_SLE}"><sle:slicer xmlns:sle="{NS_SLE}" name="{name}"/></a:graphicData></a:graphic></xdr:graphicFrame>"#
    ));
    out.push_str("</mc:Choice>");

    let text = if anchor.for_table {
        TABLE_FALLBACK_TEXT
    } else {
        PIVOT_FALLBACK_TEXT
    };
    out.push_str("<mc:Fallback>");
    out.push_str(&format!(
        r#"<xdr:sp macro="{macro_name}" textlink=""><xdr:nvSpPr><xdr:cNvPr id="{id}" name=""/><xdr:cNvSpPr txBox="1"><a:spLocks noTextEdit="1"/></xdr:cNvSpPr></xdr:nvSpPr>"#
    ));
    out.push_str(&format!(
        r#"<xdr:spPr><a:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:solidFill><a:prstClr val="white"/></a:solidFill><a:ln w="1"><a:solidFill><a:prstClr val="black"/></a:solidFill></a:ln></xdr:spPr>"#,
        FALLBACK_OFFSET.0, FALLBACK_OFFSET.1, FALLBACK_EXTENT.0, FALLBACK_EXTENT.1
    ));
    out.push_str(r#"<xdr:txBody><a:bodyPr vertOverflow="clip" horzOverflow="clip"/><a:lstStyle/>"#);
    for paragraph in text {
        out.push_str(&format!(
            r#"<a:p><a:r><a:rPr lang="en-US" sz="1100"/><a:t>{}</a:t></a:r></a:p>"#,
            escape_attr(paragraph)
        ));
    }
    out.push_str("</xdr:txBody></xdr:sp></mc:Fallback></mc:AlternateContent>");

    out.push_str(&format!(
        r#"<xdr:clientData fLocksWithSheet="{}" fPrintsWithSheet="{}"/>"#,
        u8::from(format.locked()),
        u8::from(format.print_object()),
    ));
    out.push_str("</xdr:twoCellAnchor>");
    out
}

/// What a stored slicer anchor says about its slicer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlicerAnchorInfo {
    pub cell: Option<CellRef>,
    pub macro_name: Option<String>,
}

#[derive(Debug, Default)]
struct AnchorScan {
    from_col: Option<u32>,
    from_row: Option<u32>,
    frame_name: Option<String>,
    frame_macro: Option<String>,
    has_slicer_graphic: bool,
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, key: &str) -> Option<String> {
    e.try_get_attribute(key)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

fn scan_anchor(anchor_xml: &str) -> AnchorScan {
    let mut reader = Reader::from_str(anchor_xml);
    let mut scan = AnchorScan::default();
    let mut in_from = false;
    let mut in_frame = false;
    let mut seen_from = false;
    let mut field: Option<&'static str> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"from" if !seen_from => in_from = true,
                b"col" if in_from => field = Some("col"),
                b"row" if in_from => field = Some("row"),
                b"graphicFrame" if scan.frame_name.is_none() => {
                    in_frame = true;
                    scan.frame_macro = attr_value(&e, "macro");
                }
                b"slicer" if in_frame => scan.has_slicer_graphic = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"cNvPr" if in_frame && scan.frame_name.is_none() => {
                    scan.frame_name = attr_value(&e, "name");
                }
                b"slicer" if in_frame => scan.has_slicer_graphic = true,
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let Some(which) = field {
                    let value = t
                        .unescape()
                        .ok()
                        .and_then(|v| v.trim().parse::<u32>().ok());
                    match which {
                        "col" => scan.from_col = value,
                        _ => scan.from_row = value,
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"from" if in_from => {
                    in_from = false;
                    seen_from = true;
                }
                b"col" | b"row" => field = None,
                b"graphicFrame" => in_frame = false,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    scan
}

fn slicer_anchor_index(drawing: &DrawingPart, slicer_name: &str) -> Option<(usize, AnchorScan)> {
    drawing.anchors().iter().enumerate().find_map(|(i, anchor)| {
        let scan = scan_anchor(anchor);
        (scan.has_slicer_graphic && scan.frame_name.as_deref() == Some(slicer_name))
            .then_some((i, scan))
    })
}

/// Locate the anchor drawing `slicer_name`.
pub fn find_slicer_anchor(drawing: &DrawingPart, slicer_name: &str) -> Option<SlicerAnchorInfo> {
    let (_, scan) = slicer_anchor_index(drawing, slicer_name)?;
    let cell = match (scan.from_col, scan.from_row) {
        (Some(col), Some(row)) => Some(CellRef::new(row, col)),
        _ => None,
    };
    Some(SlicerAnchorInfo {
        cell,
        macro_name: scan.frame_macro.filter(|m| !m.is_empty()),
    })
}

/// Drop the anchor drawing `slicer_name`. Returns whether one was found.
pub fn remove_slicer_anchor(drawing: &mut DrawingPart, slicer_name: &str) -> bool {
    match slicer_anchor_index(drawing, slicer_name) {
        Some((index, _)) => drawing.remove_anchor(index).is_some(),
        None => false,
    }
}

/// Path of the sheet's drawing part, creating `xl/drawings/drawing{N}.xml` (with its sheet
/// relationship, `<drawing>` element and content type) when the sheet has none.
pub(crate) fn ensure_sheet_drawing(
    package: &XlsxPackage,
    sheet: &WorksheetPartInfo,
) -> Result<String, XlsxError> {
    if let Some(rid) = package.worksheet_drawing_rid(&sheet.worksheet_part)? {
        if let Some(target) = openxml::relationship_target(package, &sheet.worksheet_part, &rid)? {
            return Ok(target);
        }
        log::warn!(
            "drawing relationship {rid} of {} is missing; creating a new drawing",
            sheet.worksheet_part
        );
    }

    let path = drawing_part_name(ids::next_part_id(package, DRAWING_PART_PREFIX));
    if !package.has_part(&path) {
        package.set_part(path.clone(), DrawingPart::new_empty(&path).to_xml().into_bytes());
    }
    let rid = openxml::add_relationship(package, &sheet.worksheet_part, REL_TYPE_DRAWING, &path)?;
    package.set_worksheet_drawing_rid(&sheet.worksheet_part, &rid)?;
    content_types::ensure_override(package, &path, CONTENT_TYPE_DRAWING)?;
    log::debug!("created drawing {path} for sheet {}", sheet.name);
    Ok(path)
}

/// Append a slicer anchor to the sheet's drawing and return the drawing path.
///
/// The drawing stays locked from reading the next shape id until the anchor is appended.
pub(crate) fn add_slicer_anchor(
    package: &XlsxPackage,
    sheet: &WorksheetPartInfo,
    build: impl FnOnce(u32) -> String,
) -> Result<String, XlsxError> {
    let path = ensure_sheet_drawing(package, sheet)?;
    let drawing = package.drawing(&path)?;
    let mut guard = lock_drawing(&drawing, &path)?;
    let shape_id = guard.max_shape_id() + 1;
    guard.push_anchor(build(shape_id));
    log::debug!("added slicer anchor {shape_id} to {path}");
    Ok(path)
}
