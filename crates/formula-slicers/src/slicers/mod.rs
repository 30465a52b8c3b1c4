//! Adding, listing and deleting slicers.
//!
//! A slicer touches five places in a package:
//!
//! - an entry in a slicer list part (`xl/slicers/slicer{N}.xml`) referenced from the sheet's
//!   `<extLst>` through a sheet relationship;
//! - a slicer cache part shared by every slicer on the same field of the same source, linked
//!   from the workbook relationships, the workbook `<extLst>` and a workbook defined name;
//! - an anchor in the sheet's drawing part;
//! - content type overrides for each new part.
//!
//! Creation runs as a sequence of writes against the part store. A failure part-way through
//! leaves the writes already made in place.

pub mod part;

use crate::address::{CellRef, EXCEL_MAX_COLS, EXCEL_MAX_ROWS};
use crate::content_types;
use crate::drawings::anchor::{self, build_slicer_anchor, SlicerAnchor};
use crate::drawings::lock_drawing;
use crate::ext_list::{ExtensionList, KnownExtension, WORKSHEET_EXT_URI_PRIORITY};
use crate::ids::{self, NameStyle};
use crate::openxml;
use crate::package::{XlsxError, XlsxPackage};
use crate::schema::{
    slicer_part_name, CONTENT_TYPE_SLICER, EXT_URI_SLICER_LIST_X14, EXT_URI_SLICER_LIST_X15,
    NS_RELATIONSHIPS, NS_X14, REL_TYPE_SLICER, SLICER_PART_PREFIX,
};
use crate::slicer_cache::{self, SlicerCacheSource};
use crate::source::resolve_slicer_source;
use crate::workbook::WorksheetPartInfo;

use self::part::{SlicerEntry, DEFAULT_SLICER_ROW_HEIGHT};

/// Slicer width in pixels when none is given.
pub const DEFAULT_SLICER_WIDTH: u32 = 200;
/// Slicer height in pixels when none is given.
pub const DEFAULT_SLICER_HEIGHT: u32 = 200;
pub const DEFAULT_DRAWING_SCALE: f64 = 1.0;

const DEFAULT_POSITIONING: &str = "oneCell";

/// Placement and protection of a slicer's drawing object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphicOptions {
    /// Print the slicer with the sheet (default `true`).
    pub print_object: Option<bool>,
    /// Lock the slicer when the sheet is protected (default `false`).
    pub locked: Option<bool>,
    /// `0.0` means [`DEFAULT_DRAWING_SCALE`].
    pub scale_x: f64,
    pub scale_y: f64,
    /// Pixel offsets from the top-left corner of the anchor cell.
    pub offset_x: i32,
    pub offset_y: i32,
    /// `editAs` of the anchor: `oneCell` (default), `twoCell` or `absolute`.
    pub positioning: Option<String>,
}

impl GraphicOptions {
    pub fn print_object(&self) -> bool {
        self.print_object.unwrap_or(true)
    }

    pub fn locked(&self) -> bool {
        self.locked.unwrap_or(false)
    }

    /// Effective `(x, y)` scale factors.
    pub fn scale(&self) -> (f64, f64) {
        let effective = |s: f64| if s > 0.0 { s } else { DEFAULT_DRAWING_SCALE };
        (effective(self.scale_x), effective(self.scale_y))
    }

    pub fn positioning(&self) -> &str {
        self.positioning
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_POSITIONING)
    }
}

/// Settings for [`XlsxPackage::add_slicer`].
///
/// `name` is the field to filter and doubles as the requested slicer name. `name`, `cell`,
/// `table_sheet` and `table_name` are required.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlicerOptions {
    pub name: Option<String>,
    /// Top-left cell, e.g. `E1`.
    pub cell: Option<String>,
    /// Sheet holding the table or pivot table.
    pub table_sheet: Option<String>,
    pub table_name: Option<String>,
    pub caption: Option<String>,
    /// Macro assigned to the slicer (macro-enabled workbooks only).
    pub macro_name: Option<String>,
    /// Pixels; `0` means [`DEFAULT_SLICER_WIDTH`].
    pub width: u32,
    /// Pixels; `0` means [`DEFAULT_SLICER_HEIGHT`].
    pub height: u32,
    /// Show the slicer header (default `true`).
    pub display_header: Option<bool>,
    /// Sort items descending (Z-A).
    pub item_desc: bool,
    pub format: GraphicOptions,
}

impl SlicerOptions {
    pub fn new(
        name: impl Into<String>,
        cell: impl Into<String>,
        table_sheet: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            cell: Some(cell.into()),
            table_sheet: Some(table_sheet.into()),
            table_name: Some(table_name.into()),
            ..Self::default()
        }
    }
}

struct ValidatedOptions<'a> {
    field: &'a str,
    cell: CellRef,
    table_sheet: &'a str,
    table_name: &'a str,
    width: u32,
    height: u32,
}

fn required<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str, XlsxError> {
    let value = value.as_deref().ok_or(XlsxError::ParameterRequired)?;
    if value.trim().is_empty() {
        return Err(XlsxError::ParameterInvalid(format!("{what} must not be empty")));
    }
    Ok(value)
}

fn validate(options: &SlicerOptions) -> Result<ValidatedOptions<'_>, XlsxError> {
    let field = required(&options.name, "name")?;
    let cell = required(&options.cell, "cell")?;
    let table_sheet = required(&options.table_sheet, "table sheet")?;
    let table_name = required(&options.table_name, "table name")?;
    let cell = CellRef::from_a1(cell)
        .map_err(|e| XlsxError::ParameterInvalid(format!("cell {cell}: {e}")))?;
    let width = if options.width == 0 {
        DEFAULT_SLICER_WIDTH
    } else {
        options.width
    };
    let height = if options.height == 0 {
        DEFAULT_SLICER_HEIGHT
    } else {
        options.height
    };

    let (_, end) = anchor::slicer_extent(cell, width, height, &options.format);
    if end.col >= EXCEL_MAX_COLS || end.row >= EXCEL_MAX_ROWS {
        return Err(XlsxError::ParameterInvalid(format!(
            "a {width}x{height} slicer at {} does not fit on the sheet",
            cell.to_a1()
        )));
    }

    Ok(ValidatedOptions {
        field,
        cell,
        table_sheet,
        table_name,
        width,
        height,
    })
}

/// A slicer as stored in the package.
///
/// Size and graphic options are not read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slicer {
    pub name: String,
    /// Anchor cell, when the slicer's drawing anchor was found.
    pub cell: Option<String>,
    pub table_sheet: Option<String>,
    pub table_name: Option<String>,
    pub caption: Option<String>,
    pub macro_name: Option<String>,
    pub display_header: bool,
    pub item_desc: bool,
    /// Name of the slicer cache (and its workbook defined name).
    pub cache_name: String,
    location: SlicerLocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SlicerLocation {
    sheet: String,
    worksheet_part: String,
    slicer_part: String,
    sheet_rid: String,
    drawing_part: Option<String>,
}

impl Slicer {
    /// Sheet showing the slicer.
    pub fn sheet(&self) -> &str {
        &self.location.sheet
    }

    /// Slicer list part holding this slicer's entry.
    pub fn slicer_part(&self) -> &str {
        &self.location.slicer_part
    }
}

fn slicer_list_rids(list: &ExtensionList, uri: &str) -> Vec<String> {
    let Some(block) = list.find(uri) else {
        return Vec::new();
    };
    match block.decode() {
        Ok(Some(KnownExtension::SlicerList { rids })) => rids,
        Ok(_) => Vec::new(),
        Err(err) => {
            log::warn!("ignoring unreadable slicer list {uri}: {err}");
            Vec::new()
        }
    }
}

impl XlsxPackage {
    /// Insert a slicer on `sheet` filtering field `options.name` of a table or pivot table.
    pub fn add_slicer(&self, sheet: &str, options: &SlicerOptions) -> Result<(), XlsxError> {
        let validated = validate(options)?;
        let target = self.worksheet_part_for(sheet)?;

        let resolved = resolve_slicer_source(
            self,
            validated.table_sheet,
            validated.table_name,
            validated.field,
        )?;
        let for_table = resolved.source.is_table();

        let cache = slicer_cache::find_or_create_slicer_cache(
            self,
            &resolved,
            validated.field,
            options.item_desc,
        )?;

        let slicer_name = ids::next_unique_name(
            validated.field,
            &ids::slicer_names(self)?,
            NameStyle::SuffixWithSpace,
        );

        anchor::add_slicer_anchor(self, &target, |shape_id| {
            build_slicer_anchor(&SlicerAnchor {
                slicer_name: &slicer_name,
                shape_id,
                cell: validated.cell,
                width_px: validated.width,
                height_px: validated.height,
                macro_name: options.macro_name.as_deref(),
                format: &options.format,
                for_table,
            })
        })?;

        let list_uri = if for_table {
            EXT_URI_SLICER_LIST_X15
        } else {
            EXT_URI_SLICER_LIST_X14
        };
        let slicer_part = self.sheet_slicer_part(&target, list_uri)?;
        let entry = SlicerEntry {
            name: slicer_name.clone(),
            cache: cache.name.clone(),
            caption: options.caption.clone(),
            show_caption: options.display_header.unwrap_or(true),
            row_height: DEFAULT_SLICER_ROW_HEIGHT,
        };
        let existing = self.part_str(&slicer_part)?;
        let updated = part::add_slicer_entry(existing.as_deref(), &entry)?;
        self.set_part(slicer_part.clone(), updated.into_bytes());
        content_types::ensure_override(self, &slicer_part, CONTENT_TYPE_SLICER)?;

        log::debug!(
            "added slicer {slicer_name} on {sheet} ({slicer_part}, cache {} in {})",
            cache.name,
            cache.part
        );
        Ok(())
    }

    /// The slicer list part `target` uses for `list_uri`, creating the sheet relationship and
    /// extension block for the sheet's first slicer of that kind.
    fn sheet_slicer_part(&self, target: &WorksheetPartInfo, list_uri: &str) -> Result<String, XlsxError> {
        let sheet_part = &target.worksheet_part;
        let mut list = match self.worksheet_ext_list(sheet_part)? {
            Some(inner) => ExtensionList::parse(&inner)?,
            None => ExtensionList::default(),
        };

        let mut rids = slicer_list_rids(&list, list_uri);
        for rid in &rids {
            if let Some(existing) = openxml::relationship_target(self, sheet_part, rid)? {
                return Ok(existing);
            }
        }

        let part = slicer_part_name(ids::next_part_id(self, SLICER_PART_PREFIX));
        let rid = openxml::add_relationship(self, sheet_part, REL_TYPE_SLICER, &part)?;
        self.ensure_worksheet_namespace(sheet_part, "r", NS_RELATIONSHIPS)?;
        self.ensure_worksheet_namespace(sheet_part, "x14", NS_X14)?;

        rids.push(rid);
        list.merge(
            KnownExtension::SlicerList { rids }.to_block(list_uri),
            WORKSHEET_EXT_URI_PRIORITY,
        );
        self.set_worksheet_ext_list(sheet_part, &list.to_xml())?;
        log::debug!("linked slicer part {part} from {sheet_part}");
        Ok(part)
    }

    /// Every slicer on `sheet`, in extension-list order.
    ///
    /// Slicers whose cache part cannot be found are left out.
    pub fn get_slicers(&self, sheet: &str) -> Result<Vec<Slicer>, XlsxError> {
        let target = self.worksheet_part_for(sheet)?;
        self.slicers_on_sheet(&target)
    }

    fn slicers_on_sheet(&self, target: &WorksheetPartInfo) -> Result<Vec<Slicer>, XlsxError> {
        let sheet_part = &target.worksheet_part;
        let Some(inner) = self.worksheet_ext_list(sheet_part)? else {
            return Ok(Vec::new());
        };
        let list = ExtensionList::parse(&inner)?;
        let rids: Vec<String> = [EXT_URI_SLICER_LIST_X14, EXT_URI_SLICER_LIST_X15]
            .iter()
            .flat_map(|uri| slicer_list_rids(&list, uri))
            .collect();
        if rids.is_empty() {
            return Ok(Vec::new());
        }

        let drawing_part = match self.worksheet_drawing_rid(sheet_part)? {
            Some(rid) => openxml::relationship_target(self, sheet_part, &rid)?,
            None => None,
        };
        let tables = self.tables()?;
        let pivots = self.pivot_tables()?;

        let mut out = Vec::new();
        for rid in rids {
            let Some(slicer_part) = openxml::relationship_target(self, sheet_part, &rid)? else {
                log::warn!("slicer relationship {rid} of {sheet_part} does not resolve");
                continue;
            };
            let Some(xml) = self.part_str(&slicer_part)? else {
                log::warn!("slicer part {slicer_part} is missing");
                continue;
            };

            for entry in part::parse_slicer_entries(&xml)? {
                let Some((_, cache)) = slicer_cache::find_slicer_cache_by_name(self, &entry.cache)
                else {
                    log::warn!("skipping slicer {}: cache {} not found", entry.name, entry.cache);
                    continue;
                };

                let (table_sheet, table_name) = match cache.source() {
                    Some(SlicerCacheSource::Table { table_id, .. }) => tables
                        .iter()
                        .find(|t| t.id == table_id)
                        .map(|t| (Some(t.sheet.clone()), Some(t.display_name.clone())))
                        .unwrap_or((None, None)),
                    Some(SlicerCacheSource::PivotTable { name }) => {
                        let sheet = pivots.iter().find(|p| p.name == name).map(|p| p.sheet.clone());
                        (sheet, Some(name))
                    }
                    None => (None, None),
                };

                let anchor = match &drawing_part {
                    Some(path) => self
                        .inspect_drawing(path, |drawing| {
                            anchor::find_slicer_anchor(drawing, &entry.name)
                        })?
                        .flatten(),
                    None => None,
                };
                let (cell, macro_name) = match anchor {
                    Some(found) => (found.cell.map(CellRef::to_a1), found.macro_name),
                    None => (None, None),
                };

                out.push(Slicer {
                    name: entry.name,
                    cell,
                    table_sheet,
                    table_name,
                    caption: entry.caption,
                    macro_name,
                    display_header: entry.show_caption,
                    item_desc: cache.is_descending(),
                    cache_name: entry.cache,
                    location: SlicerLocation {
                        sheet: target.name.clone(),
                        worksheet_part: sheet_part.clone(),
                        slicer_part: slicer_part.clone(),
                        sheet_rid: rid.clone(),
                        drawing_part: drawing_part.clone(),
                    },
                });
            }
        }
        Ok(out)
    }

    /// Slicers on every worksheet of the workbook.
    pub fn all_slicers(&self) -> Result<Vec<Slicer>, XlsxError> {
        let mut out = Vec::new();
        for sheet in self.worksheet_parts()? {
            out.extend(self.slicers_on_sheet(&sheet)?);
        }
        Ok(out)
    }

    /// Delete the slicer `name` from whichever sheet holds it, and its cache once no other
    /// slicer uses it.
    pub fn delete_slicer(&self, name: &str) -> Result<(), XlsxError> {
        let all = self.all_slicers()?;
        let slicer = all
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| XlsxError::SlicerNotFound(name.to_string()))?;
        let location = &slicer.location;

        let xml = self
            .part_str(&location.slicer_part)?
            .ok_or_else(|| XlsxError::MissingPart(location.slicer_part.clone()))?;
        let (updated, remaining) = part::remove_slicer_entry(&xml, name)?;
        if remaining == 0 {
            self.unlink_slicer_part(location)?;
        } else {
            self.set_part(location.slicer_part.clone(), updated.into_bytes());
        }

        if let Some(path) = &location.drawing_part {
            let drawing = self.drawing(path)?;
            let mut guard = lock_drawing(&drawing, path)?;
            if !anchor::remove_slicer_anchor(&mut guard, name) {
                log::warn!("slicer {name} has no anchor in {path}");
            }
        }

        let still_used = all
            .iter()
            .any(|other| other.name != slicer.name && other.cache_name == slicer.cache_name);
        if !still_used {
            slicer_cache::remove_slicer_cache(self, &slicer.cache_name)?;
        }
        log::debug!("deleted slicer {name}");
        Ok(())
    }

    /// Remove an emptied slicer part together with its sheet relationship, content type and
    /// sheet extension reference.
    fn unlink_slicer_part(&self, location: &SlicerLocation) -> Result<(), XlsxError> {
        let sheet_part = &location.worksheet_part;
        if let Some(inner) = self.worksheet_ext_list(sheet_part)? {
            let mut list = ExtensionList::parse(&inner)?;
            for uri in [EXT_URI_SLICER_LIST_X14, EXT_URI_SLICER_LIST_X15] {
                let mut rids = slicer_list_rids(&list, uri);
                let before = rids.len();
                rids.retain(|rid| *rid != location.sheet_rid);
                if rids.len() == before {
                    continue;
                }
                if rids.is_empty() {
                    list.remove(uri);
                } else {
                    list.merge(
                        KnownExtension::SlicerList { rids }.to_block(uri),
                        WORKSHEET_EXT_URI_PRIORITY,
                    );
                }
            }
            self.set_worksheet_ext_list(sheet_part, &list.to_xml())?;
        }

        self.remove_part(&location.slicer_part);
        self.remove_part(&crate::path::rels_for_part(&location.slicer_part));
        content_types::remove_override(self, &location.slicer_part)?;
        openxml::remove_relationship(self, sheet_part, &location.sheet_rid)?;
        log::debug!("removed slicer part {}", location.slicer_part);
        Ok(())
    }
}
