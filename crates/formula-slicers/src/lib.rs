//! Slicer support for XLSX packages.
//!
//! [`XlsxPackage`] holds an Open Packaging Convention (OPC) package in memory (part name ->
//! bytes) and exposes three slicer operations on top of it:
//!
//! - [`XlsxPackage::add_slicer`] inserts a slicer for a table or pivot-table field, creating or
//!   reusing the shared slicer cache and anchoring the slicer in the sheet's drawing.
//! - [`XlsxPackage::get_slicers`] lists the slicers shown on a sheet.
//! - [`XlsxPackage::delete_slicer`] removes a slicer and, once unused, its cache.
//!
//! The supporting modules read and edit the parts slicers depend on: extension lists
//! ([`ext_list`]), relationships ([`openxml`]), content types, workbook sheets and defined
//! names, worksheet metadata, tables and pivot tables.

pub mod address;
mod cells;
mod content_types;
pub mod drawings;
pub mod ext_list;
pub mod ids;
pub mod openxml;
mod package;
mod path;
pub mod pivots;
pub mod schema;
pub mod slicer_cache;
pub mod slicers;
pub mod source;
pub mod tables;
mod workbook;
mod worksheet;
mod xml;

pub use address::{CellRef, Range};
pub use content_types::{ensure_override, overrides, remove_override, CONTENT_TYPES_PART};
pub use ext_list::{ExtensionBlock, ExtensionList, KnownExtension};
pub use package::{
    ErrorKind, XlsxError, XlsxPackage, XlsxPackageLimits, MAX_XLSX_PACKAGE_PART_BYTES,
    MAX_XLSX_PACKAGE_TOTAL_BYTES,
};
pub use path::{rels_for_part, resolve_target};
pub use slicers::{
    GraphicOptions, Slicer, SlicerOptions, DEFAULT_DRAWING_SCALE, DEFAULT_SLICER_HEIGHT,
    DEFAULT_SLICER_WIDTH,
};
pub use workbook::{DefinedName, WorkbookSheetInfo, WorksheetPartInfo, WORKBOOK_PART};
