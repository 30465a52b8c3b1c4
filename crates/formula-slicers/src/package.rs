use std::io::{Cursor, Read, Write};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use thiserror::Error;

use crate::drawings::DrawingPart;

/// Maximum allowed *inflated* bytes for a single ZIP entry in an XLSX package.
pub const MAX_XLSX_PACKAGE_PART_BYTES: u64 = 256 * 1024 * 1024; // 256 MiB

/// Maximum allowed *inflated* bytes across all ZIP entries in an XLSX package.
pub const MAX_XLSX_PACKAGE_TOTAL_BYTES: u64 = 512 * 1024 * 1024; // 512 MiB

/// Size limits enforced by [`XlsxPackage::from_bytes_limited`].
#[derive(Debug, Clone, Copy)]
pub struct XlsxPackageLimits {
    /// Maximum allowed uncompressed bytes for any single part.
    pub max_part_bytes: u64,
    /// Maximum allowed uncompressed bytes across the whole package.
    pub max_total_bytes: u64,
}

impl Default for XlsxPackageLimits {
    fn default() -> Self {
        Self {
            max_part_bytes: MAX_XLSX_PACKAGE_PART_BYTES,
            max_total_bytes: MAX_XLSX_PACKAGE_TOTAL_BYTES,
        }
    }
}

#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml error: {0}")]
    RoXml(#[from] roxmltree::Error),
    #[error("xml deserialize error: {0}")]
    XmlDe(#[from] quick_xml::DeError),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("invalid xlsx: {0}")]
    Invalid(String),
    #[error("lock poisoned for part {0}")]
    LockPoisoned(String),
    #[error(
        "xlsx package part is too large to load safely: {part} is {size} bytes (max {max} bytes)"
    )]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("xlsx package is too large to load safely: {total} bytes uncompressed (max {max})")]
    PackageTooLarge { total: u64, max: u64 },
    #[error("parameter is required")]
    ParameterRequired,
    #[error("parameter is invalid: {0}")]
    ParameterInvalid(String),
    #[error("sheet {0} does not exist")]
    SheetNotFound(String),
    #[error("table or pivot table {0} does not exist")]
    TableNotFound(String),
    #[error("slicer {0} does not exist")]
    SlicerNotFound(String),
    #[error("slicer field {0} does not exist in the table or pivot table")]
    InvalidSlicerField(String),
}

/// Coarse classification of [`XlsxError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A mandatory option was not supplied.
    ParameterRequired,
    /// Mandatory options were supplied but are malformed.
    ParameterInvalid,
    /// A named sheet, table, pivot table, slicer or field does not exist.
    NotFound,
    /// Stored XML could not be decoded.
    Decode,
    /// Container-level failures (ZIP, IO, missing parts, size limits, poisoned locks).
    Package,
}

impl XlsxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            XlsxError::ParameterRequired => ErrorKind::ParameterRequired,
            XlsxError::ParameterInvalid(_) => ErrorKind::ParameterInvalid,
            XlsxError::SheetNotFound(_)
            | XlsxError::TableNotFound(_)
            | XlsxError::SlicerNotFound(_)
            | XlsxError::InvalidSlicerField(_) => ErrorKind::NotFound,
            XlsxError::Xml(_)
            | XlsxError::RoXml(_)
            | XlsxError::XmlDe(_)
            | XlsxError::Utf8(_)
            | XlsxError::Attr(_)
            | XlsxError::Invalid(_) => ErrorKind::Decode,
            XlsxError::Zip(_)
            | XlsxError::Io(_)
            | XlsxError::MissingPart(_)
            | XlsxError::LockPoisoned(_)
            | XlsxError::PartTooLarge { .. }
            | XlsxError::PackageTooLarge { .. } => ErrorKind::Package,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// In-memory XLSX package: a concurrent map from OPC part name to raw bytes, plus the parsed
/// drawing parts that several features append anchors to.
///
/// Part names are stored without a leading `/` (e.g. `xl/workbook.xml`). All operations take
/// `&self`; the package can be shared across threads behind an `Arc`.
#[derive(Debug, Default)]
pub struct XlsxPackage {
    parts: DashMap<String, Vec<u8>>,
    pub(crate) drawings: DashMap<String, Arc<Mutex<DrawingPart>>>,
}

impl Clone for XlsxPackage {
    fn clone(&self) -> Self {
        let drawings = DashMap::new();
        for entry in self.drawings.iter() {
            let part = match entry.value().lock() {
                Ok(guard) => guard.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            };
            drawings.insert(entry.key().clone(), Arc::new(Mutex::new(part)));
        }
        Self {
            parts: self.parts.clone(),
            drawings,
        }
    }
}

fn normalize_part_name(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

impl XlsxPackage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        Self::from_bytes_limited(bytes, XlsxPackageLimits::default())
    }

    pub fn from_bytes_limited(bytes: &[u8], limits: XlsxPackageLimits) -> Result<Self, XlsxError> {
        let reader = Cursor::new(bytes);
        let mut zip = zip::ZipArchive::new(reader)?;

        let parts = DashMap::new();
        let mut total: u64 = 0;
        for i in 0..zip.len() {
            let file = zip.by_index(i)?;
            if !file.is_file() {
                continue;
            }

            let name = normalize_part_name(file.name()).to_string();
            let mut buf = Vec::new();
            file.take(limits.max_part_bytes + 1).read_to_end(&mut buf)?;
            let size = buf.len() as u64;
            if size > limits.max_part_bytes {
                return Err(XlsxError::PartTooLarge {
                    part: name,
                    size,
                    max: limits.max_part_bytes,
                });
            }
            total += size;
            if total > limits.max_total_bytes {
                return Err(XlsxError::PackageTooLarge {
                    total,
                    max: limits.max_total_bytes,
                });
            }
            parts.insert(name, buf);
        }

        Ok(Self {
            parts,
            drawings: DashMap::new(),
        })
    }

    /// Construct a package from already-inflated parts.
    pub fn from_parts<I, K>(parts: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<u8>)>,
        K: Into<String>,
    {
        let map = DashMap::new();
        for (name, bytes) in parts {
            let name: String = name.into();
            map.insert(normalize_part_name(&name).to_string(), bytes);
        }
        Self {
            parts: map,
            drawings: DashMap::new(),
        }
    }

    /// Return a copy of the stored bytes for `name`.
    ///
    /// Drawing parts that were modified in memory are only visible here after
    /// [`XlsxPackage::flush_drawings`] (which [`XlsxPackage::write_to_bytes`] calls).
    pub fn part(&self, name: &str) -> Option<Vec<u8>> {
        self.parts
            .get(normalize_part_name(name))
            .map(|bytes| bytes.value().clone())
    }

    /// Return the part decoded as UTF-8 text.
    pub fn part_str(&self, name: &str) -> Result<Option<String>, XlsxError> {
        match self.part(name) {
            Some(bytes) => Ok(Some(String::from_utf8(bytes)?)),
            None => Ok(None),
        }
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.parts.contains_key(normalize_part_name(name))
    }

    pub fn set_part(&self, name: impl Into<String>, bytes: Vec<u8>) {
        let name: String = name.into();
        self.parts
            .insert(normalize_part_name(&name).to_string(), bytes);
    }

    pub fn remove_part(&self, name: &str) -> Option<Vec<u8>> {
        let name = normalize_part_name(name);
        self.drawings.remove(name);
        self.parts.remove(name).map(|(_, bytes)| bytes)
    }

    /// Stored part names in sorted order.
    ///
    /// The underlying map is unordered; sorting keeps scans over part families deterministic.
    pub fn part_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.parts.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Serialize every in-memory drawing part back into the part store.
    pub fn flush_drawings(&self) -> Result<(), XlsxError> {
        let drawings: Vec<(String, Arc<Mutex<DrawingPart>>)> = self
            .drawings
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        for (path, drawing) in drawings {
            let xml = {
                let guard = drawing
                    .lock()
                    .map_err(|_| XlsxError::LockPoisoned(path.clone()))?;
                guard.to_xml()
            };
            self.parts.insert(path, xml.into_bytes());
        }
        Ok(())
    }

    pub fn write_to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), XlsxError> {
        self.flush_drawings()?;

        let cursor = Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(cursor);
        let options = zip::write::FileOptions::<()>::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for name in self.part_names() {
            let Some(bytes) = self.part(&name) else {
                continue;
            };
            zip.start_file(name, options)?;
            zip.write_all(&bytes)?;
        }

        let cursor = zip.finish()?;
        w.write_all(&cursor.into_inner())?;
        Ok(())
    }
}
