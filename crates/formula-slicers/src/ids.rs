//! Part-number and name allocation.
//!
//! Part numbers are count-based: the next id for a part family is the number of stored parts in
//! that family plus one. After a deletion this can hand out a number that was used before (or,
//! with gaps, one that is still taken by a higher-numbered part being counted below it), which
//! is what other producers of these packages do as well.

use crate::package::{XlsxError, XlsxPackage};
use crate::schema::{SLICER_PART_PREFIX, TIMELINE_PART_PREFIX};
use crate::xml;

/// How [`next_unique_name`] derives candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStyle<'a> {
    /// `name`, `name 1`, `name 2`, ...
    SuffixWithSpace,
    /// Sanitize into an identifier, prepend `prefix`, then `ident`, `ident1`, `ident2`, ...
    SanitizeAndSuffix { prefix: &'a str },
}

/// Count stored parts whose name starts with `prefix` (relationship parts excluded).
pub fn next_part_id(package: &XlsxPackage, prefix: &str) -> u32 {
    let count = package
        .part_names()
        .iter()
        .filter(|name| name.starts_with(prefix) && name.ends_with(".xml"))
        .count();
    count as u32 + 1
}

/// Keep letters anywhere, digits and `.` when not leading; everything else becomes `_`.
pub fn sanitize_identifier(candidate: &str) -> String {
    candidate
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if c.is_alphabetic() || (i > 0 && (c.is_numeric() || c == '.')) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn contains_ignore_case(existing: &[String], name: &str) -> bool {
    let name = name.to_lowercase();
    existing.iter().any(|e| e.to_lowercase() == name)
}

/// First name derived from `candidate` that does not collide (case-insensitively) with
/// `existing`.
pub fn next_unique_name(candidate: &str, existing: &[String], style: NameStyle<'_>) -> String {
    match style {
        NameStyle::SuffixWithSpace => {
            let mut name = candidate.to_string();
            let mut n = 0u32;
            while contains_ignore_case(existing, &name) {
                n += 1;
                name = format!("{candidate} {n}");
            }
            name
        }
        NameStyle::SanitizeAndSuffix { prefix } => {
            let base = format!("{prefix}{}", sanitize_identifier(candidate));
            let mut name = base.clone();
            let mut n = 0u32;
            while contains_ignore_case(existing, &name) {
                n += 1;
                name = format!("{base}{n}");
            }
            name
        }
    }
}

fn root_child_names(package: &XlsxPackage, part: &str, local: &str) -> Result<Vec<String>, XlsxError> {
    let Some(content) = package.part_str(part)? else {
        return Ok(Vec::new());
    };
    let root = xml::root_element(&content)?;
    let mut out = Vec::new();
    for child in xml::child_elements(&content, &root)? {
        if child.local_name() != local {
            continue;
        }
        if let Some(name) = xml::attribute(&content, &child, "name")? {
            out.push(name);
        }
    }
    Ok(out)
}

/// Names already used by slicers and timelines. Both share one naming domain in a workbook.
pub fn slicer_names(package: &XlsxPackage) -> Result<Vec<String>, XlsxError> {
    let mut out = Vec::new();
    for part in package.part_names() {
        if !part.ends_with(".xml") {
            continue;
        }
        if part.starts_with(SLICER_PART_PREFIX) {
            out.extend(root_child_names(package, &part, "slicer")?);
        } else if part.starts_with(TIMELINE_PART_PREFIX) {
            out.extend(root_child_names(package, &part, "timeline")?);
        }
    }
    Ok(out)
}

/// Workbook-scope defined names; cache names share this domain.
pub fn workbook_defined_names(package: &XlsxPackage) -> Result<Vec<String>, XlsxError> {
    Ok(package
        .defined_names()?
        .into_iter()
        .filter(|dn| dn.local_sheet_id.is_none())
        .map(|dn| dn.name)
        .collect())
}
