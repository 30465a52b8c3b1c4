use crate::package::{XlsxError, XlsxPackage};
use crate::schema::NS_CONTENT_TYPES;
use crate::xml::{self, escape_attr};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

fn override_part_name(part_name: &str) -> String {
    format!("/{}", part_name.trim_start_matches('/'))
}

/// `<Override>` children of the content-types manifest as `(PartName, ContentType)` pairs.
pub fn overrides(package: &XlsxPackage) -> Result<Vec<(String, String)>, XlsxError> {
    let Some(xml) = package.part_str(CONTENT_TYPES_PART)? else {
        return Ok(Vec::new());
    };
    let root = xml::root_element(&xml)?;
    let mut out = Vec::new();
    for child in xml::child_elements(&xml, &root)? {
        if child.local_name() != "Override" {
            continue;
        }
        let part = xml::attribute(&xml, &child, "PartName")?.unwrap_or_default();
        let content_type = xml::attribute(&xml, &child, "ContentType")?.unwrap_or_default();
        out.push((part, content_type));
    }
    Ok(out)
}

/// Register `part_name` under `content_type`. Existing overrides for the part are left alone.
pub fn ensure_override(
    package: &XlsxPackage,
    part_name: &str,
    content_type: &str,
) -> Result<(), XlsxError> {
    let part_name = override_part_name(part_name);
    let element = format!(
        r#"<Override PartName="{}" ContentType="{}"/>"#,
        escape_attr(&part_name),
        escape_attr(content_type)
    );

    let Some(xml) = package.part_str(CONTENT_TYPES_PART)? else {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="{NS_CONTENT_TYPES}">{element}</Types>"#
        );
        package.set_part(CONTENT_TYPES_PART, xml.into_bytes());
        return Ok(());
    };

    if overrides(package)?
        .iter()
        .any(|(existing, _)| existing.eq_ignore_ascii_case(&part_name))
    {
        return Ok(());
    }

    let root = xml::root_element(&xml)?;
    let updated = xml::insert_child(&xml, &root, &[], &element)?;
    package.set_part(CONTENT_TYPES_PART, updated.into_bytes());
    Ok(())
}

/// Drop the override for `part_name`, if present.
pub fn remove_override(package: &XlsxPackage, part_name: &str) -> Result<(), XlsxError> {
    let part_name = override_part_name(part_name);
    let Some(xml) = package.part_str(CONTENT_TYPES_PART)? else {
        return Ok(());
    };
    let root = xml::root_element(&xml)?;
    for child in xml::child_elements(&xml, &root)? {
        if child.local_name() != "Override" {
            continue;
        }
        let matches = xml::attribute(&xml, &child, "PartName")?
            .is_some_and(|name| name.eq_ignore_ascii_case(&part_name));
        if matches {
            let updated = xml::splice(&xml, child.start, child.end, "");
            package.set_part(CONTENT_TYPES_PART, updated.into_bytes());
            return Ok(());
        }
    }
    Ok(())
}
