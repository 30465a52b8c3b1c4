use quick_xml::events::Event;
use quick_xml::Reader;

use crate::package::{XlsxError, XlsxPackage};
use crate::path::{rels_for_part, relative_target, resolve_target};
use crate::schema::NS_PACKAGE_RELATIONSHIPS;
use crate::xml::{self, escape_attr, local_name};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub type_uri: String,
    pub target: String,
    pub target_mode: Option<String>,
}

impl Relationship {
    fn is_external(&self) -> bool {
        self.target_mode
            .as_deref()
            .is_some_and(|mode| mode.trim().eq_ignore_ascii_case("External"))
    }
}

pub fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut relationships = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) | Event::Empty(start) => {
                if local_name(start.name().as_ref()).eq_ignore_ascii_case(b"Relationship") {
                    let mut id = None;
                    let mut target = None;
                    let mut type_uri = None;
                    let mut target_mode = None;
                    for attr in start.attributes() {
                        let attr = attr?;
                        let key = local_name(attr.key.as_ref());
                        let value = attr.unescape_value()?.into_owned();
                        if key.eq_ignore_ascii_case(b"Id") {
                            id = Some(value);
                        } else if key.eq_ignore_ascii_case(b"Target") {
                            target = Some(value);
                        } else if key.eq_ignore_ascii_case(b"Type") {
                            type_uri = Some(value);
                        } else if key.eq_ignore_ascii_case(b"TargetMode") {
                            target_mode = Some(value);
                        }
                    }
                    if let (Some(id), Some(target), Some(type_uri)) = (id, target, type_uri) {
                        relationships.push(Relationship {
                            id,
                            target,
                            type_uri,
                            target_mode,
                        });
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(relationships)
}

/// Relationships declared by `part_name`; a missing rels part means none.
pub fn relationships_for(
    package: &XlsxPackage,
    part_name: &str,
) -> Result<Vec<Relationship>, XlsxError> {
    match package.part(&rels_for_part(part_name)) {
        Some(bytes) => parse_relationships(&bytes),
        None => Ok(Vec::new()),
    }
}

/// Resolve `relationship_id` declared by `part_name` to the internal part it targets.
pub fn relationship_target(
    package: &XlsxPackage,
    part_name: &str,
    relationship_id: &str,
) -> Result<Option<String>, XlsxError> {
    Ok(relationships_for(package, part_name)?
        .into_iter()
        .find(|rel| rel.id == relationship_id)
        .filter(|rel| !rel.is_external())
        .map(|rel| resolve_target(part_name, &rel.target)))
}

/// Resolved targets of every internal relationship of `type_uri`, paired with their ids.
pub fn targets_of_type(
    package: &XlsxPackage,
    part_name: &str,
    type_uri: &str,
) -> Result<Vec<(String, String)>, XlsxError> {
    Ok(relationships_for(package, part_name)?
        .into_iter()
        .filter(|rel| rel.type_uri == type_uri && !rel.is_external())
        .map(|rel| (rel.id.clone(), resolve_target(part_name, &rel.target)))
        .collect())
}

fn next_relationship_id(relationships: &[Relationship]) -> String {
    let max = relationships
        .iter()
        .filter_map(|rel| rel.id.strip_prefix("rId"))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("rId{}", max + 1)
}

/// Add a relationship from `source_part` to `target_part`, returning its id.
///
/// An existing relationship with the same type and target is reused.
pub fn add_relationship(
    package: &XlsxPackage,
    source_part: &str,
    type_uri: &str,
    target_part: &str,
) -> Result<String, XlsxError> {
    let rels_name = rels_for_part(source_part);
    let existing_xml = package.part_str(&rels_name)?;
    let relationships = match &existing_xml {
        Some(xml) => parse_relationships(xml.as_bytes())?,
        None => Vec::new(),
    };

    if let Some(rel) = relationships.iter().find(|rel| {
        rel.type_uri == type_uri
            && !rel.is_external()
            && resolve_target(source_part, &rel.target) == target_part
    }) {
        return Ok(rel.id.clone());
    }

    let id = next_relationship_id(&relationships);
    let element = format!(
        r#"<Relationship Id="{id}" Type="{}" Target="{}"/>"#,
        escape_attr(type_uri),
        escape_attr(&relative_target(source_part, target_part)),
    );

    let updated = match existing_xml {
        Some(xml) => {
            let root = xml::root_element(&xml)?;
            xml::insert_child(&xml, &root, &[], &element)?
        }
        None => format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{NS_PACKAGE_RELATIONSHIPS}">{element}</Relationships>"#
        ),
    };
    package.set_part(rels_name, updated.into_bytes());
    log::debug!("added relationship {id} from {source_part} to {target_part}");
    Ok(id)
}

/// Remove relationship `relationship_id` from `source_part`'s rels. Returns whether one was
/// removed.
pub fn remove_relationship(
    package: &XlsxPackage,
    source_part: &str,
    relationship_id: &str,
) -> Result<bool, XlsxError> {
    let rels_name = rels_for_part(source_part);
    let Some(xml) = package.part_str(&rels_name)? else {
        return Ok(false);
    };
    let root = xml::root_element(&xml)?;
    for child in xml::child_elements(&xml, &root)? {
        if !child.local_name().eq_ignore_ascii_case("Relationship") {
            continue;
        }
        if xml::attribute(&xml, &child, "Id")?.as_deref() == Some(relationship_id) {
            let updated = xml::splice(&xml, child.start, child.end, "");
            package.set_part(rels_name, updated.into_bytes());
            return Ok(true);
        }
    }
    Ok(false)
}
