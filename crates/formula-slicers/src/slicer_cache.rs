//! Slicer cache parts (`xl/slicerCaches/slicerCache{N}.xml`): parsing, lookup, reuse and
//! teardown.
//!
//! A slicer cache is shared by every slicer filtering the same field of the same source. Reuse
//! is decided structurally: pivot caches match on the pivot table they reference, table caches
//! on the `(tableId, column)` pair stored in their table-cache extension block.

use crate::content_types;
use crate::ext_list::{self, ExtensionBlock, ExtensionList, KnownExtension, WORKBOOK_EXT_URI_PRIORITY};
use crate::ids::{self, NameStyle};
use crate::openxml;
use crate::package::{XlsxError, XlsxPackage};
use crate::schema::{
    slicer_cache_part_name, CONTENT_TYPE_SLICER_CACHE, EXT_URI_SLICER_CACHES_X14,
    EXT_URI_SLICER_CACHES_X15, EXT_URI_SLICER_CACHE_DEFINITION, NS_MC, NS_RELATIONSHIPS,
    NS_SPREADSHEETML, NS_X14, NS_X15, REL_TYPE_SLICER_CACHE, SLICER_CACHE_PART_PREFIX,
};
use crate::source::{ResolvedSource, SlicerSource};
use crate::workbook::WORKBOOK_PART;
use crate::xml::{self, escape_attr};

/// Placeholder formula Excel stores for slicer cache defined names.
pub const SLICER_CACHE_DEFINED_NAME_FORMULA: &str = "#N/A";

const SLICER_CACHE_NAME_PREFIX: &str = "Slicer_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlicerCachePivotTable {
    pub tab_id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularSlicerCache {
    pub pivot_cache_id: u32,
    pub sort_order: Option<String>,
}

/// What a slicer cache filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlicerCacheSource {
    /// `column` is 1-based.
    Table { table_id: u32, column: u32 },
    PivotTable { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlicerCacheDefinition {
    pub name: String,
    pub source_name: String,
    pub pivot_tables: Vec<SlicerCachePivotTable>,
    pub tabular: Option<TabularSlicerCache>,
    pub ext_list: ExtensionList,
}

impl SlicerCacheDefinition {
    pub fn parse(xml: &str) -> Result<Self, XlsxError> {
        let doc = roxmltree::Document::parse(xml)?;
        let root = doc.root_element();
        if root.tag_name().name() != "slicerCacheDefinition" {
            return Err(XlsxError::Invalid(format!(
                "expected slicerCacheDefinition, found {}",
                root.tag_name().name()
            )));
        }

        let pivot_tables = root
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "pivotTables")
            .flat_map(|n| n.children())
            .filter(|n| n.is_element() && n.tag_name().name() == "pivotTable")
            .map(|n| SlicerCachePivotTable {
                tab_id: n.attribute("tabId").and_then(|v| v.parse().ok()).unwrap_or(0),
                name: n.attribute("name").unwrap_or_default().to_string(),
            })
            .collect();

        let tabular = root
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "tabular")
            .map(|n| TabularSlicerCache {
                pivot_cache_id: n
                    .attribute("pivotCacheId")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
                sort_order: n.attribute("sortOrder").map(str::to_string),
            });

        let ext_list = match ext_list::part_ext_list(xml)? {
            Some(inner) => ExtensionList::parse(&inner)?,
            None => ExtensionList::default(),
        };

        Ok(Self {
            name: root.attribute("name").unwrap_or_default().to_string(),
            source_name: root.attribute("sourceName").unwrap_or_default().to_string(),
            pivot_tables,
            tabular,
            ext_list,
        })
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        out.push('\n');
        out.push_str(&format!(
            r#"<slicerCacheDefinition xmlns="{NS_X14}" xmlns:mc="{NS_MC}" mc:Ignorable="x" xmlns:x="{NS_SPREADSHEETML}" xmlns:x15="{NS_X15}" name="{}" sourceName="{}">"#,
            escape_attr(&self.name),
            escape_attr(&self.source_name),
        ));
        if !self.pivot_tables.is_empty() {
            out.push_str("<pivotTables>");
            for pivot in &self.pivot_tables {
                out.push_str(&format!(
                    r#"<pivotTable tabId="{}" name="{}"/>"#,
                    pivot.tab_id,
                    escape_attr(&pivot.name)
                ));
            }
            out.push_str("</pivotTables>");
        }
        if let Some(tabular) = &self.tabular {
            let sort_order = tabular
                .sort_order
                .as_deref()
                .map(|order| format!(r#" sortOrder="{}""#, escape_attr(order)))
                .unwrap_or_default();
            out.push_str(&format!(
                r#"<data><tabular pivotCacheId="{}"{sort_order} showMissing="0"><items count="1"><i x="0" s="1"/></items></tabular></data>"#,
                tabular.pivot_cache_id
            ));
        }
        if !self.ext_list.is_empty() {
            out.push_str("<extLst>");
            out.push_str(&self.ext_list.to_xml());
            out.push_str("</extLst>");
        }
        out.push_str("</slicerCacheDefinition>");
        out
    }

    /// The table-cache extension payload, if present and readable.
    fn table_slicer_cache(&self) -> Option<(u32, u32, Option<String>)> {
        let block = self.ext_list.find(EXT_URI_SLICER_CACHE_DEFINITION)?;
        match block.decode() {
            Ok(Some(KnownExtension::TableSlicerCache {
                table_id,
                column,
                sort_order,
            })) => Some((table_id, column, sort_order)),
            Ok(_) => None,
            Err(err) => {
                log::warn!("ignoring unreadable table slicer cache of {}: {err}", self.name);
                None
            }
        }
    }

    pub fn source(&self) -> Option<SlicerCacheSource> {
        if let Some(pivot) = self.pivot_tables.first() {
            return Some(SlicerCacheSource::PivotTable {
                name: pivot.name.clone(),
            });
        }
        self.table_slicer_cache()
            .map(|(table_id, column, _)| SlicerCacheSource::Table { table_id, column })
    }

    pub fn is_descending(&self) -> bool {
        let sort_order = match &self.tabular {
            Some(tabular) => tabular.sort_order.clone(),
            None => self.table_slicer_cache().and_then(|(_, _, order)| order),
        };
        sort_order.as_deref() == Some("descending")
    }

    fn matches(&self, resolved: &ResolvedSource, field: &str) -> bool {
        match &resolved.source {
            SlicerSource::PivotTable(pivot) => {
                self.source_name.to_lowercase() == field.to_lowercase()
                    && self.pivot_tables.iter().any(|p| p.name == pivot.name)
            }
            SlicerSource::Table(table) => self
                .table_slicer_cache()
                .is_some_and(|(table_id, column, _)| {
                    table_id == table.id && column == resolved.column + 1
                }),
        }
    }
}

/// Every readable slicer cache part with its definition, in part-name order.
pub(crate) fn slicer_caches(package: &XlsxPackage) -> Vec<(String, SlicerCacheDefinition)> {
    let mut out = Vec::new();
    for part in package.part_names() {
        if !part.starts_with(SLICER_CACHE_PART_PREFIX) || !part.ends_with(".xml") {
            continue;
        }
        let parsed = package
            .part_str(&part)
            .and_then(|xml| match xml {
                Some(xml) => SlicerCacheDefinition::parse(&xml).map(Some),
                None => Ok(None),
            });
        match parsed {
            Ok(Some(definition)) => out.push((part, definition)),
            Ok(None) => {}
            Err(err) => log::warn!("skipping unreadable slicer cache {part}: {err}"),
        }
    }
    out
}

pub(crate) fn find_slicer_cache_by_name(
    package: &XlsxPackage,
    name: &str,
) -> Option<(String, SlicerCacheDefinition)> {
    slicer_caches(package)
        .into_iter()
        .find(|(_, definition)| definition.name == name)
}

/// Name and part of the cache backing a slicer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlicerCacheRef {
    pub name: String,
    pub part: String,
}

/// Reuse the cache that already filters `field` of `resolved`, or create one.
pub(crate) fn find_or_create_slicer_cache(
    package: &XlsxPackage,
    resolved: &ResolvedSource,
    field: &str,
    descending: bool,
) -> Result<SlicerCacheRef, XlsxError> {
    if let Some((part, definition)) = slicer_caches(package)
        .into_iter()
        .find(|(_, definition)| definition.matches(resolved, field))
    {
        log::debug!("reusing slicer cache {} ({part})", definition.name);
        return Ok(SlicerCacheRef {
            name: definition.name,
            part,
        });
    }

    let id = ids::next_part_id(package, SLICER_CACHE_PART_PREFIX);
    let part = slicer_cache_part_name(id);
    let name = ids::next_unique_name(
        field,
        &ids::workbook_defined_names(package)?,
        NameStyle::SanitizeAndSuffix {
            prefix: SLICER_CACHE_NAME_PREFIX,
        },
    );
    let sort_order = descending.then(|| "descending".to_string());

    let mut definition = SlicerCacheDefinition {
        name: name.clone(),
        source_name: field.to_string(),
        pivot_tables: Vec::new(),
        tabular: None,
        ext_list: ExtensionList::default(),
    };
    let aggregate_uri = match &resolved.source {
        SlicerSource::PivotTable(pivot) => {
            let pivot_cache_id = package.ensure_pivot_cache_ext_id(&pivot.cache_definition_part)?;
            definition.pivot_tables.push(SlicerCachePivotTable {
                tab_id: pivot.sheet_id,
                name: pivot.name.clone(),
            });
            definition.tabular = Some(TabularSlicerCache {
                pivot_cache_id,
                sort_order,
            });
            EXT_URI_SLICER_CACHES_X14
        }
        SlicerSource::Table(table) => {
            let block = KnownExtension::TableSlicerCache {
                table_id: table.id,
                column: resolved.column + 1,
                sort_order,
            }
            .to_block(EXT_URI_SLICER_CACHE_DEFINITION)
            .with_tag("x:ext");
            definition.ext_list.merge(block, &[]);
            EXT_URI_SLICER_CACHES_X15
        }
    };

    package.set_part(part.clone(), definition.to_xml().into_bytes());
    content_types::ensure_override(package, &part, CONTENT_TYPE_SLICER_CACHE)?;
    let rid = openxml::add_relationship(package, WORKBOOK_PART, REL_TYPE_SLICER_CACHE, &part)?;
    add_workbook_slicer_cache_ref(package, aggregate_uri, &rid)?;
    package.add_defined_name(&name, SLICER_CACHE_DEFINED_NAME_FORMULA)?;
    log::debug!("created slicer cache {name} ({part})");

    Ok(SlicerCacheRef { name, part })
}

fn aggregate_rids(block: Option<&ExtensionBlock>) -> Result<Vec<String>, XlsxError> {
    match block.map(ExtensionBlock::decode).transpose()?.flatten() {
        Some(KnownExtension::SlicerCaches { rids }) => Ok(rids),
        _ => Ok(Vec::new()),
    }
}

/// Append `rid` to the workbook-level aggregate block `uri`, creating the block if needed.
fn add_workbook_slicer_cache_ref(package: &XlsxPackage, uri: &str, rid: &str) -> Result<(), XlsxError> {
    let workbook = package.workbook_xml()?;
    let with_r = xml::ensure_root_namespace(&workbook, "r", NS_RELATIONSHIPS)?;
    if with_r != workbook {
        package.set_part(WORKBOOK_PART, with_r.into_bytes());
    }

    let inner = package.workbook_ext_list()?.unwrap_or_default();
    let mut list = ExtensionList::parse(&inner)?;
    let mut rids = aggregate_rids(list.find(uri))?;
    if !rids.iter().any(|existing| existing == rid) {
        rids.push(rid.to_string());
    }
    list.merge(
        KnownExtension::SlicerCaches { rids }.to_block(uri),
        WORKBOOK_EXT_URI_PRIORITY,
    );
    package.set_workbook_ext_list(&list.to_xml())
}

/// Drop `rid` from both workbook aggregate blocks; emptied blocks are removed.
fn remove_workbook_slicer_cache_ref(package: &XlsxPackage, rid: &str) -> Result<(), XlsxError> {
    let Some(inner) = package.workbook_ext_list()? else {
        return Ok(());
    };
    let mut list = ExtensionList::parse(&inner)?;
    for uri in [EXT_URI_SLICER_CACHES_X14, EXT_URI_SLICER_CACHES_X15] {
        let Some(block) = list.find(uri) else {
            continue;
        };
        let mut rids = aggregate_rids(Some(block))?;
        let before = rids.len();
        rids.retain(|existing| existing != rid);
        if rids.len() == before {
            continue;
        }
        if rids.is_empty() {
            list.remove(uri);
        } else {
            list.merge(
                KnownExtension::SlicerCaches { rids }.to_block(uri),
                WORKBOOK_EXT_URI_PRIORITY,
            );
        }
    }
    package.set_workbook_ext_list(&list.to_xml())
}

/// Delete the cache `name`: its defined name, part, content type, workbook relationship and
/// workbook extension reference.
pub(crate) fn remove_slicer_cache(package: &XlsxPackage, name: &str) -> Result<(), XlsxError> {
    if !package.delete_defined_name(name)? {
        log::warn!("slicer cache {name} had no workbook defined name");
    }

    let Some((part, _)) = find_slicer_cache_by_name(package, name) else {
        log::warn!("slicer cache {name} has no cache part");
        return Ok(());
    };
    package.remove_part(&part);
    package.remove_part(&crate::path::rels_for_part(&part));
    content_types::remove_override(package, &part)?;

    for (rid, target) in openxml::targets_of_type(package, WORKBOOK_PART, REL_TYPE_SLICER_CACHE)? {
        if target != part {
            continue;
        }
        openxml::remove_relationship(package, WORKBOOK_PART, &rid)?;
        remove_workbook_slicer_cache_ref(package, &rid)?;
    }
    log::debug!("removed slicer cache {name} ({part})");
    Ok(())
}
