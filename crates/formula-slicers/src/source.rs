use crate::package::{XlsxError, XlsxPackage};
use crate::pivots::PivotTableInfo;
use crate::tables::TableInfo;

/// The data a slicer filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlicerSource {
    Table(TableInfo),
    PivotTable(PivotTableInfo),
}

impl SlicerSource {
    pub fn is_table(&self) -> bool {
        matches!(self, SlicerSource::Table(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub source: SlicerSource,
    /// 0-based index of the field within the source's field order.
    pub column: u32,
}

/// Find the table (preferred) or pivot table named `table_name` on `table_sheet` and locate
/// `field` among its fields (case-insensitive).
pub fn resolve_slicer_source(
    package: &XlsxPackage,
    table_sheet: &str,
    table_name: &str,
    field: &str,
) -> Result<ResolvedSource, XlsxError> {
    let sheet = package.worksheet_part_for(table_sheet)?;

    let (source, order) = match package
        .tables_on_sheet(&sheet)?
        .into_iter()
        .find(|table| table.is_named(table_name))
    {
        Some(table) => {
            let order = package.table_field_order(&table);
            (SlicerSource::Table(table), order)
        }
        None => {
            let pivot = package
                .pivot_tables_on_sheet(&sheet)?
                .into_iter()
                .find(|pivot| pivot.name == table_name)
                .ok_or_else(|| XlsxError::TableNotFound(table_name.to_string()))?;
            let order = package.pivot_field_order(&pivot);
            (SlicerSource::PivotTable(pivot), order)
        }
    };

    // An unreadable source range leaves no fields to match against.
    let order = order.unwrap_or_else(|err| {
        log::warn!("could not read fields of {table_name}: {err}");
        Vec::new()
    });

    let field_lower = field.to_lowercase();
    let column = order
        .iter()
        .position(|name| name.to_lowercase() == field_lower)
        .ok_or_else(|| XlsxError::InvalidSlicerField(field.to_string()))?;

    Ok(ResolvedSource {
        source,
        column: column as u32,
    })
}
