pub mod slicer_workbook_builder;
