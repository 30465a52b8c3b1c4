//! Minimal cell-value reader used to recover field names from header rows.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::address::{CellRef, Range};
use crate::openxml;
use crate::package::{XlsxError, XlsxPackage};
use crate::schema::REL_TYPE_SHARED_STRINGS;
use crate::workbook::WORKBOOK_PART;

const DEFAULT_SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// Plain text of every `<si>` in a shared strings part. Phonetic runs (`rPh`) are skipped.
pub fn parse_shared_strings(xml: &str) -> Result<Vec<String>, XlsxError> {
    let mut reader = Reader::from_str(xml);
    let mut out = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => phonetic_depth += 1,
                b"t" if phonetic_depth == 0 => in_text = true,
                _ => {}
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"si" {
                    out.push(String::new());
                }
            }
            Event::Text(text) if in_text => {
                if let Some(current) = current.as_mut() {
                    current.push_str(&text.unescape()?);
                }
            }
            Event::CData(text) if in_text => {
                if let Some(current) = current.as_mut() {
                    current.push_str(&String::from_utf8_lossy(&text));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => out.push(current.take().unwrap_or_default()),
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

impl XlsxPackage {
    pub(crate) fn shared_strings(&self) -> Result<Vec<String>, XlsxError> {
        let part = openxml::targets_of_type(self, WORKBOOK_PART, REL_TYPE_SHARED_STRINGS)?
            .into_iter()
            .map(|(_, target)| target)
            .next()
            .unwrap_or_else(|| DEFAULT_SHARED_STRINGS_PART.to_string());
        match self.part_str(&part)? {
            Some(xml) => parse_shared_strings(&xml),
            None => Ok(Vec::new()),
        }
    }

    /// Display text of the first-row cells of `range` on `worksheet_part`, left to right.
    ///
    /// Missing cells read as empty strings. Shared and inline strings are resolved; other cells
    /// report their stored value.
    pub(crate) fn header_row_values(
        &self,
        worksheet_part: &str,
        range: &Range,
    ) -> Result<Vec<String>, XlsxError> {
        let sheet = self.worksheet_xml(worksheet_part)?;
        let wanted: Vec<CellRef> = range.header_cells().collect();
        let raw = read_row_cells(&sheet, range.start.row, range.start.col, range.end.col)?;

        let needs_shared = raw.iter().any(|cell| cell.kind.as_deref() == Some("s"));
        let shared = if needs_shared {
            self.shared_strings()?
        } else {
            Vec::new()
        };

        Ok(wanted
            .iter()
            .map(|cell| {
                raw.iter()
                    .find(|c| c.col == cell.col)
                    .map(|c| c.display(&shared))
                    .unwrap_or_default()
            })
            .collect())
    }
}

#[derive(Debug, Default)]
struct RawCell {
    col: u32,
    kind: Option<String>,
    value: String,
    inline: String,
}

impl RawCell {
    fn display(&self, shared: &[String]) -> String {
        match self.kind.as_deref() {
            Some("s") => self
                .value
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|idx| shared.get(idx).cloned())
                .unwrap_or_default(),
            Some("inlineStr") => self.inline.clone(),
            _ => self.value.clone(),
        }
    }
}

/// Cells of 0-based `row` whose column lies in `first..=last`.
fn read_row_cells(
    sheet_xml: &str,
    row: u32,
    first: u32,
    last: u32,
) -> Result<Vec<RawCell>, XlsxError> {
    let mut reader = Reader::from_str(sheet_xml);
    let mut out = Vec::new();

    // Rows and cells without an explicit `r` continue from the previous one.
    let mut current_row: Option<u32> = None;
    let mut next_col = 0u32;
    let mut cell: Option<RawCell> = None;
    let mut in_value = false;
    let mut in_inline_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                let explicit = e
                    .try_get_attribute("r")?
                    .and_then(|a| a.unescape_value().ok())
                    .and_then(|v| v.trim().parse::<u32>().ok())
                    .map(|r| r.saturating_sub(1));
                current_row = Some(explicit.unwrap_or_else(|| current_row.map_or(0, |r| r + 1)));
                next_col = 0;
                if current_row.is_some_and(|r| r > row) {
                    break;
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                cell = Some(start_cell(&e, &mut next_col)?);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                start_cell(&e, &mut next_col)?;
            }
            Event::Start(e) => match e.local_name().as_ref() {
                b"v" => in_value = true,
                b"t" => in_inline_text = true,
                _ => {}
            },
            Event::Text(text) => {
                if let Some(cell) = cell.as_mut() {
                    if in_value {
                        cell.value.push_str(&text.unescape()?);
                    } else if in_inline_text {
                        cell.inline.push_str(&text.unescape()?);
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"t" => in_inline_text = false,
                b"c" => {
                    if let Some(done) = cell.take() {
                        if current_row == Some(row) && (first..=last).contains(&done.col) {
                            out.push(done);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

fn start_cell(
    e: &quick_xml::events::BytesStart<'_>,
    next_col: &mut u32,
) -> Result<RawCell, XlsxError> {
    let mut col = *next_col;
    let mut kind = None;
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"r" => {
                if let Ok(cell) = CellRef::from_a1(&attr.unescape_value()?) {
                    col = cell.col;
                }
            }
            b"t" => kind = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }
    *next_col = col + 1;
    Ok(RawCell {
        col,
        kind,
        ..RawCell::default()
    })
}
