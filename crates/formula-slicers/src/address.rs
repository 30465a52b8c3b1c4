use core::fmt;

use thiserror::Error;

pub const EXCEL_MAX_ROWS: u32 = 1_048_576;
pub const EXCEL_MAX_COLS: u32 = 16_384;

/// A cell position. Rows and columns are **0-indexed** (`row = 0` is Excel row `1`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    #[inline]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    pub fn to_a1(self) -> String {
        format!("{}{}", col_to_name(self.col), self.row + 1)
    }

    /// Parse an A1-style reference (`A1`, `$B$2`).
    pub fn from_a1(a1: &str) -> Result<Self, A1ParseError> {
        let s = a1.trim();
        if s.is_empty() {
            return Err(A1ParseError::Empty);
        }

        let bytes = s.as_bytes();
        let mut idx = 0usize;
        if bytes.get(idx) == Some(&b'$') {
            idx += 1;
        }

        let col_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_alphabetic() {
            idx += 1;
        }
        if idx == col_start {
            return Err(A1ParseError::MissingColumn);
        }
        let col_str = &s[col_start..idx];
        if bytes.get(idx) == Some(&b'$') {
            idx += 1;
        }

        let row_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        if idx == row_start {
            return Err(A1ParseError::MissingRow);
        }
        if idx != bytes.len() {
            return Err(A1ParseError::TrailingCharacters);
        }

        let col = name_to_col(col_str)?;
        if col >= EXCEL_MAX_COLS {
            return Err(A1ParseError::InvalidColumn);
        }
        let row_1_based: u32 = s[row_start..idx]
            .parse()
            .map_err(|_| A1ParseError::InvalidRow)?;
        if row_1_based == 0 || row_1_based > EXCEL_MAX_ROWS {
            return Err(A1ParseError::InvalidRow);
        }

        Ok(Self {
            row: row_1_based - 1,
            col,
        })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// Inclusive rectangular range, normalized so `start` is the top-left corner.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: CellRef,
    pub end: CellRef,
}

impl Range {
    pub fn new(a: CellRef, b: CellRef) -> Self {
        Self {
            start: CellRef::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellRef::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    /// Parse `A1:B2` or a single-cell reference. Sheet-qualified references (`Sheet1!$A$1:$B$2`)
    /// must be split by the caller.
    pub fn from_a1(a1: &str) -> Result<Self, A1ParseError> {
        let s = a1.trim();
        match s.split_once(':') {
            None => {
                let cell = CellRef::from_a1(s)?;
                Ok(Range::new(cell, cell))
            }
            Some((a, b)) => Ok(Range::new(CellRef::from_a1(a)?, CellRef::from_a1(b)?)),
        }
    }

    /// Cells of the first row, left to right.
    pub fn header_cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        (self.start.col..=self.end.col).map(move |col| CellRef::new(self.start.row, col))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum A1ParseError {
    #[error("empty A1 reference")]
    Empty,
    #[error("missing column in A1 reference")]
    MissingColumn,
    #[error("missing row in A1 reference")]
    MissingRow,
    #[error("invalid column in A1 reference")]
    InvalidColumn,
    #[error("invalid row in A1 reference")]
    InvalidRow,
    #[error("trailing characters in A1 reference")]
    TrailingCharacters,
}

/// Convert a 0-based column index to letters (`0` -> `A`, `26` -> `AA`).
pub fn col_to_name(col: u32) -> String {
    let mut n = col + 1;
    let mut out = Vec::<char>::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    out.iter().rev().collect()
}

fn name_to_col(s: &str) -> Result<u32, A1ParseError> {
    let mut col: u32 = 0;
    for b in s.bytes() {
        if !b.is_ascii_alphabetic() {
            return Err(A1ParseError::InvalidColumn);
        }
        let v = (b.to_ascii_uppercase() - b'A') as u32 + 1;
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add(v))
            .ok_or(A1ParseError::InvalidColumn)?;
    }
    if col == 0 {
        return Err(A1ParseError::InvalidColumn);
    }
    Ok(col - 1)
}
