// Column letters, A1 cell addresses and rectangular ranges.
//
// All coordinates are 0-based. `A1` is (row 0, col 0).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest addressable row count (matches the xlsx grid).
pub const MAX_ROWS: u32 = 1_048_576;
/// Largest addressable column count (`XFD`).
pub const MAX_COLS: u32 = 16_384;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("invalid column letters: {0}")]
    InvalidColumn(String),

    #[error("invalid cell address: {0}")]
    InvalidCell(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("address out of bounds: {0}")]
    OutOfBounds(String),
}

/// Convert a 0-based column index to letters (`0 -> A`, `26 -> AA`).
pub fn column_letter(index: u32) -> String {
    let mut result = Vec::new();
    let mut n = index as u64 + 1;
    while n > 0 {
        n -= 1;
        result.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    result.reverse();
    String::from_utf8(result).unwrap_or_default()
}

/// Convert column letters (case-insensitive) to a 0-based index.
pub fn column_index(letters: &str) -> Result<u32, AddressError> {
    if letters.is_empty() {
        return Err(AddressError::Empty);
    }
    let mut n: u64 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return Err(AddressError::InvalidColumn(letters.to_string()));
        }
        n = n * 26 + (ch.to_ascii_uppercase() as u64 - 'A' as u64 + 1);
        if n > MAX_COLS as u64 {
            return Err(AddressError::OutOfBounds(letters.to_string()));
        }
    }
    Ok((n - 1) as u32)
}

/// A single cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellAddress {
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parse an A1-style address such as `B3` or `$B$3`.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }
        let cleaned: String = trimmed.chars().filter(|c| *c != '$').collect();
        let split = cleaned
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| AddressError::InvalidCell(input.to_string()))?;
        let (letters, digits) = cleaned.split_at(split);
        if letters.is_empty() {
            return Err(AddressError::InvalidCell(input.to_string()));
        }
        let col = column_index(letters)?;
        let row_number: u32 =
            digits.parse().map_err(|_| AddressError::InvalidCell(input.to_string()))?;
        if row_number == 0 || row_number > MAX_ROWS {
            return Err(AddressError::OutOfBounds(input.to_string()));
        }
        Ok(Self { row: row_number - 1, col })
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letter(self.col), self.row + 1)
    }
}

/// An inclusive rectangular range of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRange {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl CellRange {
    /// Parse `A1:C10` (corners in any order) or a single cell `B2`.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }
        let (first, second) = match trimmed.split_once(':') {
            Some((a, b)) => (a, b),
            None => (trimmed, trimmed),
        };
        let a = CellAddress::parse(first)
            .map_err(|_| AddressError::InvalidRange(input.to_string()))?;
        let b = CellAddress::parse(second)
            .map_err(|_| AddressError::InvalidRange(input.to_string()))?;
        Ok(Self {
            start: CellAddress::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellAddress::new(a.row.max(b.row), a.col.max(b.col)),
        })
    }

    pub fn row_count(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn col_count(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        (self.start.row..=self.end.row).contains(&row)
            && (self.start.col..=self.end.col).contains(&col)
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}
