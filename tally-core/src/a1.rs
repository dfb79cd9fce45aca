//! Spreadsheet A1 range notation.
//!
//! Supported forms: `A:E`, `A1:E40`, `F12`, each optionally prefixed by a
//! sheet name (`Testing!A:E`, `'IE DATA'!AN2:AO2`). Columns are 0-based
//! internally; rows stay 1-based as in the sheet.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Range {
    pub sheet: Option<String>,
    pub start_col: usize,
    pub end_col: usize,
    pub start_row: Option<u32>,
    pub end_row: Option<u32>,
}

impl A1Range {
    /// First sheet row covered by the range (1 for whole-column ranges).
    pub fn first_row(&self) -> u32 {
        self.start_row.unwrap_or(1)
    }

    /// Number of columns covered.
    pub fn width(&self) -> usize {
        self.end_col - self.start_col + 1
    }

    /// The same columns restricted to a single row.
    pub fn row(&self, row: u32) -> A1Range {
        A1Range {
            start_row: Some(row),
            end_row: Some(row),
            ..self.clone()
        }
    }

    /// Use `sheet` when the range does not name one.
    pub fn or_sheet(mut self, sheet: Option<&str>) -> A1Range {
        if self.sheet.is_none() {
            self.sheet = sheet.map(str::to_owned);
        }
        self
    }
}

/// `A` → 0, `Z` → 25, `AA` → 26. `None` for empty or non-letter input.
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut idx: usize = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        idx = idx.checked_mul(26)?.checked_add(digit)?;
    }
    Some(idx - 1)
}

/// Inverse of [`column_index`].
pub fn column_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn parse_cell(cell: &str, whole: &str) -> Result<(usize, Option<u32>), ConfigError> {
    let split = cell
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(split);
    let col = column_index(letters).ok_or_else(|| range_err(whole, "expected column letters"))?;
    let row = if digits.is_empty() {
        None
    } else {
        let n: u32 = digits
            .parse()
            .map_err(|_| range_err(whole, "row must be a positive number"))?;
        if n == 0 {
            return Err(range_err(whole, "rows start at 1"));
        }
        Some(n)
    };
    Ok((col, row))
}

fn range_err(range: &str, reason: &str) -> ConfigError {
    ConfigError::Range {
        range: range.to_owned(),
        reason: reason.to_owned(),
    }
}

impl FromStr for A1Range {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (sheet, cells) = match s.rfind('!') {
            Some(pos) => {
                let name = s[..pos].trim();
                let name = name
                    .strip_prefix('\'')
                    .and_then(|n| n.strip_suffix('\''))
                    .unwrap_or(name);
                if name.is_empty() {
                    return Err(range_err(s, "sheet name is empty"));
                }
                (Some(name.replace("''", "'")), &s[pos + 1..])
            }
            None => (None, s),
        };

        let (start, end) = match cells.split_once(':') {
            Some((a, b)) => (a, b),
            None => (cells, cells),
        };
        let (start_col, start_row) = parse_cell(start, s)?;
        let (end_col, end_row) = parse_cell(end, s)?;
        if end_col < start_col {
            return Err(range_err(s, "end column precedes start column"));
        }
        if let (Some(a), Some(b)) = (start_row, end_row) {
            if b < a {
                return Err(range_err(s, "end row precedes start row"));
            }
        }
        Ok(A1Range {
            sheet,
            start_col,
            end_col,
            start_row,
            end_row,
        })
    }
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            if sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                write!(f, "{sheet}!")?;
            } else {
                write!(f, "'{}'!", sheet.replace('\'', "''"))?;
            }
        }
        let row = |r: Option<u32>| r.map(|n| n.to_string()).unwrap_or_default();
        write!(
            f,
            "{}{}:{}{}",
            column_letters(self.start_col),
            row(self.start_row),
            column_letters(self.end_col),
            row(self.end_row)
        )
    }
}
