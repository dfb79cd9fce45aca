//! Spreadsheet access.

use serde::Deserialize;
use serde_json::json;

use tally_core::A1Range;

use crate::error::SourceError;
use crate::session::{build_url, Session};
use crate::transport::Method;

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Cell-level access to one spreadsheet. Cells are plain strings; an empty
/// trailing cell may be omitted from a row.
pub trait Workbook {
    fn read(&self, range: &A1Range) -> Result<Vec<Vec<String>>, SourceError>;

    /// Overwrite the cells of `range` with `rows`.
    fn write(&self, range: &A1Range, rows: &[Vec<String>]) -> Result<(), SourceError>;

    /// Append `rows` after the last non-empty row of `range`.
    fn append(&self, range: &A1Range, rows: &[Vec<String>]) -> Result<(), SourceError>;
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

fn cell_text(cell: serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// [`Workbook`] over the Sheets v4 REST API.
pub struct GoogleSheets<'a> {
    session: &'a Session<'a>,
    spreadsheet_id: String,
    base: String,
}

impl<'a> GoogleSheets<'a> {
    pub fn new(session: &'a Session<'a>, spreadsheet_id: impl Into<String>) -> Self {
        Self::with_base(session, spreadsheet_id, SHEETS_API_BASE)
    }

    pub fn with_base(
        session: &'a Session<'a>,
        spreadsheet_id: impl Into<String>,
        base: impl Into<String>,
    ) -> Self {
        Self {
            session,
            spreadsheet_id: spreadsheet_id.into(),
            base: base.into(),
        }
    }

    fn values_url(&self, segment: &str, query: &[(&str, &str)]) -> Result<String, SourceError> {
        Ok(build_url(&self.base, &[self.spreadsheet_id.as_str(), "values", segment], query)?)
    }
}

impl Workbook for GoogleSheets<'_> {
    fn read(&self, range: &A1Range) -> Result<Vec<Vec<String>>, SourceError> {
        let url = self.values_url(&range.to_string(), &[])?;
        let resp = self.session.get(&url)?.require_success(&url)?;
        let body: ValueRange = resp.json(&url)?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    fn write(&self, range: &A1Range, rows: &[Vec<String>]) -> Result<(), SourceError> {
        let a1 = range.to_string();
        let url = self.values_url(&a1, &[("valueInputOption", "USER_ENTERED")])?;
        let body = json!({ "range": a1, "majorDimension": "ROWS", "values": rows });
        self.session
            .send_json(Method::Put, &url, &body)?
            .require_success(&url)?;
        Ok(())
    }

    fn append(&self, range: &A1Range, rows: &[Vec<String>]) -> Result<(), SourceError> {
        let url = self.values_url(
            &format!("{range}:append"),
            &[("valueInputOption", "USER_ENTERED"), ("insertDataOption", "INSERT_ROWS")],
        )?;
        let body = json!({ "majorDimension": "ROWS", "values": rows });
        self.session
            .send_json(Method::Post, &url, &body)?
            .require_success(&url)?;
        Ok(())
    }
}
