//! Explicit per-job schema.
//!
//! A [`Schema`] is an ordered list of typed fields. It is applied at
//! ingestion to both sides of a reconciliation so that values compare equal
//! regardless of how each source formats them (a sheet date `03/01/2024` and
//! an API timestamp `2024-03-01T00:00:00.000Z` both become the same
//! [`Value::Date`]).

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::record::{Record, RecordSet};
use crate::value::Value;

/// Date-only layouts accepted at ingestion, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d %b %Y", "%b %d, %Y"];

/// Date-time layouts accepted at ingestion; only the date part is kept.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Text,
    Number,
    Date,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered, typed field list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

/// A data row that could not be coerced to the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRejection {
    /// 1-based sheet row number.
    pub row_number: u32,
    pub field: String,
    pub raw: String,
    pub expected: FieldKind,
}

/// Result of [`Schema::ingest`].
#[derive(Debug, Clone, Default)]
pub struct Ingested {
    pub records: RecordSet,
    /// Sheet row number of each record, index-aligned with `records`.
    pub row_numbers: Vec<u32>,
    pub rejected: Vec<RowRejection>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.kind)
    }

    /// Turn header + data rows into records.
    ///
    /// `rows[0]` is the header; `first_row` is its 1-based sheet row number.
    /// Short rows are padded with empty cells, empty cells become
    /// [`Value::Null`], and rows whose cells cannot be coerced are rejected
    /// (reported, not fatal). Blank rows are skipped.
    pub fn ingest(&self, rows: &[Vec<String>], first_row: u32) -> Result<Ingested, SchemaError> {
        if self.fields.is_empty() {
            return Err(SchemaError::Empty);
        }
        let (header, data) = rows.split_first().ok_or(SchemaError::NoHeader)?;

        let mut positions = Vec::with_capacity(self.fields.len());
        for spec in &self.fields {
            let pos = header
                .iter()
                .position(|h| h.trim() == spec.name)
                .ok_or_else(|| SchemaError::MissingColumn {
                    column: spec.name.clone(),
                })?;
            positions.push(pos);
        }

        let mut out = Ingested {
            records: RecordSet::with_fields(self.fields.iter().map(|f| f.name.clone())),
            ..Ingested::default()
        };

        'rows: for (i, row) in data.iter().enumerate() {
            let row_number = first_row + 1 + i as u32;
            if row.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            let mut record = Record::new();
            for (spec, &pos) in self.fields.iter().zip(&positions) {
                let raw = row.get(pos).map(String::as_str).unwrap_or("");
                match coerce(spec.kind, raw) {
                    Some(value) => record.insert(spec.name.clone(), value),
                    None => {
                        out.rejected.push(RowRejection {
                            row_number,
                            field: spec.name.clone(),
                            raw: raw.to_owned(),
                            expected: spec.kind,
                        });
                        continue 'rows;
                    }
                }
            }
            out.records.push(record);
            out.row_numbers.push(row_number);
        }
        Ok(out)
    }

    /// Canonicalize declared fields of an API-sourced record in place.
    ///
    /// Fields not declared in the schema are left alone. Values that cannot
    /// be converted are kept as they are; the number of such fields is
    /// returned.
    pub fn conform(&self, record: &mut Record) -> usize {
        let mut unconverted = 0;
        for spec in &self.fields {
            let Some(value) = record.get_mut(&spec.name) else {
                continue;
            };
            let converted = match (&*value, spec.kind) {
                (Value::Text(s), kind) => coerce(kind, s),
                (Value::Number(n), FieldKind::Text) => Some(Value::Text(Value::Number(*n).key_text())),
                _ => continue,
            };
            match converted {
                Some(v) => *value = v,
                None => unconverted += 1,
            }
        }
        unconverted
    }

    /// [`conform`](Self::conform) every record of a set.
    ///
    /// Declared fields that appear somewhere in the set's vocabulary but are
    /// absent from an individual record are filled with [`Value::Null`]; the
    /// remote omits empty fields per record. Fields absent from every record
    /// stay absent so a wrong key column is still detected downstream.
    pub fn conform_set(&self, set: &mut RecordSet) -> usize {
        let present: Vec<&str> = self
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .filter(|name| set.has_field(name))
            .collect();
        let mut unconverted = 0;
        for record in set.records_mut() {
            for name in &present {
                if !record.contains(name) {
                    record.insert(*name, Value::Null);
                }
            }
            unconverted += self.conform(record);
        }
        unconverted
    }
}

/// Coerce one cell. `None` means the cell does not fit `kind`.
fn coerce(kind: FieldKind, raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(Value::Null);
    }
    match kind {
        FieldKind::Text => Some(Value::Text(raw.to_owned())),
        FieldKind::Number => trimmed
            .replace(',', "")
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Value::Number),
        FieldKind::Date => parse_date(trimmed).map(Value::Date),
        FieldKind::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(Value::Bool(true)),
            "false" | "no" => Some(Value::Bool(false)),
            _ => None,
        },
    }
}

/// Parse any accepted date layout, keeping only the calendar date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .map(|dt| dt.date())
        })
}
