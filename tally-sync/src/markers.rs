//! Write-back of "inserted" markers into the source sheet.
//!
//! After a batch is stored, every sheet row whose match key equals an
//! uploaded record's key gets `[status, timestamp]` in the marker columns,
//! and one `[key, timestamp]` row is appended to the log range when one is
//! configured. Marker failures are reported, never rolled back: the remote
//! diff stays the source of truth on the next run.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use tally_core::{A1Range, CompositeKey, KeyColumns, Record, Schema};

use crate::sheets::Workbook;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerUpdate {
    pub key: CompositeKey,
    pub status: String,
    pub at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerReport {
    /// Sheet rows whose marker cells were written.
    pub rows_marked: usize,
    /// Log rows appended.
    pub logged: usize,
    /// Updates whose key matched no sheet row.
    pub unmatched: Vec<CompositeKey>,
    /// One message per failed sheet operation.
    pub failed: Vec<String>,
}

impl MarkerReport {
    pub fn is_clean(&self) -> bool {
        self.unmatched.is_empty() && self.failed.is_empty()
    }
}

/// Destination of marker updates.
pub trait MarkerSink {
    /// Key identifying `record` in the sink, or `None` when the sink does
    /// not track this record.
    fn marker_key(&self, record: &Record) -> Option<CompositeKey>;

    /// Status text written for each uploaded record.
    fn status(&self) -> &str;

    fn write_markers(&mut self, updates: &[MarkerUpdate]) -> MarkerReport;
}

/// Sink for sources that have nowhere to write.
pub struct NoMarkers;

impl MarkerSink for NoMarkers {
    fn marker_key(&self, _record: &Record) -> Option<CompositeKey> {
        None
    }

    fn status(&self) -> &str {
        ""
    }

    fn write_markers(&mut self, _updates: &[MarkerUpdate]) -> MarkerReport {
        MarkerReport::default()
    }
}

/// Marker columns and optional log range in the source sheet.
pub struct SheetMarkers<'w> {
    workbook: &'w dyn Workbook,
    data_range: A1Range,
    marker_range: A1Range,
    log_range: Option<A1Range>,
    schema: &'w Schema,
    match_columns: KeyColumns,
    status: String,
}

impl<'w> SheetMarkers<'w> {
    /// `marker_range` must be the two marker columns; its sheet defaults to
    /// the data range's sheet.
    pub fn new(
        workbook: &'w dyn Workbook,
        data_range: A1Range,
        marker_range: A1Range,
        schema: &'w Schema,
        match_columns: KeyColumns,
        status: impl Into<String>,
    ) -> Self {
        let marker_range = marker_range.or_sheet(data_range.sheet.as_deref());
        Self {
            workbook,
            data_range,
            marker_range,
            log_range: None,
            schema,
            match_columns,
            status: status.into(),
        }
    }

    pub fn log_to(mut self, log_range: Option<A1Range>) -> Self {
        self.log_range = log_range;
        self
    }

    /// Sheet row numbers by match key, from a fresh read of the data range.
    fn row_index(&self) -> Result<HashMap<CompositeKey, Vec<u32>>, String> {
        let rows = self
            .workbook
            .read(&self.data_range)
            .map_err(|e| format!("reading {}: {e}", self.data_range))?;
        let ingested = self
            .schema
            .ingest(&rows, self.data_range.first_row())
            .map_err(|e| format!("reading {}: {e}", self.data_range))?;
        let mut index: HashMap<CompositeKey, Vec<u32>> = HashMap::new();
        for (record, row) in ingested.records.iter().zip(&ingested.row_numbers) {
            if let Some(key) = self.match_columns.key_for(record) {
                index.entry(key).or_default().push(*row);
            }
        }
        Ok(index)
    }
}

impl MarkerSink for SheetMarkers<'_> {
    fn marker_key(&self, record: &Record) -> Option<CompositeKey> {
        self.match_columns.key_for(record)
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn write_markers(&mut self, updates: &[MarkerUpdate]) -> MarkerReport {
        let mut report = MarkerReport::default();
        if updates.is_empty() {
            return report;
        }
        let index = match self.row_index() {
            Ok(index) => index,
            Err(message) => {
                tracing::error!("markers not written: {message}");
                report.failed.push(message);
                return report;
            }
        };

        for update in updates {
            let Some(rows) = index.get(&update.key) else {
                tracing::warn!("no sheet row matches uploaded key {}", update.key);
                report.unmatched.push(update.key.clone());
                continue;
            };
            let cells = vec![vec![update.status.clone(), update.at.format(TIMESTAMP_FORMAT).to_string()]];
            for row in rows {
                let range = self.marker_range.row(*row);
                match self.workbook.write(&range, &cells) {
                    Ok(()) => {
                        tracing::debug!("marked {range} for {}", update.key);
                        report.rows_marked += 1;
                    }
                    Err(e) => {
                        tracing::error!("marking {range} failed: {e}");
                        report.failed.push(format!("{range}: {e}"));
                    }
                }
            }
        }

        if let Some(log_range) = &self.log_range {
            let log_rows: Vec<Vec<String>> = updates
                .iter()
                .map(|u| vec![u.key.to_string(), u.at.format(TIMESTAMP_FORMAT).to_string()])
                .collect();
            match self.workbook.append(log_range, &log_rows) {
                Ok(()) => report.logged = log_rows.len(),
                Err(e) => {
                    tracing::error!("appending to {log_range} failed: {e}");
                    report.failed.push(format!("{log_range}: {e}"));
                }
            }
        }
        tracing::info!(
            "markers: {} row(s) marked, {} logged, {} unmatched",
            report.rows_marked,
            report.logged,
            report.unmatched.len()
        );
        report
    }
}
