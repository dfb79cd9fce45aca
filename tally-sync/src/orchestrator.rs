//! One reconciliation pass per work unit:
//! `Init → FetchBaseline → BuildCandidate → Diff → Upload → MarkDone → End`.

use std::fmt;

use chrono::Local;

use tally_core::{CursorMode, LookupConfig, ReconcileConfig, RecordSet, Schema, UploadMode};

use crate::differ::{compare, MissingKeyColumn};
use crate::error::SourceError;
use crate::fetcher::{FetchStop, PaginatedFetcher};
use crate::lookup::{resolve_lookups, LookupReport};
use crate::markers::{MarkerReport, MarkerSink, MarkerUpdate};
use crate::session::Session;
use crate::source::CandidateSource;
use crate::uploader::{BatchResult, BatchUploader, Sleeper, UploadOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    FetchBaseline,
    BuildCandidate,
    Diff,
    Upload,
    MarkDone,
    End,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Init => "init",
            Phase::FetchBaseline => "fetch-baseline",
            Phase::BuildCandidate => "build-candidate",
            Phase::Diff => "diff",
            Phase::Upload => "upload",
            Phase::MarkDone => "mark-done",
            Phase::End => "end",
        })
    }
}

/// What happened to one work unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitReport {
    pub unit: String,
    /// Last phase reached; `End` when the unit ran to completion.
    pub phase: Phase,
    pub baseline_records: usize,
    pub baseline_stop: FetchStop,
    pub candidate_records: usize,
    pub rejected_candidates: usize,
    pub rejected_baseline: usize,
    pub skipped: Option<MissingKeyColumn>,
    /// Records found missing from the remote (after lookups).
    pub pending: RecordSet,
    pub lookups: LookupReport,
    pub uploads: Vec<UploadOutcome>,
    pub markers: MarkerReport,
    /// Why the unit stopped before `End`.
    pub error: Option<String>,
}

impl UnitReport {
    fn new(unit: String) -> Self {
        Self {
            unit,
            phase: Phase::Init,
            baseline_records: 0,
            baseline_stop: FetchStop::Exhausted,
            candidate_records: 0,
            rejected_candidates: 0,
            rejected_baseline: 0,
            skipped: None,
            pending: RecordSet::new(),
            lookups: LookupReport::default(),
            uploads: Vec::new(),
            markers: MarkerReport::default(),
            error: None,
        }
    }

    fn stop(mut self, error: impl Into<String>) -> Self {
        let error = error.into();
        tracing::error!("{}: stopped at {}: {error}", self.unit, self.phase);
        self.error = Some(error);
        self
    }

    pub fn uploaded(&self) -> usize {
        self.uploads.iter().map(UploadOutcome::accepted_count).sum()
    }

    pub fn failed_batches(&self) -> usize {
        self.uploads
            .iter()
            .filter(|o| matches!(o.result, BatchResult::Rejected { .. } | BatchResult::Failed(_)))
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.failed_batches() == 0 && self.markers.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub job: String,
    pub dry_run: bool,
    pub units: Vec<UnitReport>,
    /// Why the job could not start; `units` is then empty.
    pub error: Option<String>,
}

impl RunReport {
    /// A job that failed before reconciling any unit.
    pub fn failed(job: impl Into<String>, dry_run: bool, error: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            dry_run,
            units: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn pending(&self) -> usize {
        self.units.iter().map(|u| u.pending.len()).sum()
    }

    pub fn uploaded(&self) -> usize {
        self.units.iter().map(UnitReport::uploaded).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.units.iter().all(UnitReport::is_clean)
    }
}

/// Drives work units of a [`CandidateSource`] against one remote endpoint.
pub struct Reconciler<'a> {
    session: &'a Session<'a>,
    config: &'a ReconcileConfig,
    sleeper: &'a dyn Sleeper,
    cursor: CursorMode,
    upload_mode: UploadMode,
    schema: Option<&'a Schema>,
    lookups: &'a [LookupConfig],
    dry_run: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(session: &'a Session<'a>, config: &'a ReconcileConfig, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            session,
            config,
            sleeper,
            cursor: CursorMode::default(),
            upload_mode: UploadMode::default(),
            schema: None,
            lookups: &[],
            dry_run: false,
        }
    }

    pub fn cursor(mut self, cursor: CursorMode) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn upload_mode(mut self, mode: UploadMode) -> Self {
        self.upload_mode = mode;
        self
    }

    /// Canonicalize baseline records with `schema` before diffing.
    pub fn schema(mut self, schema: &'a Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn lookups(mut self, lookups: &'a [LookupConfig]) -> Self {
        self.lookups = lookups;
        self
    }

    /// Fetch and diff but send nothing and write no markers.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Reconcile every unit of `source` in order. Only a failure to list the
    /// units is an error; per-unit failures are recorded on the report.
    pub fn run<S: CandidateSource + ?Sized>(
        &self,
        job: &str,
        source: &S,
        markers: &mut dyn MarkerSink,
    ) -> Result<RunReport, SourceError> {
        let units = source.units()?;
        tracing::info!("{job}: {} work unit(s)", units.len());
        let reports = units
            .iter()
            .map(|unit| self.run_unit(source.label(unit), || source.build(unit), markers))
            .collect();
        Ok(RunReport {
            job: job.to_owned(),
            dry_run: self.dry_run,
            units: reports,
            error: None,
        })
    }

    fn fetcher(&self) -> PaginatedFetcher<'a> {
        PaginatedFetcher::new(self.session, self.config.page_size).cursor_mode(self.cursor)
    }

    fn run_unit(
        &self,
        label: String,
        build: impl FnOnce() -> Result<RecordSet, SourceError>,
        markers: &mut dyn MarkerSink,
    ) -> UnitReport {
        let mut report = UnitReport::new(label);
        let endpoint = self.config.source_endpoint.as_str();
        tracing::debug!("{}: {}", report.unit, report.phase);

        report.phase = Phase::FetchBaseline;
        let fetched = self.fetcher().fetch_outcome(endpoint);
        let mut baseline = fetched.records;
        if let Some(schema) = self.schema {
            let unconverted = schema.conform_set(&mut baseline);
            if unconverted > 0 {
                tracing::warn!("{unconverted} baseline field(s) did not match the schema type");
            }
        }
        report.baseline_records = baseline.len();
        report.baseline_stop = fetched.stop;
        if let FetchStop::Interrupted(err) = &report.baseline_stop {
            // Uploading against a partial baseline would duplicate records.
            let message = format!("baseline incomplete after {} record(s): {err}", baseline.len());
            return report.stop(message);
        }

        report.phase = Phase::BuildCandidate;
        let candidate = match build() {
            Ok(candidate) => candidate,
            Err(err) => return report.stop(err.to_string()),
        };
        report.candidate_records = candidate.len();

        report.phase = Phase::Diff;
        let diff = compare(&candidate, &baseline, &self.config.key_columns);
        report.rejected_candidates = diff.rejected_candidates;
        report.rejected_baseline = diff.rejected_baseline;
        report.skipped = diff.skipped;
        let mut pending = diff.unique;
        // Keyed before lookups rewrite names into remote ids.
        let marker_keys: Vec<_> = pending.iter().map(|r| markers.marker_key(r)).collect();
        report.lookups = resolve_lookups(&self.fetcher(), self.lookups, &mut pending);

        report.phase = Phase::Upload;
        if pending.is_empty() {
            tracing::info!("{}: no unique records to upload", report.unit);
        } else {
            report.uploads = BatchUploader::new(
                self.session,
                self.config.batch_size,
                self.config.inter_batch_delay(),
                self.sleeper,
            )
            .mode(self.upload_mode)
            .dry_run(self.dry_run)
            .upload(endpoint, &pending);
        }

        report.phase = Phase::MarkDone;
        if !self.dry_run {
            let at = Local::now().naive_local();
            let status = markers.status().to_owned();
            let updates: Vec<MarkerUpdate> = report
                .uploads
                .iter()
                .flat_map(UploadOutcome::accepted_indices)
                .filter_map(|i| marker_keys.get(i).cloned().flatten())
                .map(|key| MarkerUpdate {
                    key,
                    status: status.clone(),
                    at,
                })
                .collect();
            report.markers = markers.write_markers(&updates);
        }
        report.pending = pending;

        report.phase = Phase::End;
        tracing::info!(
            "{}: {} candidate, {} pending, {} uploaded",
            report.unit,
            report.candidate_records,
            report.pending.len(),
            report.uploaded()
        );
        report
    }
}
