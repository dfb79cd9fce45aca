//! Shared reconciliation entrypoint used by the CLI.
//!
//! Builds the session, collaborators, candidate source and marker sink a
//! job file describes, then hands them to a [`Reconciler`].

use std::path::Path;

use tally_core::{config, A1Range, JobConfig, SourceConfig};

use crate::drive::{GoogleDrive, DRIVE_API_BASE};
use crate::error::SyncError;
use crate::markers::{NoMarkers, SheetMarkers};
use crate::orchestrator::{Reconciler, RunReport};
use crate::session::Session;
use crate::sheets::{GoogleSheets, SHEETS_API_BASE};
use crate::source::{tree_schema, JsonFileSource, SheetSource, TreeSource};
use crate::transport::{Transport, UreqTransport};
use crate::uploader::{Sleeper, ThreadSleeper};

/// Scope for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobScope {
    /// Run every saved job, in name order.
    All,
    /// Run a single named job.
    Job(String),
}

/// Bearer tokens for the remote datastore and the candidate source.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_token: String,
    pub source_token: String,
}

impl Credentials {
    /// Read the variables named by the job's `token_env` settings.
    pub fn from_env(job: &JobConfig) -> Result<Self, SyncError> {
        Ok(Self {
            api_token: env_token(&job.token_env, &job.name)?,
            source_token: env_token(job.source.token_env(), &job.name)?,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credentials { .. }")
    }
}

fn env_token(var: &str, job: &str) -> Result<String, SyncError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| SyncError::MissingToken {
            var: var.to_owned(),
            job: job.to_owned(),
        })
}

/// Base URLs of the spreadsheet and folder services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrls {
    pub sheets: String,
    pub drive: String,
}

impl Default for ServiceUrls {
    fn default() -> Self {
        Self {
            sheets: SHEETS_API_BASE.to_owned(),
            drive: DRIVE_API_BASE.to_owned(),
        }
    }
}

/// I/O the pipeline runs on.
pub struct Runtime<'a> {
    pub transport: &'a dyn Transport,
    pub sleeper: &'a dyn Sleeper,
    pub services: ServiceUrls,
}

/// Run one job on an explicit runtime.
pub fn run_job_with(
    job: &JobConfig,
    credentials: &Credentials,
    runtime: &Runtime<'_>,
    dry_run: bool,
) -> Result<RunReport, SyncError> {
    job.validate()?;
    let api = Session::new(runtime.transport, credentials.api_token.as_str());
    let source_session = Session::new(runtime.transport, credentials.source_token.as_str());
    let reconciler = Reconciler::new(&api, &job.reconcile, runtime.sleeper)
        .cursor(job.cursor)
        .upload_mode(job.upload_mode)
        .lookups(&job.lookups)
        .dry_run(dry_run);

    let report = match &job.source {
        SourceConfig::Sheet {
            spreadsheet_id,
            range,
            ..
        } => {
            let range: A1Range = range.parse()?;
            let sheets = GoogleSheets::with_base(&source_session, spreadsheet_id.as_str(), runtime.services.sheets.as_str());
            let source = SheetSource::new(&sheets, range.clone(), &job.schema);
            let reconciler = reconciler.schema(&job.schema);
            match &job.markers {
                Some(markers) => {
                    let marker_range = markers.marker_range(&range)?;
                    let log_range = markers.log_range()?;
                    let match_columns = markers
                        .match_columns
                        .clone()
                        .unwrap_or_else(|| job.reconcile.key_columns.clone());
                    let mut sink = SheetMarkers::new(
                        &sheets,
                        range,
                        marker_range,
                        &job.schema,
                        match_columns,
                        markers.status.as_str(),
                    )
                    .log_to(log_range);
                    reconciler.run(&job.name, &source, &mut sink)?
                }
                None => reconciler.run(&job.name, &source, &mut NoMarkers)?,
            }
        }
        SourceConfig::FolderTree {
            root_folder_id,
            group_size,
            ..
        } => {
            let drive = GoogleDrive::with_base(&source_session, runtime.services.drive.as_str());
            let source = TreeSource::new(&drive, root_folder_id.as_str(), *group_size);
            let schema = if job.schema.is_empty() {
                tree_schema()
            } else {
                job.schema.clone()
            };
            reconciler.schema(&schema).run(&job.name, &source, &mut NoMarkers)?
        }
        SourceConfig::DriveJson { file_id, .. } => {
            let drive = GoogleDrive::with_base(&source_session, runtime.services.drive.as_str());
            let source = JsonFileSource::new(&drive, file_id.as_str(), &job.schema);
            reconciler
                .schema(&job.schema)
                .run(&job.name, &source, &mut NoMarkers)?
        }
    };
    Ok(report)
}

/// Run one job with credentials from the environment over HTTP.
pub fn run_job(job: &JobConfig, dry_run: bool) -> Result<RunReport, SyncError> {
    let credentials = Credentials::from_env(job)?;
    let transport = UreqTransport::default();
    let runtime = Runtime {
        transport: &transport,
        sleeper: &ThreadSleeper,
        services: ServiceUrls::default(),
    };
    run_job_with(job, &credentials, &runtime, dry_run)
}

/// Run the pipeline for a scope.
///
/// This is the canonical entrypoint for `tally run` and `tally diff`.
///
/// A single job's failure is returned as the error. Under [`JobScope::All`]
/// a job that cannot run is recorded on its report and the next job runs.
pub fn run(home: &Path, scope: JobScope, dry_run: bool) -> Result<Vec<RunReport>, SyncError> {
    run_scope(home, scope, dry_run, run_job)
}

fn run_scope(
    home: &Path,
    scope: JobScope,
    dry_run: bool,
    run_one: impl Fn(&JobConfig, bool) -> Result<RunReport, SyncError>,
) -> Result<Vec<RunReport>, SyncError> {
    match scope {
        JobScope::Job(name) => {
            let job = config::load_job_at(home, &name)?;
            Ok(vec![run_one(&job, dry_run)?])
        }
        JobScope::All => {
            let jobs = config::list_jobs_at(home)?;
            Ok(jobs
                .iter()
                .map(|job| {
                    run_one(job, dry_run).unwrap_or_else(|err| {
                        tracing::error!("job '{}' did not run: {err}", job.name);
                        RunReport::failed(job.name.as_str(), dry_run, err.to_string())
                    })
                })
                .collect())
        }
    }
}
