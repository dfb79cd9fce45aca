//! `tally run <job> | --all`: reconcile and upload.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use tally_sync::{
    pipeline::{self, JobScope},
    BatchResult, RunReport, UnitReport,
};

/// Arguments for `tally run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Name of the job to run (omit when using `--all`).
    pub job: Option<String>,

    /// Run every saved job.
    #[arg(long, conflicts_with = "job")]
    pub all: bool,

    /// Fetch and diff only; upload nothing and write no markers.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;

        let reports = if self.all {
            pipeline::run(&home, JobScope::All, self.dry_run).context("run --all failed")?
        } else {
            let name = self.job.clone().context("provide a job name or use --all")?;
            pipeline::run(&home, JobScope::Job(name.clone()), self.dry_run)
                .with_context(|| format!("run failed for '{name}'"))?
        };

        if self.json {
            let payload: Vec<RunReportJson> = reports.iter().map(RunReportJson::from).collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize run JSON")?
            );
        } else {
            if reports.is_empty() {
                println!("No jobs found. Run `tally init` first.");
            }
            for report in &reports {
                print_report(report);
            }
        }

        let failed = reports.iter().filter(|r| !r.is_clean()).count();
        if failed > 0 {
            anyhow::bail!("{failed} job(s) finished with failures");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Text output
// ---------------------------------------------------------------------------

pub(crate) fn print_report(report: &RunReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    let mark = if report.is_clean() {
        "✓".green()
    } else {
        "✗".red()
    };
    if let Some(error) = &report.error {
        println!("{prefix}{mark} '{}': did not run: {error}", report.job);
        return;
    }
    if report.dry_run {
        println!(
            "{prefix}{mark} '{}': {} record(s) would be uploaded",
            report.job,
            report.pending()
        );
    } else {
        println!(
            "{prefix}{mark} '{}': {} of {} pending record(s) uploaded",
            report.job,
            report.uploaded(),
            report.pending()
        );
    }
    for unit in &report.units {
        print_unit(unit);
    }
}

fn print_unit(unit: &UnitReport) {
    println!(
        "  {}: {} candidate, {} remote, {} pending",
        unit.unit,
        unit.candidate_records,
        unit.baseline_records,
        unit.pending.len()
    );
    if let Some(missing) = &unit.skipped {
        println!(
            "    {} key column '{}' missing from {} records; nothing compared",
            "!".yellow(),
            missing.column,
            missing.side.as_str()
        );
    }
    if unit.rejected_candidates + unit.rejected_baseline > 0 {
        println!(
            "    {} {} candidate / {} remote record(s) lacked a key field",
            "!".yellow(),
            unit.rejected_candidates,
            unit.rejected_baseline
        );
    }
    for outcome in &unit.uploads {
        let line = match &outcome.result {
            BatchResult::Accepted { status, .. } => format!(
                "{} batch {} ({} records): HTTP {status}, {} stored",
                "✎".green(),
                outcome.batch,
                outcome.len,
                outcome.accepted_count()
            ),
            BatchResult::Rejected { status, .. } => format!(
                "{} batch {} ({} records): HTTP {status}",
                "✗".red(),
                outcome.batch,
                outcome.len
            ),
            BatchResult::Failed(err) => format!("{} batch {}: {err}", "✗".red(), outcome.batch),
            BatchResult::Skipped => format!("· batch {}: skipped", outcome.batch),
            BatchResult::DryRun => format!("~ batch {} ({} records)", outcome.batch, outcome.len),
        };
        println!("    {line}");
    }
    let markers = &unit.markers;
    if markers.rows_marked + markers.logged > 0 {
        println!(
            "    markers: {} row(s) marked, {} logged",
            markers.rows_marked, markers.logged
        );
    }
    for key in &markers.unmatched {
        println!("    {} no sheet row for {key}", "!".yellow());
    }
    for failure in &markers.failed {
        println!("    {} marker write failed: {failure}", "✗".red());
    }
    if let Some(error) = &unit.error {
        println!("    {} stopped at {}: {error}", "✗".red(), unit.phase);
    }
}

// ---------------------------------------------------------------------------
// JSON output
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct RunReportJson {
    job: String,
    dry_run: bool,
    pending: usize,
    uploaded: usize,
    clean: bool,
    error: Option<String>,
    units: Vec<UnitJson>,
}

#[derive(Serialize)]
struct UnitJson {
    unit: String,
    phase: String,
    baseline_records: usize,
    baseline_complete: bool,
    candidate_records: usize,
    pending: usize,
    uploaded: usize,
    failed_batches: usize,
    rejected_candidates: usize,
    rejected_baseline: usize,
    missing_key_column: Option<String>,
    markers_written: usize,
    markers_logged: usize,
    markers_unmatched: usize,
    marker_failures: Vec<String>,
    error: Option<String>,
}

impl From<&RunReport> for RunReportJson {
    fn from(report: &RunReport) -> Self {
        Self {
            job: report.job.clone(),
            dry_run: report.dry_run,
            pending: report.pending(),
            uploaded: report.uploaded(),
            clean: report.is_clean(),
            error: report.error.clone(),
            units: report.units.iter().map(UnitJson::from).collect(),
        }
    }
}

impl From<&UnitReport> for UnitJson {
    fn from(unit: &UnitReport) -> Self {
        Self {
            unit: unit.unit.clone(),
            phase: unit.phase.to_string(),
            baseline_records: unit.baseline_records,
            baseline_complete: unit.baseline_stop.is_complete(),
            candidate_records: unit.candidate_records,
            pending: unit.pending.len(),
            uploaded: unit.uploaded(),
            failed_batches: unit.failed_batches(),
            rejected_candidates: unit.rejected_candidates,
            rejected_baseline: unit.rejected_baseline,
            missing_key_column: unit.skipped.as_ref().map(|m| m.column.clone()),
            markers_written: unit.markers.rows_marked,
            markers_logged: unit.markers.logged,
            markers_unmatched: unit.markers.unmatched.len(),
            marker_failures: unit.markers.failed.clone(),
            error: unit.error.clone(),
        }
    }
}
