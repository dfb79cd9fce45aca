//! `tally diff <job>`: show what a run would upload.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tabled::{builder::Builder, settings::Style};

use tally_core::RecordSet;
use tally_sync::pipeline::{self, JobScope};

use super::run::print_report;

/// Arguments for `tally diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Job name to diff.
    pub job: String,

    /// Show at most this many pending records per work unit.
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;

        let reports = pipeline::run(&home, JobScope::Job(self.job.clone()), true)
            .with_context(|| format!("diff failed for '{}'", self.job))?;

        for report in &reports {
            print_report(report);
            for unit in &report.units {
                if !unit.pending.is_empty() {
                    println!("{}", pending_table(&unit.pending, self.limit));
                    if unit.pending.len() > self.limit {
                        println!("  … {} more", unit.pending.len() - self.limit);
                    }
                }
            }
        }
        Ok(())
    }
}

fn pending_table(records: &RecordSet, limit: usize) -> String {
    let mut builder = Builder::default();
    builder.set_header(records.fields().iter().cloned());
    for record in records.iter().take(limit) {
        builder.push_record(
            records
                .fields()
                .iter()
                .map(|f| record.get(f).map(|v| v.key_text()).unwrap_or_default()),
        );
    }
    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}
