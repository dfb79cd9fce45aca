//! `tally jobs list`

use anyhow::{Context, Result};
use clap::Subcommand;
use tabled::{settings::Style, Table, Tabled};

use tally_core::config;

use super::describe_source;

/// Inspect saved jobs.
#[derive(Subcommand, Debug)]
pub enum JobsCommand {
    /// List every job under ~/.tally/jobs/.
    List,
}

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "job")]
    name: String,
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "endpoint")]
    endpoint: String,
    #[tabled(rename = "keys")]
    keys: String,
}

pub fn run(cmd: JobsCommand) -> Result<()> {
    match cmd {
        JobsCommand::List => list(),
    }
}

fn list() -> Result<()> {
    let jobs = config::list_jobs().context("failed to load jobs")?;
    if jobs.is_empty() {
        println!("No jobs found.");
        println!("Run: tally init <job> --endpoint <url> --key <column> --sheet <id> --range <a1>");
        return Ok(());
    }

    let rows: Vec<JobRow> = jobs
        .iter()
        .map(|job| JobRow {
            name: job.name.clone(),
            source: describe_source(&job.source),
            endpoint: job.reconcile.source_endpoint.clone(),
            keys: job.reconcile.key_columns.names().join(", "),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}
