//! `tally check <job>`: validate a job file without touching the network.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use tally_core::config;

use super::describe_source;

/// Arguments for `tally check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Job name.
    pub job: String,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let job = config::load_job(&self.job)
            .with_context(|| format!("job '{}' is not valid", self.job))?;

        println!("✓ Job '{}' is valid", job.name);
        println!("  endpoint:   {}", job.reconcile.source_endpoint);
        println!("  keys:       {}", job.reconcile.key_columns.names().join(", "));
        println!("  source:     {}", describe_source(&job.source));
        println!(
            "  batches:    {} per request, {}s apart",
            job.reconcile.batch_size, job.reconcile.inter_batch_delay_seconds
        );
        println!("  page size:  {}", job.reconcile.page_size);
        if !job.schema.is_empty() {
            let fields: Vec<_> = job.schema.fields().iter().map(|f| f.name.as_str()).collect();
            println!("  schema:     {}", fields.join(", "));
        }
        if let Some(markers) = &job.markers {
            println!("  markers:    {} ({})", markers.columns, markers.status);
        }
        for lookup in &job.lookups {
            println!("  lookup:     {} via {}", lookup.fields.join(", "), lookup.endpoint);
        }

        for var in [job.token_env.as_str(), job.source.token_env()] {
            let set = std::env::var(var).map(|v| !v.trim().is_empty()).unwrap_or(false);
            let mark = if set { "set".green() } else { "missing".red() };
            println!("  ${var}: {mark}");
        }
        Ok(())
    }
}
