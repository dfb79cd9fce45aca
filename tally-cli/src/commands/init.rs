//! `tally init <job> --endpoint <url> --key <col>... (--sheet <id> --range <a1> | --folder <id> | --drive-json <id>)`

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};

use tally_core::{
    config::{
        self, DEFAULT_BATCH_SIZE, DEFAULT_GOOGLE_TOKEN_ENV, DEFAULT_GROUP_SIZE,
        DEFAULT_INTER_BATCH_DELAY_SECONDS, DEFAULT_PAGE_SIZE,
    },
    FieldKind, FieldSpec, JobConfig, KeyColumns, ReconcileConfig, Schema, SourceConfig,
};

/// Create a job file.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("source").required(true).args(["sheet", "folder", "drive_json"])))]
pub struct InitArgs {
    /// Job name; becomes ~/.tally/jobs/<job>.yaml
    pub job: String,

    /// Remote object endpoint, e.g. https://app.example.com/api/1.1/obj/payments
    #[arg(long)]
    pub endpoint: String,

    /// Key column; repeat for a composite key (order matters).
    #[arg(long = "key", short = 'k', required = true, value_name = "COLUMN")]
    pub keys: Vec<String>,

    /// Spreadsheet id of a sheet-backed job.
    #[arg(long, requires = "range")]
    pub sheet: Option<String>,

    /// A1 range holding the header row and data, e.g. Leads!A:E
    #[arg(long)]
    pub range: Option<String>,

    /// Root folder id of a folder-tree job.
    #[arg(long)]
    pub folder: Option<String>,

    /// Drive file id of a JSON array of entries.
    #[arg(long, value_name = "FILE_ID")]
    pub drive_json: Option<String>,

    /// Top-level folders reconciled per pass (folder-tree jobs).
    #[arg(long, default_value_t = DEFAULT_GROUP_SIZE)]
    pub group_size: usize,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Seconds to wait between upload batches.
    #[arg(long, default_value_t = DEFAULT_INTER_BATCH_DELAY_SECONDS, value_name = "SECS")]
    pub delay: f64,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let keys = KeyColumns::new(self.keys.clone()).context("invalid --key list")?;
        let mut reconcile = ReconcileConfig::new(self.endpoint.clone(), keys.clone());
        reconcile.batch_size = self.batch_size;
        reconcile.page_size = self.page_size;
        reconcile.inter_batch_delay_seconds = self.delay;

        let source = match (self.sheet, self.folder, self.drive_json) {
            (Some(spreadsheet_id), _, _) => SourceConfig::Sheet {
                spreadsheet_id,
                range: self.range.context("--sheet needs --range")?,
                token_env: DEFAULT_GOOGLE_TOKEN_ENV.to_owned(),
            },
            (None, Some(root_folder_id), _) => SourceConfig::FolderTree {
                root_folder_id,
                group_size: self.group_size,
                token_env: DEFAULT_GOOGLE_TOKEN_ENV.to_owned(),
            },
            (None, None, Some(file_id)) => SourceConfig::DriveJson {
                file_id,
                token_env: DEFAULT_GOOGLE_TOKEN_ENV.to_owned(),
            },
            (None, None, None) => anyhow::bail!("provide --sheet, --folder or --drive-json"),
        };
        let is_sheet = matches!(source, SourceConfig::Sheet { .. });

        let mut job = JobConfig::new(self.job.clone(), reconcile, source);
        if is_sheet {
            // Key columns as text; further columns are declared by editing the file.
            job.schema = Schema::new(
                keys.iter()
                    .map(|k| FieldSpec::new(k, FieldKind::Text))
                    .collect(),
            );
        }

        let home = dirs::home_dir().context("could not determine home directory")?;
        let existed = config::job_path_at(&home, &self.job).exists();
        let job = config::init_job_at(&home, job)
            .with_context(|| format!("failed to init job '{}'", self.job))?;

        if existed {
            println!("✓ Job '{}' already exists; left unchanged", job.name);
        } else {
            println!("✓ Created job '{}'", job.name);
        }
        println!("  Saved to: ~/.tally/jobs/{}.yaml", job.name);
        if is_sheet && !existed {
            println!("  Declare the remaining sheet columns under `schema:` before running.");
        }
        Ok(())
    }
}
