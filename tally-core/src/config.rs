//! Per-job YAML configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.tally/
//!   jobs/
//!     <job_name>.yaml   (one file per job, mode 0600)
//! ```
//!
//! # API pattern
//!
//! Every function touching the filesystem has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Secrets never live in job files; `token_env` fields name the environment
//! variables holding bearer tokens.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::a1::A1Range;
use crate::error::ConfigError;
use crate::key::KeyColumns;
use crate::schema::Schema;

pub const DEFAULT_API_TOKEN_ENV: &str = "TALLY_API_TOKEN";
pub const DEFAULT_GOOGLE_TOKEN_ENV: &str = "TALLY_GOOGLE_TOKEN";
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_INTER_BATCH_DELAY_SECONDS: f64 = 1.0;
pub const DEFAULT_GROUP_SIZE: usize = 10;
pub const DEFAULT_MARKER_STATUS: &str = "Inserted";

// ---------------------------------------------------------------------------
// 1. Types
// ---------------------------------------------------------------------------

/// The engine-facing settings of one reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    pub source_endpoint: String,
    pub key_columns: KeyColumns,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_delay")]
    pub inter_batch_delay_seconds: f64,
}

/// How the remote pagination cursor advances between pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorMode {
    /// Cursor grows by the page size.
    #[default]
    Offset,
    /// Cursor grows by the number of records actually received.
    Accumulated,
}

/// How unique records are sent to the remote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// `POST {endpoint}/bulk`, newline-delimited JSON.
    #[default]
    Bulk,
    /// `POST {endpoint}` once per record.
    PerRecord,
}

/// Where candidate records come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// A spreadsheet range whose first row is the header.
    Sheet {
        spreadsheet_id: String,
        range: String,
        #[serde(default = "default_google_token_env")]
        token_env: String,
    },
    /// A folder tree; each top-level folder is one entity group.
    FolderTree {
        root_folder_id: String,
        #[serde(default = "default_group_size")]
        group_size: usize,
        #[serde(default = "default_google_token_env")]
        token_env: String,
    },
    /// A Drive file holding a JSON array of records.
    DriveJson {
        file_id: String,
        #[serde(default = "default_google_token_env")]
        token_env: String,
    },
}

impl SourceConfig {
    /// Environment variable holding the source service's bearer token.
    pub fn token_env(&self) -> &str {
        match self {
            SourceConfig::Sheet { token_env, .. }
            | SourceConfig::FolderTree { token_env, .. }
            | SourceConfig::DriveJson { token_env, .. } => token_env,
        }
    }
}

/// Write-back of "inserted" markers into the source sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerConfig {
    /// Two columns receiving `[status, timestamp]`, e.g. `F:G`.
    pub columns: String,
    #[serde(default = "default_marker_status")]
    pub status: String,
    /// Range receiving one appended `[key, timestamp]` row per update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_range: Option<String>,
    /// Columns identifying the sheet row; defaults to the job's key columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_columns: Option<KeyColumns>,
}

/// Replace names with remote record ids before upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupConfig {
    pub fields: Vec<String>,
    pub endpoint: String,
    #[serde(default = "default_match_field")]
    pub match_field: String,
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

/// One job file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    #[serde(flatten)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub cursor: CursorMode,
    #[serde(default)]
    pub upload_mode: UploadMode,
    #[serde(default = "default_api_token_env")]
    pub token_env: String,
    #[serde(default, skip_serializing_if = "Schema::is_empty")]
    pub schema: Schema,
    pub source: SourceConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markers: Option<MarkerConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lookups: Vec<LookupConfig>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}
fn default_delay() -> f64 {
    DEFAULT_INTER_BATCH_DELAY_SECONDS
}
fn default_group_size() -> usize {
    DEFAULT_GROUP_SIZE
}
fn default_api_token_env() -> String {
    DEFAULT_API_TOKEN_ENV.to_owned()
}
fn default_google_token_env() -> String {
    DEFAULT_GOOGLE_TOKEN_ENV.to_owned()
}
fn default_marker_status() -> String {
    DEFAULT_MARKER_STATUS.to_owned()
}
fn default_match_field() -> String {
    "name".to_owned()
}
fn default_id_field() -> String {
    "_id".to_owned()
}

// ---------------------------------------------------------------------------
// 2. Validation
// ---------------------------------------------------------------------------

impl ReconcileConfig {
    pub fn new(source_endpoint: impl Into<String>, key_columns: KeyColumns) -> Self {
        Self {
            source_endpoint: source_endpoint.into(),
            key_columns,
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            inter_batch_delay_seconds: DEFAULT_INTER_BATCH_DELAY_SECONDS,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = self.source_endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::invalid(
                "source_endpoint",
                format!("'{}' is not an http(s) URL", self.source_endpoint),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be greater than 0"));
        }
        if self.page_size == 0 {
            return Err(ConfigError::invalid("page_size", "must be greater than 0"));
        }
        if !self.inter_batch_delay_seconds.is_finite() || self.inter_batch_delay_seconds < 0.0 {
            return Err(ConfigError::invalid(
                "inter_batch_delay_seconds",
                "must be a finite number of seconds >= 0",
            ));
        }
        if Duration::try_from_secs_f64(self.inter_batch_delay_seconds).is_err() {
            return Err(ConfigError::invalid(
                "inter_batch_delay_seconds",
                format!("{} seconds is too long a delay", self.inter_batch_delay_seconds),
            ));
        }
        Ok(())
    }

    /// The configured delay; zero when the value does not convert (`validate`
    /// rejects those).
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.inter_batch_delay_seconds).unwrap_or(Duration::ZERO)
    }
}

impl MarkerConfig {
    /// Marker columns resolved against the source range's sheet.
    pub fn marker_range(&self, source_range: &A1Range) -> Result<A1Range, ConfigError> {
        let range: A1Range = self.columns.parse()?;
        if range.width() != 2 {
            return Err(ConfigError::invalid(
                "markers.columns",
                "must span exactly two columns (status, timestamp)",
            ));
        }
        Ok(range.or_sheet(source_range.sheet.as_deref()))
    }

    pub fn log_range(&self) -> Result<Option<A1Range>, ConfigError> {
        self.log_range.as_deref().map(str::parse).transpose()
    }
}

impl JobConfig {
    /// A sheet-backed job with default settings.
    pub fn new(name: impl Into<String>, reconcile: ReconcileConfig, source: SourceConfig) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            reconcile,
            cursor: CursorMode::default(),
            upload_mode: UploadMode::default(),
            token_env: default_api_token_env(),
            schema: Schema::default(),
            source,
            markers: None,
            lookups: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Check every cross-field constraint the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_job_name(&self.name)?;
        self.reconcile.validate()?;

        if !self.schema.is_empty() {
            if let Some(missing) = self
                .reconcile
                .key_columns
                .iter()
                .find(|k| !self.schema.contains(k))
            {
                return Err(ConfigError::invalid(
                    "schema",
                    format!("key column '{missing}' is not declared in the schema"),
                ));
            }
        }

        match &self.source {
            SourceConfig::Sheet {
                spreadsheet_id,
                range,
                ..
            } => {
                if spreadsheet_id.trim().is_empty() {
                    return Err(ConfigError::invalid("source.spreadsheet_id", "must not be empty"));
                }
                let source_range: A1Range = range.parse()?;
                if self.schema.is_empty() {
                    return Err(ConfigError::invalid(
                        "schema",
                        "sheet sources need an explicit schema",
                    ));
                }
                if let Some(markers) = &self.markers {
                    markers.marker_range(&source_range)?;
                    markers.log_range()?;
                    if let Some(cols) = &markers.match_columns {
                        if let Some(missing) = cols.iter().find(|c| !self.schema.contains(c)) {
                            return Err(ConfigError::invalid(
                                "markers.match_columns",
                                format!("'{missing}' is not declared in the schema"),
                            ));
                        }
                    }
                }
            }
            SourceConfig::FolderTree {
                root_folder_id,
                group_size,
                ..
            } => {
                if root_folder_id.trim().is_empty() {
                    return Err(ConfigError::invalid("source.root_folder_id", "must not be empty"));
                }
                if *group_size == 0 {
                    return Err(ConfigError::invalid("source.group_size", "must be greater than 0"));
                }
                if self.markers.is_some() {
                    return Err(ConfigError::invalid(
                        "markers",
                        "marker write-back needs a sheet source",
                    ));
                }
            }
            SourceConfig::DriveJson { file_id, .. } => {
                if file_id.trim().is_empty() {
                    return Err(ConfigError::invalid("source.file_id", "must not be empty"));
                }
                if self.markers.is_some() {
                    return Err(ConfigError::invalid(
                        "markers",
                        "marker write-back needs a sheet source",
                    ));
                }
            }
        }

        for (i, lookup) in self.lookups.iter().enumerate() {
            if lookup.fields.is_empty() {
                return Err(ConfigError::invalid(
                    format!("lookups[{i}].fields"),
                    "name at least one field",
                ));
            }
            // Keys compare on names, never on resolved ids.
            if let Some(field) = lookup
                .fields
                .iter()
                .find(|f| self.reconcile.key_columns.iter().any(|k| k == f.as_str()))
            {
                return Err(ConfigError::invalid(
                    format!("lookups[{i}].fields"),
                    format!("'{field}' is a key column and cannot be resolved to an id"),
                ));
            }
            if !(lookup.endpoint.starts_with("http://") || lookup.endpoint.starts_with("https://")) {
                return Err(ConfigError::invalid(
                    format!("lookups[{i}].endpoint"),
                    "must be an http(s) URL",
                ));
            }
        }
        Ok(())
    }
}

/// Job names become file names: ASCII letters, digits, `-` and `_` only.
pub fn validate_job_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::invalid(
            "name",
            format!("'{name}' must be non-empty and use only letters, digits, '-' and '_'"),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 3. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.tally/jobs/`
///
/// Creates the directory (mode `0700`) if it does not yet exist.
pub fn jobs_dir_at(home: &Path) -> Result<PathBuf, ConfigError> {
    let dir = home.join(".tally").join("jobs");
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

/// `<home>/.tally/jobs/<job>.yaml`. Pure, no I/O.
pub fn job_path_at(home: &Path, job: &str) -> PathBuf {
    home.join(".tally").join("jobs").join(format!("{job}.yaml"))
}

// ---------------------------------------------------------------------------
// 4. Load
// ---------------------------------------------------------------------------

/// Load and validate `<home>/.tally/jobs/<job>.yaml`.
///
/// Returns `ConfigError::JobNotFound` if absent, `ConfigError::Parse` (with
/// path + line context) if malformed, `ConfigError::Invalid` if a value is
/// out of range.
pub fn load_job_at(home: &Path, job: &str) -> Result<JobConfig, ConfigError> {
    let path = job_path_at(home, job);
    if !path.exists() {
        return Err(ConfigError::JobNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    let config: JobConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    config.validate()?;
    Ok(config)
}

/// `load_job_at` convenience wrapper.
pub fn load_job(job: &str) -> Result<JobConfig, ConfigError> {
    load_job_at(&home()?, job)
}

/// Names of every `*.yaml` under `<home>/.tally/jobs/`, sorted.
pub fn list_job_names_at(home: &Path) -> Result<Vec<String>, ConfigError> {
    let dir = home.join(".tally").join("jobs");
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut names: Vec<String> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| {
            e.file_name()
                .to_string_lossy()
                .strip_suffix(".yaml")
                .map(str::to_owned)
        })
        .collect();
    names.sort();
    Ok(names)
}

/// `list_job_names_at` convenience wrapper.
pub fn list_job_names() -> Result<Vec<String>, ConfigError> {
    list_job_names_at(&home()?)
}

/// Load every job, sorted by name. The first invalid file aborts the listing.
pub fn list_jobs_at(home: &Path) -> Result<Vec<JobConfig>, ConfigError> {
    list_job_names_at(home)?
        .iter()
        .map(|name| load_job_at(home, name))
        .collect()
}

/// `list_jobs_at` convenience wrapper.
pub fn list_jobs() -> Result<Vec<JobConfig>, ConfigError> {
    list_jobs_at(&home()?)
}

// ---------------------------------------------------------------------------
// 5. Save (atomic)
// ---------------------------------------------------------------------------

/// Validate, then atomically save a job to `<home>/.tally/jobs/<name>.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_job_at(home: &Path, job: &JobConfig) -> Result<(), ConfigError> {
    job.validate()?;
    jobs_dir_at(home)?;
    let path = job_path_at(home, &job.name);
    let tmp_path = path.with_file_name(format!("{}.yaml.tmp", job.name));

    let yaml = serde_yaml::to_string(job)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_job_at` convenience wrapper.
pub fn save_job(job: &JobConfig) -> Result<(), ConfigError> {
    save_job_at(&home()?, job)
}

// ---------------------------------------------------------------------------
// 6. Init
// ---------------------------------------------------------------------------

/// Create `<home>/.tally/jobs/<name>.yaml` from `job`.
///
/// Idempotent: if the file already exists, loads and returns it unchanged.
pub fn init_job_at(home: &Path, job: JobConfig) -> Result<JobConfig, ConfigError> {
    validate_job_name(&job.name)?;
    if job_path_at(home, &job.name).exists() {
        return load_job_at(home, &job.name);
    }
    save_job_at(home, &job)?;
    Ok(job)
}

/// `init_job_at` convenience wrapper.
pub fn init_job(job: JobConfig) -> Result<JobConfig, ConfigError> {
    init_job_at(&home()?, job)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
