//! Error types for tally-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from loading, validating or saving job files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, disk full, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse job file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`, so we cannot locate `~/.tally/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The job YAML file did not exist at the expected path.
    #[error("job not found at {path}")]
    JobNotFound { path: PathBuf },

    /// A field holds a value the engine cannot run with.
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: String, reason: String },

    /// A spreadsheet range could not be parsed as A1 notation.
    #[error("invalid A1 range '{range}': {reason}")]
    Range { range: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while turning tabular rows into records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// No fields were declared; ingestion refuses to trust header rows alone.
    #[error("schema declares no fields")]
    Empty,

    /// The range returned no rows at all, not even a header.
    #[error("sheet range returned no header row")]
    NoHeader,

    /// A declared field has no column in the header row.
    #[error("column '{column}' is declared in the schema but missing from the header row")]
    MissingColumn { column: String },
}
