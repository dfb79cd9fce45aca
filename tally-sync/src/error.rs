//! Error types for tally-sync.

use thiserror::Error;

use tally_core::{ConfigError, SchemaError};

/// Failure talking to a remote HTTP service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    /// No response was received (connect, TLS, timeout, broken body).
    #[error("transport error calling {url}: {message}")]
    Transport { url: String, message: String },

    /// A response arrived with a non-success status.
    #[error("{url} answered HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// A success response whose body did not have the expected shape.
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Failure reading or writing a candidate source (sheet, folder tree).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Downloaded content that is not a list of records.
    #[error("{file} is not a JSON array of objects: {message}")]
    Malformed { file: String, message: String },
}

/// All errors that abort a pipeline run before any unit starts.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// A required credential environment variable is unset or empty.
    #[error("environment variable {var} is not set (needed by job '{job}')")]
    MissingToken { var: String, job: String },
}

/// Convenience constructor for [`HttpError::Decode`].
pub(crate) fn decode_err(url: &str, message: impl ToString) -> HttpError {
    HttpError::Decode {
        url: url.to_owned(),
        message: message.to_string(),
    }
}
