//! tally core library: record model, composite keys, schemas, job configuration.
//!
//! Public API surface:
//! - [`value`] / [`record`]: scalar values, ordered records, record sets
//! - [`key`]: [`KeyColumns`] and [`CompositeKey`]
//! - [`schema`]: explicit per-job field list, ingestion of sheet rows
//! - [`a1`]: spreadsheet A1 range notation
//! - [`config`]: job files under `~/.tally/jobs/`
//! - [`error`]: [`ConfigError`], [`SchemaError`]

pub mod a1;
pub mod config;
pub mod error;
pub mod key;
pub mod record;
pub mod schema;
pub mod value;

pub use a1::A1Range;
pub use config::{
    CursorMode, JobConfig, LookupConfig, MarkerConfig, ReconcileConfig, SourceConfig, UploadMode,
};
pub use error::{ConfigError, SchemaError};
pub use key::{CompositeKey, KeyColumns, KEY_SEPARATOR};
pub use record::{Record, RecordSet};
pub use schema::{FieldKind, FieldSpec, Ingested, RowRejection, Schema};
pub use value::Value;
