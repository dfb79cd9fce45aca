//! Composite keys identifying the same entity across sources.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::record::{Record, RecordSet};

/// Joins key-column values inside a [`CompositeKey`].
pub const KEY_SEPARATOR: &str = "-";

/// Stringified key-column values joined with [`KEY_SEPARATOR`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositeKey(pub String);

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for CompositeKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Ordered, non-empty list of key fields declared once per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct KeyColumns(Vec<String>);

impl KeyColumns {
    /// Validate and build. Rejects an empty list, blank names and duplicates.
    pub fn new<I, S>(columns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(ConfigError::invalid("key_columns", "at least one key column is required"));
        }
        for (i, c) in columns.iter().enumerate() {
            if c.trim().is_empty() {
                return Err(ConfigError::invalid("key_columns", "key column names must not be blank"));
            }
            if columns[..i].contains(c) {
                return Err(ConfigError::invalid(
                    "key_columns",
                    format!("key column '{c}' is listed twice"),
                ));
            }
        }
        Ok(Self(columns))
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// First key column absent from the record, if any.
    pub fn first_missing_field<'a>(&'a self, record: &Record) -> Option<&'a str> {
        self.iter().find(|c| !record.contains(c))
    }

    /// First key column absent from the set's vocabulary, if any.
    pub fn first_missing_in<'a>(&'a self, set: &RecordSet) -> Option<&'a str> {
        self.iter().find(|c| !set.has_field(c))
    }

    /// Composite key for `record`, or `None` when a key field is missing.
    pub fn key_for(&self, record: &Record) -> Option<CompositeKey> {
        let mut parts = Vec::with_capacity(self.0.len());
        for column in &self.0 {
            parts.push(record.get(column)?.key_text());
        }
        Some(CompositeKey(parts.join(KEY_SEPARATOR)))
    }
}

impl TryFrom<Vec<String>> for KeyColumns {
    type Error = ConfigError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<KeyColumns> for Vec<String> {
    fn from(k: KeyColumns) -> Self {
        k.0
    }
}
