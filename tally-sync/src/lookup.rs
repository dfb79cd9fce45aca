//! Name → remote id substitution for reference fields.
//!
//! Some remote fields reference other remote objects by id while the
//! candidate source carries display names. Before upload, each configured
//! field is rewritten using a table fetched from the referenced collection.

use std::collections::HashMap;

use tally_core::{LookupConfig, RecordSet, Value};

use crate::fetcher::PaginatedFetcher;

/// Display name → id, built from one remote collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupTable {
    ids: HashMap<String, String>,
}

impl LookupTable {
    /// Index `records` by `match_field`. Records missing either field are
    /// ignored; on duplicate names the first record wins.
    pub fn from_records(records: &RecordSet, match_field: &str, id_field: &str) -> Self {
        let mut ids = HashMap::new();
        for record in records {
            let (Some(name), Some(id)) = (record.get(match_field), record.get(id_field)) else {
                continue;
            };
            if name.is_null() || id.is_null() {
                continue;
            }
            ids.entry(name.key_text()).or_insert_with(|| id.key_text());
        }
        Self { ids }
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.ids.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Rewrite `fields` of every record. Unmatched names become null.
    /// Returns `(resolved, unresolved)` counts; null cells count as neither.
    pub fn apply(&self, fields: &[String], records: &mut RecordSet) -> (usize, usize) {
        let mut resolved = 0;
        let mut unresolved = 0;
        for record in records.records_mut() {
            for field in fields {
                let Some(value) = record.get_mut(field) else {
                    continue;
                };
                if value.is_null() {
                    continue;
                }
                let name = value.key_text();
                match self.resolve(&name) {
                    Some(id) => {
                        *value = Value::Text(id.to_owned());
                        resolved += 1;
                    }
                    None => {
                        tracing::warn!("no remote id for {field} '{name}'; sending null");
                        *value = Value::Null;
                        unresolved += 1;
                    }
                }
            }
        }
        (resolved, unresolved)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupReport {
    pub resolved: usize,
    pub unresolved: usize,
    /// Endpoints whose table could not be fetched completely; their fields
    /// were left untouched.
    pub incomplete: Vec<String>,
}

/// Fetch each lookup's table and rewrite its fields in `records`.
pub fn resolve_lookups(
    fetcher: &PaginatedFetcher<'_>,
    lookups: &[LookupConfig],
    records: &mut RecordSet,
) -> LookupReport {
    let mut report = LookupReport::default();
    if records.is_empty() {
        return report;
    }
    for lookup in lookups {
        let outcome = fetcher.fetch_outcome(&lookup.endpoint);
        if !outcome.is_complete() {
            tracing::error!(
                "lookup table from {} is incomplete; {} left as names",
                lookup.endpoint,
                lookup.fields.join(", ")
            );
            report.incomplete.push(lookup.endpoint.clone());
            continue;
        }
        let table = LookupTable::from_records(&outcome.records, &lookup.match_field, &lookup.id_field);
        tracing::debug!("lookup table from {}: {} name(s)", lookup.endpoint, table.len());
        let (resolved, unresolved) = table.apply(&lookup.fields, records);
        report.resolved += resolved;
        report.unresolved += unresolved;
    }
    report
}

#[cfg(test)]
mod tests {
    use tally_core::Record;

    use super::*;

    fn table() -> LookupTable {
        let remote = RecordSet::from_records([
            [("name", "Group A"), ("_id", "1700x1")].into_iter().collect::<Record>(),
            [("name", "Group B"), ("_id", "1700x2")].into_iter().collect::<Record>(),
            [("name", "Group A"), ("_id", "1700x9")].into_iter().collect::<Record>(),
            [("_id", "orphan")].into_iter().collect::<Record>(),
        ]);
        LookupTable::from_records(&remote, "name", "_id")
    }

    #[test]
    fn first_record_wins_on_duplicate_names() {
        let t = table();
        assert_eq!(t.len(), 2);
        assert_eq!(t.resolve("Group A"), Some("1700x1"));
    }

    #[test]
    fn apply_replaces_names_and_nulls_unknowns() {
        let mut records = RecordSet::from_records([
            [("group", "Group B"), ("amount", "5")].into_iter().collect::<Record>(),
            [("group", "Group Z"), ("amount", "6")].into_iter().collect::<Record>(),
        ]);
        let mut blank = Record::new();
        blank.insert("group", Value::Null);
        records.push(blank);

        let (resolved, unresolved) = table().apply(&["group".to_owned()], &mut records);
        assert_eq!((resolved, unresolved), (1, 1));
        assert_eq!(records.records()[0].get("group"), Some(&Value::from("1700x2")));
        assert_eq!(records.records()[1].get("group"), Some(&Value::Null));
        assert_eq!(records.records()[0].get("amount"), Some(&Value::from("5")));
    }
}
