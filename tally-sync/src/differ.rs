//! Keyed set difference between a candidate set and the remote baseline.
//!
//! Records are identified by a [`CompositeKey`] built from the job's key
//! columns. A record lacking any key field is excluded from comparison and
//! counted; a key column absent from a whole non-empty set skips the diff
//! entirely so a misconfigured job never re-uploads everything.

use std::collections::HashSet;

use tally_core::{CompositeKey, KeyColumns, Record, RecordSet};

/// Which side of the comparison a record set is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Candidate,
    Baseline,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Candidate => "candidate",
            Side::Baseline => "baseline",
        }
    }
}

/// A declared key column that one side does not carry at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingKeyColumn {
    pub column: String,
    pub side: Side,
}

/// Outcome of one comparison.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffReport {
    /// Candidate records with no key match in the baseline, candidate order.
    pub unique: RecordSet,
    /// Candidate records excluded because a key field was missing.
    pub rejected_candidates: usize,
    /// Baseline records excluded because a key field was missing.
    pub rejected_baseline: usize,
    /// Set when the comparison was skipped; `unique` is then empty.
    pub skipped: Option<MissingKeyColumn>,
}

fn precheck(candidate: &RecordSet, baseline: &RecordSet, keys: &KeyColumns) -> Option<MissingKeyColumn> {
    for (set, side) in [(candidate, Side::Candidate), (baseline, Side::Baseline)] {
        // An empty set has no rows that could lack a column.
        if set.is_empty() {
            continue;
        }
        if let Some(column) = keys.first_missing_in(set) {
            tracing::warn!(
                "key column '{column}' not present in the {} records; nothing will be uploaded",
                side.as_str()
            );
            return Some(MissingKeyColumn {
                column: column.to_owned(),
                side,
            });
        }
    }
    None
}

fn keyed<'r>(set: &'r RecordSet, keys: &KeyColumns) -> (Vec<(CompositeKey, &'r Record)>, usize) {
    let mut out = Vec::with_capacity(set.len());
    let mut rejected = 0;
    for record in set {
        match keys.key_for(record) {
            Some(key) => out.push((key, record)),
            None => rejected += 1,
        }
    }
    (out, rejected)
}

#[derive(Clone, Copy)]
enum Lookup {
    Hashed,
    Sorted,
}

fn select(candidate: &RecordSet, baseline: &RecordSet, keys: &KeyColumns, lookup: Lookup) -> DiffReport {
    if let Some(missing) = precheck(candidate, baseline, keys) {
        return DiffReport {
            unique: RecordSet::with_fields(candidate.fields().iter().cloned()),
            skipped: Some(missing),
            ..DiffReport::default()
        };
    }

    let (baseline_keyed, rejected_baseline) = keyed(baseline, keys);
    let mut baseline_keys: Vec<CompositeKey> = baseline_keyed.into_iter().map(|(k, _)| k).collect();
    let hashed: HashSet<CompositeKey> = match lookup {
        Lookup::Hashed => baseline_keys.drain(..).collect(),
        Lookup::Sorted => {
            baseline_keys.sort_unstable();
            HashSet::new()
        }
    };
    let seen = |key: &CompositeKey| match lookup {
        Lookup::Hashed => hashed.contains(key),
        Lookup::Sorted => baseline_keys.binary_search(key).is_ok(),
    };

    let (candidate_keyed, rejected_candidates) = keyed(candidate, keys);
    let mut unique = RecordSet::with_fields(candidate.fields().iter().cloned());
    for (key, record) in candidate_keyed {
        if !seen(&key) {
            tracing::trace!("unique: {key}");
            unique.push(record.clone());
        }
    }
    if rejected_candidates + rejected_baseline > 0 {
        tracing::warn!(
            "excluded {rejected_candidates} candidate and {rejected_baseline} baseline record(s) missing a key field"
        );
    }
    tracing::info!("{} of {} candidate record(s) are unique", unique.len(), candidate.len());
    DiffReport {
        unique,
        rejected_candidates,
        rejected_baseline,
        skipped: None,
    }
}

/// Hash-set membership comparison.
pub fn compare(candidate: &RecordSet, baseline: &RecordSet, keys: &KeyColumns) -> DiffReport {
    select(candidate, baseline, keys, Lookup::Hashed)
}

/// Sorted-key binary-search comparison. Same result as [`compare`].
pub fn compare_sorted(candidate: &RecordSet, baseline: &RecordSet, keys: &KeyColumns) -> DiffReport {
    select(candidate, baseline, keys, Lookup::Sorted)
}

/// Candidate records whose key does not occur in the baseline.
pub fn diff(candidate: &RecordSet, baseline: &RecordSet, keys: &KeyColumns) -> RecordSet {
    compare(candidate, baseline, keys).unique
}

/// [`diff`] via [`compare_sorted`].
pub fn diff_sorted(candidate: &RecordSet, baseline: &RecordSet, keys: &KeyColumns) -> RecordSet {
    compare_sorted(candidate, baseline, keys).unique
}
