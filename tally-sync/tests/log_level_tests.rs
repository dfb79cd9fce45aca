//! Fail-soft conditions log at `warn`, once.

use std::cell::RefCell;

use tracing::{Level, LevelFilter, Log, Metadata, Record as LogRecord};

use tally_core::{KeyColumns, Record, RecordSet};
use tally_sync::{
    diff, FetchStop, HttpError, HttpRequest, HttpResponse, PaginatedFetcher, Session, Transport,
};

thread_local! {
    static CAPTURED: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

/// Collects records per test thread.
struct Capture;

impl Log for Capture {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &LogRecord<'_>) {
        CAPTURED.with(|c| c.borrow_mut().push((record.level(), record.args().to_string())));
    }

    fn flush(&self) {}
}

static CAPTURE: Capture = Capture;

fn capture<T>(f: impl FnOnce() -> T) -> (T, Vec<(Level, String)>) {
    let _ = tracing::set_logger(&CAPTURE);
    tracing::set_max_level(LevelFilter::Trace);
    CAPTURED.with(|c| c.borrow_mut().clear());
    let out = f();
    (out, CAPTURED.with(|c| c.borrow_mut().drain(..).collect()))
}

fn at(logs: &[(Level, String)], level: Level) -> Vec<&str> {
    logs.iter()
        .filter(|(l, _)| *l == level)
        .map(|(_, m)| m.as_str())
        .collect()
}

fn set(rows: &[&[(&str, &str)]]) -> RecordSet {
    rows.iter()
        .map(|r| r.iter().copied().collect::<Record>())
        .collect()
}

#[test]
fn baseline_without_key_column_warns_exactly_once() {
    let candidate = set(&[&[("id", "A"), ("k", "x")], &[("id", "B"), ("k", "y")]]);
    let baseline = set(&[&[("k", "x")]]);
    let keys = KeyColumns::new(["id"]).unwrap();

    let (unique, logs) = capture(|| diff(&candidate, &baseline, &keys));

    assert!(unique.is_empty());
    let warnings = at(&logs, Level::Warn);
    assert_eq!(warnings.len(), 1, "logs: {logs:?}");
    assert!(warnings[0].contains("'id'") && warnings[0].contains("baseline"));
    assert!(at(&logs, Level::Error).is_empty(), "logs: {logs:?}");
}

struct Unavailable;

impl Transport for Unavailable {
    fn send(&self, _: &HttpRequest) -> Result<HttpResponse, HttpError> {
        Ok(HttpResponse::new(503, "maintenance"))
    }
}

#[test]
fn non_success_fetch_status_is_a_warning() {
    let transport = Unavailable;
    let session = Session::new(&transport, "t");
    let (outcome, logs) = capture(|| {
        PaginatedFetcher::new(&session, 100).fetch_outcome("https://api.test/api/1.1/obj/payments")
    });

    assert!(matches!(
        outcome.stop,
        FetchStop::Interrupted(HttpError::Status { status: 503, .. })
    ));
    assert!(outcome.records.is_empty());
    assert_eq!(at(&logs, Level::Warn).len(), 1, "logs: {logs:?}");
    assert!(at(&logs, Level::Error).is_empty(), "logs: {logs:?}");
}
