//! Paginated retrieval of the remote baseline.
//!
//! The fetcher never fails: a non-success status, a transport error or an
//! undecodable page ends the stream, and whatever was collected so far is
//! returned together with a [`FetchStop`] saying why it stopped.

use serde::Deserialize;

use tally_core::{CursorMode, Record, RecordSet};

use crate::error::HttpError;
use crate::session::{build_url, Session};

/// Position of the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// Numeric offset into the collection.
    Offset(u64),
    /// Opaque continuation token handed out by the previous page.
    Token(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` when this page is the last one.
    pub next: Option<Cursor>,
}

/// One paginated collection.
pub trait PageSource {
    type Item;

    /// Fetch the page at `cursor` (`None` for the first page).
    fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<Page<Self::Item>, HttpError>;
}

/// Why a paginated read stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStop {
    /// The source reported no further pages.
    Exhausted,
    /// A page could not be read; the collected items may be incomplete.
    Interrupted(HttpError),
}

impl FetchStop {
    pub fn is_complete(&self) -> bool {
        matches!(self, FetchStop::Exhausted)
    }
}

/// Items of every page read before the stream ended.
#[derive(Debug, Clone, PartialEq)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub pages: usize,
    pub stop: FetchStop,
}

/// Walk `source` from the first page until it is exhausted or a page fails.
pub fn collect_pages<S: PageSource + ?Sized>(source: &S) -> Paged<S::Item> {
    let mut items = Vec::new();
    let mut pages = 0;
    let mut cursor: Option<Cursor> = None;
    loop {
        match source.fetch_page(cursor.as_ref()) {
            Ok(page) => {
                pages += 1;
                items.extend(page.items);
                match page.next {
                    Some(next) => cursor = Some(next),
                    None => {
                        return Paged {
                            items,
                            pages,
                            stop: FetchStop::Exhausted,
                        }
                    }
                }
            }
            Err(err) => {
                tracing::warn!("pagination stopped after {pages} page(s): {err}");
                return Paged {
                    items,
                    pages,
                    stop: FetchStop::Interrupted(err),
                };
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Remote object collection
// ---------------------------------------------------------------------------

/// `{"response": {"results": [...]}}`
#[derive(Deserialize)]
struct Envelope {
    response: Results,
}

#[derive(Deserialize)]
struct Results {
    #[serde(default)]
    results: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Offset-paginated object collection at one endpoint.
struct ObjectPages<'a> {
    session: &'a Session<'a>,
    endpoint: &'a str,
    page_size: usize,
    mode: CursorMode,
}

impl PageSource for ObjectPages<'_> {
    type Item = Record;

    fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<Page<Record>, HttpError> {
        let offset = match cursor {
            Some(Cursor::Offset(n)) => *n,
            _ => 0,
        };
        let limit = self.page_size.to_string();
        let start = offset.to_string();
        let url = build_url(self.endpoint, &[], &[("limit", &limit), ("cursor", &start)])?;

        let resp = self.session.get(&url)?.require_success(&url)?;
        let envelope: Envelope = resp.json(&url)?;
        let received = envelope.response.results.len();
        tracing::debug!("page at cursor {offset}: {received} record(s)");

        // A short page is the last page.
        let next = if received < self.page_size {
            None
        } else {
            let step = match self.mode {
                CursorMode::Offset => self.page_size,
                CursorMode::Accumulated => received,
            };
            Some(Cursor::Offset(offset + step as u64))
        };
        Ok(Page {
            items: envelope
                .response
                .results
                .into_iter()
                .map(Record::from_json_object)
                .collect(),
            next,
        })
    }
}

/// Result of [`PaginatedFetcher::fetch_outcome`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub records: RecordSet,
    pub pages: usize,
    pub stop: FetchStop,
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.stop.is_complete()
    }
}

/// Retrieves every object at an endpoint, page by page, in arrival order.
pub struct PaginatedFetcher<'a> {
    session: &'a Session<'a>,
    page_size: usize,
    mode: CursorMode,
}

impl<'a> PaginatedFetcher<'a> {
    pub fn new(session: &'a Session<'a>, page_size: usize) -> Self {
        Self {
            session,
            page_size: page_size.max(1),
            mode: CursorMode::default(),
        }
    }

    pub fn cursor_mode(mut self, mode: CursorMode) -> Self {
        self.mode = mode;
        self
    }

    /// Fetch every page and report how the stream ended.
    pub fn fetch_outcome(&self, endpoint: &str) -> FetchOutcome {
        let pages = ObjectPages {
            session: self.session,
            endpoint,
            page_size: self.page_size,
            mode: self.mode,
        };
        let paged = collect_pages(&pages);
        tracing::info!(
            "fetched {} record(s) in {} page(s) from {endpoint}",
            paged.items.len(),
            paged.pages
        );
        FetchOutcome {
            records: RecordSet::from_records(paged.items),
            pages: paged.pages,
            stop: paged.stop,
        }
    }

    /// Fetch every page; a failure ends the stream early (see module docs).
    pub fn fetch(&self, endpoint: &str) -> RecordSet {
        self.fetch_outcome(endpoint).records
    }
}
