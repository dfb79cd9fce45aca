//! # tally-sync
//!
//! Reconciliation engine: fetch the remote baseline page by page, diff it
//! against a candidate source on a composite key, upload the unique
//! remainder in throttled batches and write markers back to the source.
//!
//! Call [`pipeline::run`] to process one or every saved job, or drive a
//! [`Reconciler`] directly with your own [`CandidateSource`] and
//! [`MarkerSink`].

pub mod differ;
pub mod drive;
pub mod error;
pub mod fetcher;
pub mod lookup;
pub mod markers;
pub mod orchestrator;
pub mod pipeline;
pub mod session;
pub mod sheets;
pub mod source;
pub mod transport;
pub mod uploader;

pub use differ::{compare, compare_sorted, diff, diff_sorted, DiffReport, MissingKeyColumn, Side};
pub use drive::{FileStore, FolderTree, GoogleDrive, TreeItem};
pub use error::{HttpError, SourceError, SyncError};
pub use fetcher::{collect_pages, Cursor, FetchOutcome, FetchStop, Page, PageSource, PaginatedFetcher};
pub use lookup::{LookupReport, LookupTable};
pub use markers::{MarkerReport, MarkerSink, MarkerUpdate, NoMarkers, SheetMarkers};
pub use orchestrator::{Phase, Reconciler, RunReport, UnitReport};
pub use pipeline::{Credentials, JobScope};
pub use session::Session;
pub use sheets::{GoogleSheets, Workbook};
pub use source::{CandidateSource, FolderGroup, JsonFileSource, SheetSource, TreeSource};
pub use transport::{HttpRequest, HttpResponse, Method, Transport, UreqTransport};
pub use uploader::{BatchResult, BatchUploader, Sleeper, ThreadSleeper, UploadOutcome};
