//! In-memory stand-ins for the remote datastore and the sheet/tree services.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value as Json};
use url::Url;

use tally_sync::drive::FOLDER_MIME_TYPE;
use tally_sync::{
    FileStore, FolderTree, HttpError, HttpRequest, HttpResponse, Method, SourceError, Sleeper, Transport,
    TreeItem, Workbook,
};
use tally_core::{A1Range, RecordSet};

pub const API: &str = "https://api.test/api/1.1/obj/payments";
pub const COUNTRIES: &str = "https://api.test/api/1.1/obj/country";
pub const SHEETS: &str = "https://sheets.test/v4/spreadsheets";
pub const DRIVE: &str = "https://drive.test/drive/v3/files";

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ---------------------------------------------------------------------------
// Remote datastore (+ sheet values API for pipeline tests)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeRemote {
    collections: RefCell<HashMap<String, Vec<Json>>>,
    pub requests: RefCell<Vec<HttpRequest>>,
    pub fail_gets: Cell<bool>,
    pub reject_bulk: Cell<bool>,
    next_id: Cell<u64>,
    pub sheet_rows: RefCell<Vec<Vec<String>>>,
    pub sheet_writes: RefCell<Vec<(String, Json)>>,
    pub sheet_appends: RefCell<Vec<(String, Json)>>,
    pub drive_files: RefCell<HashMap<String, String>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, endpoint: &str, objects: Vec<Json>) {
        self.collections
            .borrow_mut()
            .entry(endpoint.to_owned())
            .or_default()
            .extend(objects);
    }

    pub fn stored(&self, endpoint: &str) -> Vec<Json> {
        self.collections.borrow().get(endpoint).cloned().unwrap_or_default()
    }

    pub fn count(&self, method: Method, suffix: &str) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.method == method && r.url.split('?').next().unwrap_or("").ends_with(suffix))
            .count()
    }

    fn page(&self, base: &str, url: &Url) -> HttpResponse {
        if self.fail_gets.get() {
            return HttpResponse::new(503, "unavailable");
        }
        let param = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .and_then(|(_, v)| v.parse::<usize>().ok())
                .unwrap_or(0)
        };
        let (limit, cursor) = (param("limit"), param("cursor"));
        let all = self.stored(base);
        let results: Vec<Json> = all.iter().skip(cursor).take(limit).cloned().collect();
        let remaining = all.len().saturating_sub(cursor + results.len());
        HttpResponse::new(
            200,
            json!({"response": {"cursor": cursor, "results": results, "remaining": remaining}}).to_string(),
        )
    }

    fn store(&self, endpoint: &str, mut object: Json) -> String {
        let id = format!("1700x{}", self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        if let Some(map) = object.as_object_mut() {
            map.insert("_id".into(), Json::String(id.clone()));
        }
        self.seed(endpoint, vec![object]);
        id
    }

    fn bulk(&self, endpoint: &str, body: &str) -> HttpResponse {
        if self.reject_bulk.get() {
            return HttpResponse::new(400, r#"{"status":"INVALID_DATA"}"#);
        }
        let lines: Vec<String> = body
            .lines()
            .map(|line| match serde_json::from_str::<Json>(line) {
                Ok(object) => json!({"status": "success", "id": self.store(endpoint, object)}).to_string(),
                Err(e) => json!({"status": "error", "message": e.to_string()}).to_string(),
            })
            .collect();
        HttpResponse::new(200, lines.join("\n"))
    }

    fn sheets(&self, request: &HttpRequest, path: &str) -> HttpResponse {
        let range = path.rsplit("/values/").next().unwrap_or_default().to_owned();
        let body = || request.body.as_deref().and_then(|b| serde_json::from_str(b).ok()).unwrap_or(Json::Null);
        match request.method {
            Method::Get => {
                let rows = self.sheet_rows.borrow().clone();
                HttpResponse::new(200, json!({"range": range, "values": rows}).to_string())
            }
            Method::Put => {
                self.sheet_writes.borrow_mut().push((range, body()));
                HttpResponse::new(200, "{}")
            }
            Method::Post => {
                self.sheet_appends.borrow_mut().push((range, body()));
                HttpResponse::new(200, "{}")
            }
        }
    }
}

impl Transport for FakeRemote {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        self.requests.borrow_mut().push(request.clone());
        let url = Url::parse(&request.url).map_err(|e| HttpError::Transport {
            url: request.url.clone(),
            message: e.to_string(),
        })?;
        let base = format!("{}://{}{}", url.scheme(), url.host_str().unwrap_or_default(), url.path());
        if base.starts_with(SHEETS) {
            return Ok(self.sheets(request, &base));
        }
        if let Some(file_id) = base.strip_prefix(DRIVE).and_then(|p| p.strip_prefix('/')) {
            return Ok(match self.drive_files.borrow().get(file_id) {
                Some(content) => HttpResponse::new(200, content.clone()),
                None => HttpResponse::new(404, "file not found"),
            });
        }
        let body = request.body.as_deref().unwrap_or_default();
        Ok(match request.method {
            Method::Get => self.page(&base, &url),
            Method::Post => match base.strip_suffix("/bulk") {
                Some(endpoint) => self.bulk(endpoint, body),
                None => match serde_json::from_str::<Json>(body) {
                    Ok(object) => HttpResponse::new(201, json!({"status": "success", "id": self.store(&base, object)}).to_string()),
                    Err(_) => HttpResponse::new(400, "bad json"),
                },
            },
            Method::Put => HttpResponse::new(404, "not found"),
        })
    }
}

// ---------------------------------------------------------------------------
// Sheet
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryWorkbook {
    pub rows: RefCell<Vec<Vec<String>>>,
    pub writes: RefCell<Vec<(String, Vec<Vec<String>>)>>,
    pub appends: RefCell<Vec<(String, Vec<Vec<String>>)>>,
    pub fail_writes: Cell<bool>,
}

impl MemoryWorkbook {
    pub fn with_rows(rows: &[&[&str]]) -> Self {
        let book = Self::default();
        *book.rows.borrow_mut() = rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        book
    }

    pub fn written_ranges(&self) -> Vec<String> {
        self.writes.borrow().iter().map(|(r, _)| r.clone()).collect()
    }
}

impl Workbook for MemoryWorkbook {
    fn read(&self, _range: &A1Range) -> Result<Vec<Vec<String>>, SourceError> {
        Ok(self.rows.borrow().clone())
    }

    fn write(&self, range: &A1Range, rows: &[Vec<String>]) -> Result<(), SourceError> {
        if self.fail_writes.get() {
            return Err(HttpError::Status {
                url: range.to_string(),
                status: 429,
                body: "quota".into(),
            }
            .into());
        }
        self.writes.borrow_mut().push((range.to_string(), rows.to_vec()));
        Ok(())
    }

    fn append(&self, range: &A1Range, rows: &[Vec<String>]) -> Result<(), SourceError> {
        self.appends.borrow_mut().push((range.to_string(), rows.to_vec()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Folder tree
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryTree {
    children: HashMap<String, Vec<TreeItem>>,
    pub broken: Vec<String>,
}

impl MemoryTree {
    pub fn folder(&mut self, parent: &str, id: &str, name: &str) -> &mut Self {
        self.add(parent, id, name, FOLDER_MIME_TYPE)
    }

    pub fn file(&mut self, parent: &str, id: &str, name: &str) -> &mut Self {
        self.add(parent, id, name, "application/pdf")
    }

    fn add(&mut self, parent: &str, id: &str, name: &str, mime: &str) -> &mut Self {
        self.children.entry(parent.to_owned()).or_default().push(TreeItem {
            id: id.to_owned(),
            name: name.to_owned(),
            mime_type: mime.to_owned(),
            created_time: Some("2024-03-01T10:00:00.000Z".to_owned()),
            web_view_link: Some(format!("https://drive.test/{id}")),
        });
        self
    }
}

impl FolderTree for MemoryTree {
    fn list(&self, folder_id: &str) -> Result<Vec<TreeItem>, SourceError> {
        if self.broken.iter().any(|b| b == folder_id) {
            return Err(HttpError::Transport {
                url: folder_id.to_owned(),
                message: "timed out".into(),
            }
            .into());
        }
        Ok(self.children.get(folder_id).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Stored files
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryFiles(pub HashMap<String, String>);

impl MemoryFiles {
    pub fn with(file_id: &str, content: &str) -> Self {
        Self(HashMap::from([(file_id.to_owned(), content.to_owned())]))
    }
}

impl FileStore for MemoryFiles {
    fn download(&self, file_id: &str) -> Result<String, SourceError> {
        self.0.get(file_id).cloned().ok_or_else(|| {
            HttpError::Status {
                url: file_id.to_owned(),
                status: 404,
                body: "file not found".into(),
            }
            .into()
        })
    }
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSleeper(pub RefCell<Vec<Duration>>);

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.0.borrow_mut().push(duration);
    }
}

/// A single-unit source over a fixed record set.
pub struct StaticSource(pub RecordSet);

impl tally_sync::CandidateSource for StaticSource {
    type Unit = ();

    fn units(&self) -> Result<Vec<()>, SourceError> {
        Ok(vec![()])
    }

    fn label(&self, _unit: &()) -> String {
        "static".into()
    }

    fn build(&self, _unit: &()) -> Result<RecordSet, SourceError> {
        Ok(self.0.clone())
    }
}
