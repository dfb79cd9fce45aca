//! Folder-tree access.

use chrono::NaiveDate;
use serde::Deserialize;

use tally_core::schema::parse_date;

use crate::error::{HttpError, SourceError};
use crate::fetcher::{collect_pages, Cursor, FetchStop, Page, PageSource};
use crate::session::{build_url, Session};

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3/files";
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, createdTime, webViewLink)";
const LIST_PAGE_SIZE: &str = "1000";

/// One child of a folder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeItem {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub web_view_link: Option<String>,
}

impl TreeItem {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    pub fn created_date(&self) -> Option<NaiveDate> {
        self.created_time.as_deref().and_then(parse_date)
    }

    pub fn link(&self) -> &str {
        self.web_view_link.as_deref().unwrap_or_default()
    }
}

/// Lists the direct children of a folder.
pub trait FolderTree {
    fn list(&self, folder_id: &str) -> Result<Vec<TreeItem>, SourceError>;
}

/// Reads the contents of a single file.
pub trait FileStore {
    fn download(&self, file_id: &str) -> Result<String, SourceError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<TreeItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// [`FolderTree`] over the Drive v3 REST API.
pub struct GoogleDrive<'a> {
    session: &'a Session<'a>,
    base: String,
}

impl<'a> GoogleDrive<'a> {
    pub fn new(session: &'a Session<'a>) -> Self {
        Self::with_base(session, DRIVE_API_BASE)
    }

    pub fn with_base(session: &'a Session<'a>, base: impl Into<String>) -> Self {
        Self {
            session,
            base: base.into(),
        }
    }
}

struct Children<'d> {
    drive: &'d GoogleDrive<'d>,
    query: String,
}

impl PageSource for Children<'_> {
    type Item = TreeItem;

    fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<Page<TreeItem>, HttpError> {
        let mut query = vec![
            ("q", self.query.as_str()),
            ("fields", LIST_FIELDS),
            ("pageSize", LIST_PAGE_SIZE),
        ];
        if let Some(Cursor::Token(token)) = cursor {
            query.push(("pageToken", token.as_str()));
        }
        let url = build_url(&self.drive.base, &[], &query)?;
        let resp = self.drive.session.get(&url)?.require_success(&url)?;
        let list: FileList = resp.json(&url)?;
        Ok(Page {
            items: list.files,
            next: list.next_page_token.filter(|t| !t.is_empty()).map(Cursor::Token),
        })
    }
}

impl FolderTree for GoogleDrive<'_> {
    fn list(&self, folder_id: &str) -> Result<Vec<TreeItem>, SourceError> {
        let children = Children {
            drive: self,
            query: format!("'{}' in parents and trashed=false", folder_id.replace('\'', "\\'")),
        };
        let paged = collect_pages(&children);
        match paged.stop {
            FetchStop::Exhausted => Ok(paged.items),
            // A partial listing would drop entities silently.
            FetchStop::Interrupted(err) => Err(err.into()),
        }
    }
}

impl FileStore for GoogleDrive<'_> {
    fn download(&self, file_id: &str) -> Result<String, SourceError> {
        let url = build_url(&self.base, &[file_id], &[("alt", "media")])?;
        let resp = self.session.get(&url)?.require_success(&url)?;
        tracing::debug!("downloaded {} byte(s) of {file_id}", resp.body.len());
        Ok(resp.body)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;
    use crate::transport::{HttpRequest, HttpResponse, Transport};

    struct Pages {
        bodies: RefCell<VecDeque<HttpResponse>>,
        urls: RefCell<Vec<String>>,
    }

    impl Transport for Pages {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
            self.urls.borrow_mut().push(request.url.clone());
            Ok(self
                .bodies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| HttpResponse::new(500, "exhausted")))
        }
    }

    fn pages(bodies: &[(u16, &str)]) -> Pages {
        Pages {
            bodies: RefCell::new(bodies.iter().map(|(s, b)| HttpResponse::new(*s, *b)).collect()),
            urls: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn list_follows_page_tokens() {
        let transport = pages(&[
            (
                200,
                r#"{"nextPageToken":"p2","files":[{"id":"f1","name":"Group A","mimeType":"application/vnd.google-apps.folder","createdTime":"2024-03-01T09:30:00.000Z","webViewLink":"https://drive/f1"}]}"#,
            ),
            (200, r#"{"files":[{"id":"d1","name":"passport.pdf","mimeType":"application/pdf"}]}"#),
        ]);
        let session = Session::new(&transport, "g");
        let items = GoogleDrive::with_base(&session, "https://drive.test/drive/v3/files")
            .list("root")
            .unwrap();

        assert_eq!(items.len(), 2);
        assert!(items[0].is_folder());
        assert_eq!(items[0].created_date(), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(items[1].link(), "");
        let urls = transport.urls.borrow();
        assert!(urls[0].contains("q=%27root%27+in+parents+and+trashed%3Dfalse"));
        assert!(!urls[0].contains("pageToken"));
        assert!(urls[1].ends_with("pageToken=p2"));
    }

    #[test]
    fn failed_page_fails_the_listing() {
        let transport = pages(&[
            (200, r#"{"nextPageToken":"p2","files":[]}"#),
            (403, "rate limited"),
        ]);
        let session = Session::new(&transport, "g");
        let err = GoogleDrive::new(&session).list("root").unwrap_err();
        assert!(matches!(err, SourceError::Http(HttpError::Status { status: 403, .. })));
    }

    #[test]
    fn download_fetches_media_of_one_file() {
        let transport = pages(&[(200, r#"[{"lead-name":"Asha"}]"#)]);
        let session = Session::new(&transport, "g");
        let body = GoogleDrive::with_base(&session, "https://drive.test/drive/v3/files")
            .download("1pt89q5A")
            .unwrap();

        assert_eq!(body, r#"[{"lead-name":"Asha"}]"#);
        assert_eq!(
            transport.urls.borrow()[0],
            "https://drive.test/drive/v3/files/1pt89q5A?alt=media"
        );
    }

    #[test]
    fn download_failure_is_an_error() {
        let transport = pages(&[(404, "not found")]);
        let session = Session::new(&transport, "g");
        let err = GoogleDrive::new(&session).download("missing").unwrap_err();
        assert!(matches!(err, SourceError::Http(HttpError::Status { status: 404, .. })));
    }
}
