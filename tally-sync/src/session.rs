//! Authenticated access to one remote service.

use url::Url;

use crate::error::HttpError;
use crate::transport::{HttpRequest, HttpResponse, Method, Transport};

/// A [`Transport`] paired with a bearer token.
///
/// Built once per run and shared by every phase that talks to the same
/// service.
pub struct Session<'t> {
    transport: &'t dyn Transport,
    token: Option<String>,
}

impl<'t> Session<'t> {
    pub fn new(transport: &'t dyn Transport, token: impl Into<String>) -> Self {
        Self {
            transport,
            token: Some(token.into()),
        }
    }

    pub fn anonymous(transport: &'t dyn Transport) -> Self {
        Self {
            transport,
            token: None,
        }
    }

    pub fn send(&self, mut request: HttpRequest) -> Result<HttpResponse, HttpError> {
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        tracing::debug!("{} {}", request.method.as_str(), request.url);
        self.transport.send(&request)
    }

    pub fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        self.send(HttpRequest::get(url))
    }

    pub fn send_json(
        &self,
        method: Method,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, HttpError> {
        self.send(
            HttpRequest::new(method, url)
                .header("Content-Type", "application/json")
                .body(body.to_string()),
        )
    }

    pub fn post_text(&self, url: &str, body: String) -> Result<HttpResponse, HttpError> {
        self.send(
            HttpRequest::new(Method::Post, url)
                .header("Content-Type", "text/plain")
                .body(body),
        )
    }
}

/// `base` with each of `segments` appended as an escaped path segment and
/// `query` appended as encoded pairs.
pub fn build_url(base: &str, segments: &[&str], query: &[(&str, &str)]) -> Result<String, HttpError> {
    let invalid = |message: &str| HttpError::Transport {
        url: base.to_owned(),
        message: message.to_owned(),
    };
    let mut url = Url::parse(base).map_err(|e| invalid(&format!("invalid URL: {e}")))?;
    if !segments.is_empty() {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| invalid("URL cannot take path segments"))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url.into())
}
