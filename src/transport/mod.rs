//! HTTP transport boundary.
//!
//! Connections talk to providers through the [`Transport`] trait so tests
//! and embedders can swap the network layer. The default implementation
//! ([`HttpTransport`]) is reqwest-backed.

mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::IndexMap;

use crate::error::TransportError;

/// Request parameters, insertion-ordered.
pub type Params = IndexMap<String, String>;

/// HTTP method subset the providers use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One part of a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadPart {
    pub name: String,
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A fully prepared request: signing has already happened, headers included.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    /// Query parameters for GET/DELETE, form fields for POST/PUT.
    pub params: Params,
    pub headers: Vec<(String, String)>,
    /// Non-empty turns a POST into a multipart upload; `params` become
    /// text fields alongside these parts.
    pub multipart: Vec<UploadPart>,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Params::new(),
            headers: Vec::new(),
            multipart: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Raw response; status checking and body decoding happen in the caller so
/// structured error payloads on failure statuses stay readable.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network boundary for a connection.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        request: &TransportRequest,
    ) -> Result<TransportResponse, TransportError>;

    /// Dispatch several prepared requests concurrently. Results keep the
    /// input order regardless of completion order.
    async fn multi(
        &self,
        requests: &[TransportRequest],
    ) -> Vec<Result<TransportResponse, TransportError>> {
        join_all(requests.iter().map(|request| self.request(request))).await
    }
}

/// Decode a response body: JSON first, urlencoded form as fallback (OAuth1
/// token endpoints answer `oauth_token=..&oauth_token_secret=..`, often with
/// a text content type).
pub fn decode_body(response: &TransportResponse) -> Result<serde_json::Value, TransportError> {
    let content_type = response.content_type.as_deref().unwrap_or("");

    if content_type.contains("json") {
        return serde_json::from_str(&response.body)
            .map_err(|err| TransportError::Body(format!("invalid JSON: {err}")));
    }

    if let Ok(json) = serde_json::from_str(&response.body) {
        return Ok(json);
    }

    decode_form(&response.body)
        .ok_or_else(|| TransportError::Body(format!("undecodable body: {:.80}", response.body)))
}

fn decode_form(body: &str) -> Option<serde_json::Value> {
    if !body.contains('=') {
        return None;
    }
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(body).ok()?;
    let map: serde_json::Map<String, serde_json::Value> = pairs
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect();
    Some(serde_json::Value::Object(map))
}

/// Split a URL into its base and parsed query parameters.
pub(crate) fn split_query(url: &str) -> (&str, Params) {
    match url.split_once('?') {
        None => (url, Params::new()),
        Some((base, query)) => {
            let params = serde_urlencoded::from_str::<Vec<(String, String)>>(query)
                .map(|pairs| pairs.into_iter().collect())
                .unwrap_or_default();
            (base, params)
        }
    }
}

/// Append query parameters to a URL that may already carry some.
pub(crate) fn append_query(url: &str, params: &Params) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    let mut out = String::with_capacity(url.len() + 32);
    out.push_str(url);
    out.push(if url.contains('?') { '&' } else { '?' });
    let encoded = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    out.push_str(&encoded);
    out
}
