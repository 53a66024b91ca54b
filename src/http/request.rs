//! Request parsing.
//!
//! # Responsibilities
//! - Capture method, path, query, headers and body from the transport
//! - Parse query-string and urlencoded form parameters
//! - Parse the `Cookie` header
//! - Generate a unique request ID (UUID v4) for tracing
//!
//! # Design Decisions
//! - Parsing is explicit and fallible so the dispatcher can log failures
//!   and carry on with whatever was parsed
//! - Form fields override query parameters of the same name
//! - The path is percent-decoded once, here; routes and static files
//!   only ever see the decoded form

use std::collections::HashMap;

use axum::body::Bytes;
use axum::http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method};
use percent_encoding::percent_decode_str;
use thiserror::Error;
use tower_http::request_id::{MakeRequestId, RequestId};
use url::form_urlencoded;
use uuid::Uuid;

use crate::cookie::parse_cookie_header;

/// Name of the request ID header.
pub const X_REQUEST_ID: &str = "x-request-id";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Failures while parsing request metadata.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("{0} header is not valid UTF-8")]
    NonUtf8Header(&'static str),
    #[error("request path {0:?} does not decode to UTF-8")]
    NonUtf8Path(String),
}

/// An inbound request as seen by handlers.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub raw_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Query and form parameters, filled by [`parse_params`](Self::parse_params).
    pub params: HashMap<String, String>,
    /// Cookies, filled by [`parse_cookies`](Self::parse_cookies).
    pub cookies: HashMap<String, String>,
}

impl Request {
    /// Build a request for `target` (`/path` or `/path?query`). Invalid
    /// UTF-8 in the decoded path is replaced with U+FFFD.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, raw_query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        Self {
            method,
            path: percent_decode_str(path).decode_utf8_lossy().into_owned(),
            raw_query: raw_query.to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            cookies: HashMap::new(),
        }
    }

    /// Build from the transport's request head and the collected body.
    pub fn from_parts(parts: &Parts, body: Bytes) -> Result<Self, RequestError> {
        Ok(Self {
            method: parts.method.clone(),
            path: decode_path(parts.uri.path())?,
            raw_query: parts.uri.query().unwrap_or_default().to_string(),
            headers: parts.headers.clone(),
            body,
            params: HashMap::new(),
            cookies: HashMap::new(),
        })
    }

    /// Append a header. Invalid values are dropped.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// `path` or `path?query`, for logging.
    pub fn target(&self) -> String {
        if self.raw_query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.raw_query)
        }
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }

    /// Parse query parameters, then urlencoded form fields from the body.
    pub fn parse_params(&mut self) -> Result<(), RequestError> {
        for (k, v) in form_urlencoded::parse(self.raw_query.as_bytes()) {
            self.params.insert(k.into_owned(), v.into_owned());
        }

        let content_type = match self.headers.get(header::CONTENT_TYPE) {
            Some(value) => value
                .to_str()
                .map_err(|_| RequestError::NonUtf8Header("Content-Type"))?,
            None => return Ok(()),
        };
        if content_type.starts_with(FORM_CONTENT_TYPE) {
            for (k, v) in form_urlencoded::parse(&self.body) {
                self.params.insert(k.into_owned(), v.into_owned());
            }
        }
        Ok(())
    }

    /// Parse every `Cookie` header into [`cookies`](Self::cookies).
    pub fn parse_cookies(&mut self) -> Result<(), RequestError> {
        for value in self.headers.get_all(header::COOKIE) {
            let value = value
                .to_str()
                .map_err(|_| RequestError::NonUtf8Header("Cookie"))?;
            for (name, cookie) in parse_cookie_header(value) {
                self.cookies.entry(name).or_insert(cookie);
            }
        }
        Ok(())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

/// Percent-decode a request path.
fn decode_path(raw: &str) -> Result<String, RequestError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|path| path.into_owned())
        .map_err(|_| RequestError::NonUtf8Path(raw.to_string()))
}

/// Encode key/value pairs as `application/x-www-form-urlencoded`.
pub fn urlencode<I, K, V>(pairs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Generates `x-request-id` values.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_split() {
        let req = Request::new(Method::GET, "/search?q=rust&page=2");
        assert_eq!(req.path, "/search");
        assert_eq!(req.raw_query, "q=rust&page=2");
        assert_eq!(req.target(), "/search?q=rust&page=2");
        assert_eq!(Request::new(Method::GET, "/plain").target(), "/plain");
    }

    #[test]
    fn test_path_is_decoded() {
        let (parts, _) = axum::http::Request::get("/hello/bob%20smith/caf%C3%A9?q=a%20b")
            .body(())
            .unwrap()
            .into_parts();
        let req = Request::from_parts(&parts, Bytes::new()).unwrap();
        assert_eq!(req.path, "/hello/bob smith/café");
        assert_eq!(req.raw_query, "q=a%20b");

        assert_eq!(Request::new(Method::GET, "/a%2Fb").path, "/a/b");
    }

    #[test]
    fn test_non_utf8_path_rejected() {
        let (parts, _) = axum::http::Request::get("/bad%FF").body(()).unwrap().into_parts();
        assert_eq!(
            Request::from_parts(&parts, Bytes::new()).unwrap_err(),
            RequestError::NonUtf8Path("/bad%FF".to_string())
        );
    }

    #[test]
    fn test_query_and_form_params() {
        let mut req = Request::new(Method::POST, "/submit?name=query&only=q")
            .with_header(header::CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
            .with_body("name=form+value&msg=a%26b");
        req.parse_params().unwrap();

        assert_eq!(req.param("name"), Some("form value"));
        assert_eq!(req.param("only"), Some("q"));
        assert_eq!(req.param("msg"), Some("a&b"));
    }

    #[test]
    fn test_non_form_body_ignored() {
        let mut req = Request::new(Method::POST, "/submit")
            .with_header(header::CONTENT_TYPE, "application/json")
            .with_body("a=b");
        req.parse_params().unwrap();
        assert!(req.params.is_empty());
    }

    #[test]
    fn test_parse_cookies() {
        let mut req = Request::new(Method::GET, "/")
            .with_header(header::COOKIE, "a=1; b=2")
            .with_header(header::COOKIE, "c=3");
        req.parse_cookies().unwrap();
        assert_eq!(req.cookie("a"), Some("1"));
        assert_eq!(req.cookie("c"), Some("3"));
        assert_eq!(req.cookie("missing"), None);
    }

    #[test]
    fn test_non_utf8_cookie_header() {
        let mut req = Request::new(Method::GET, "/");
        req.headers
            .insert(header::COOKIE, HeaderValue::from_bytes(b"a=\xff").unwrap());
        assert_eq!(req.parse_cookies(), Err(RequestError::NonUtf8Header("Cookie")));
    }

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode([("a", "1 2"), ("b", "x&y")]), "a=1+2&b=x%26y");
    }
}
