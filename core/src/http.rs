//! HTTP request and response types exchanged with a [`Transport`].
//!
//! # Design
//! Requests and responses are plain data: a method, a URL, an ordered header
//! list and a body stream. The dispatcher assembles an `HttpRequest`, hands it
//! to whatever transport it was built with, and passes the resulting
//! `HttpResponse` to an analyzer. Header lookups are case-insensitive because
//! transports are free to normalize header names.
//!
//! [`Transport`]: crate::transport::Transport

use std::fmt;
use std::io::{Cursor, Read};
use std::str::FromStr;

use url::Url;

use crate::error::RpcError;

/// Outgoing and incoming request id.
pub const HEADER_REQID: &str = "X-Reqid";
/// Multi-valued diagnostic header carrying server-side log lines.
pub const HEADER_LOG: &str = "X-Log";
pub const HEADER_USER_AGENT: &str = "User-Agent";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";

pub const MIME_JSON: &str = "application/json";
pub const MIME_FORM: &str = "application/x-www-form-urlencoded";
pub const MIME_BINARY: &str = "application/octet-stream";

/// HTTP method for a request. Only these five verbs are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a verb case-insensitively; anything outside the supported set is
/// rejected with [`RpcError::UnsupportedMethod`].
impl FromStr for HttpMethod {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(RpcError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// An outgoing request.
///
/// `content_length` is only set when the body length is known and positive;
/// otherwise the transport decides how to frame the body.
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Box<dyn Read>>,
    pub content_length: Option<u64>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
            content_length: None,
        }
    }

    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Replace every value of `name` with a single `value`.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|_| ".."))
            .field("content_length", &self.content_length)
            .finish()
    }
}

/// A response as returned by the transport. The body is a stream that the
/// analyzer drains exactly once.
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Box<dyn Read>,
    pub content_length: Option<u64>,
}

impl HttpResponse {
    /// Response backed by an in-memory body. `content_length` is the body size.
    pub fn from_bytes(status: u16, headers: Vec<(String, String)>, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        Self {
            status,
            headers,
            content_length: Some(body.len() as u64),
            body: Box::new(Cursor::new(body)),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Every value of `name` in the order the transport reported them.
    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .collect()
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("http://localhost:9000/x.json").unwrap()
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("Patch".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert_eq!("DELETE".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
    }

    #[test]
    fn method_rejects_trace() {
        let err = "TRACE".parse::<HttpMethod>().unwrap_err();
        assert!(matches!(err, RpcError::UnsupportedMethod(ref m) if m == "TRACE"));
    }

    #[test]
    fn set_header_replaces_existing_values() {
        let mut req = HttpRequest::new(HttpMethod::Get, url());
        req.headers.push(("user-agent".to_string(), "a".to_string()));
        req.headers.push(("User-Agent".to_string(), "b".to_string()));
        req.set_header(HEADER_USER_AGENT, "c");
        assert_eq!(req.headers, vec![("User-Agent".to_string(), "c".to_string())]);
        assert_eq!(req.header("USER-AGENT"), Some("c"));
    }

    #[test]
    fn response_header_values_keep_order() {
        let resp = HttpResponse::from_bytes(
            200,
            vec![
                ("x-log".to_string(), "a".to_string()),
                ("X-Reqid".to_string(), "r1".to_string()),
                ("X-Log".to_string(), "b".to_string()),
            ],
            "",
        );
        assert_eq!(resp.header_values(HEADER_LOG), vec!["a", "b"]);
        assert_eq!(resp.header("x-reqid"), Some("r1"));
        assert_eq!(resp.content_length, Some(0));
        assert!(resp.is_success());
    }
}
