//! The send capability the dispatcher talks to, and its `ureq` implementation.
//!
//! # Design
//! `Transport` is the only place a request leaves the process. Anything that
//! can turn an [`HttpRequest`] into an [`HttpResponse`] fits: the blocking
//! `ureq` agent in production, a recording spy in tests. Connection pooling,
//! TLS, redirects and deadlines all live behind this seam.

use std::error::Error;

use ureq::http;
use ureq::SendBody;

use crate::config::ClientConfig;
use crate::http::{HttpRequest, HttpResponse, HEADER_CONTENT_LENGTH};

/// Error raised by a transport. The dispatcher forwards it without wrapping
/// it into an `ErrorInfo`.
pub type TransportError = Box<dyn Error + Send + Sync>;

pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport over a pooled `ureq::Agent`.
///
/// Status codes are never turned into errors here; 4xx and 5xx responses come
/// back as data so the analyzer can normalize them.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(config: &ClientConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(config.timeout)
            .build()
            .new_agent();
        Self { agent }
    }

    /// Wrap an agent configured by the caller. It must not treat HTTP status
    /// codes as errors, or failure bodies never reach the analyzer.
    pub fn from_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
            content_length,
        } = request;

        let mut builder = http::Request::builder().method(method.as_str()).uri(url.as_str());
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(length) = content_length {
            builder = builder.header(HEADER_CONTENT_LENGTH, length.to_string());
        }

        let response = match body {
            Some(mut reader) => {
                let request = builder.body(SendBody::from_reader(&mut reader))?;
                self.agent.run(request)?
            }
            None => self.agent.run(builder.body(())?)?,
        };

        let status = response.status().as_u16();
        let headers = header_pairs(response.headers());
        let content_length = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(HEADER_CONTENT_LENGTH))
            .and_then(|(_, value)| value.trim().parse().ok());

        Ok(HttpResponse {
            status,
            headers,
            body: Box::new(response.into_body().into_reader()),
            content_length,
        })
    }
}

/// Flatten a header map in order. Values that are not visible ASCII are kept
/// with invalid UTF-8 replaced, so no `X-Log` line is lost.
fn header_pairs(headers: &http::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}
