//! Error types for the RPC client.
//!
//! # Design
//! Everything that can go wrong in a call lands in one `RpcError`. Local
//! failures (bad method, unreadable attachment, encoding) stop the call before
//! the network is touched. Transport failures are carried through untouched.
//! HTTP-level failures are normalized into an [`ErrorInfo`] so callers have a
//! single shape to branch on.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum RpcError {
    /// The verb is not one of GET, POST, PUT, PATCH, DELETE.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// The transport could not complete the exchange.
    #[error("transport failed: {0}")]
    Transport(#[source] TransportError),

    /// A file or body stream could not be read.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A request payload could not be encoded.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// A successful response body did not match the target shape.
    #[error("decoding failed: {0}")]
    Decode(String),

    /// The server answered with a failure status.
    #[error("remote error: {0}")]
    Remote(ErrorInfo),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl RpcError {
    /// HTTP status of a remote failure, `None` for local and transport errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RpcError::Remote(info) => Some(info.status_code()),
            _ => None,
        }
    }

    pub fn remote(&self) -> Option<&ErrorInfo> {
        match self {
            RpcError::Remote(info) => Some(info),
            _ => None,
        }
    }
}

impl From<ErrorInfo> for RpcError {
    fn from(info: ErrorInfo) -> Self {
        RpcError::Remote(info)
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

/// Normalized failure reported by the server.
///
/// The serialized form (`error`, `reqid`, `details`, `code`) is also what
/// `Display` prints, so the value can be logged or forwarded as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "error")]
    message: String,
    #[serde(rename = "reqid")]
    request_id: String,
    details: Vec<String>,
    #[serde(rename = "code")]
    status_code: u16,
}

impl ErrorInfo {
    pub fn new(
        status_code: u16,
        request_id: impl Into<String>,
        details: Vec<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            request_id: request_id.into(),
            details,
            status_code,
        }
    }

    /// Message from the `{"error": ...}` body; empty when none was sent.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Diagnostic lines from the `X-Log` header, in response order.
    pub fn details(&self) -> &[String] {
        &self.details
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "HTTP {}: {}", self.status_code, self.message),
        }
    }
}

impl std::error::Error for ErrorInfo {}
