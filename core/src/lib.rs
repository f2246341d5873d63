//! Blocking HTTP client layer for JSON/REST backends.
//!
//! # Overview
//! Builds URLs, dispatches GET/POST/PUT/PATCH/DELETE requests with JSON,
//! URL-encoded form, multipart or binary bodies, stamps request ids and the
//! user agent, forwards server-side `X-Log` lines to a caller-supplied logger
//! and turns failed responses into a structured [`ErrorInfo`].
//!
//! # Design
//! - `Client` is configured once and reused; it keeps no per-call state and
//!   can be shared between threads.
//! - The network sits behind the [`Transport`] trait. `UreqTransport` is the
//!   default; tests substitute a spy.
//! - Response interpretation sits behind the [`Analyzer`] trait.
//!   `JsonAnalyzer` decodes 2xx bodies and normalizes everything else.
//! - `MultipartForm` encodes its body once, on first use.

pub mod analyzer;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod multipart;
pub mod transport;

pub use analyzer::{response_error, Analyzer, DecodeTarget, JsonAnalyzer, SuccessPolicy};
pub use client::{Client, Logger, PreRequest};
pub use config::{ClientConfig, DEFAULT_USER_AGENT};
pub use endpoint::{build_http_url, build_https_url, encode_values, Values};
pub use error::{ErrorInfo, Result, RpcError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use multipart::{Attachment, MultipartForm};
pub use transport::{Transport, TransportError, UreqTransport};
