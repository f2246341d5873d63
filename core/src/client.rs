//! Request dispatcher for JSON/REST backends.
//!
//! # Design
//! `Client` holds a shared transport, a required analyzer and an optional
//! pre-request hook, and carries no other state between calls. Every call
//! runs the same steps: validate the verb, build the request, stamp the
//! logger's request id, let the hook rewrite the request, stamp the user
//! agent, send, forward `X-Log` lines to the logger, and let the analyzer
//! decide what the response means. Nothing is retried.
//!
//! The per-verb helpers only differ in how they produce the body and its
//! content type: JSON, URL-encoded form, multipart form or raw bytes.

use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::analyzer::{Analyzer, DecodeTarget};
use crate::config::ClientConfig;
use crate::endpoint::{encode_values, Values};
use crate::error::{Result, RpcError};
use crate::http::{
    HttpMethod, HttpRequest, HttpResponse, HEADER_CONTENT_TYPE, HEADER_LOG, HEADER_REQID,
    HEADER_USER_AGENT, MIME_BINARY, MIME_FORM, MIME_JSON,
};
use crate::multipart::MultipartForm;
use crate::transport::{Transport, UreqTransport};

/// Per-call sink for request correlation and server-side log lines.
pub trait Logger {
    /// Sent as `X-Reqid` on the outgoing request.
    fn request_id(&self) -> String;
    /// Receives the response's `X-Log` values, in order.
    fn receive_diagnostics(&self, lines: &[String]);
}

/// Hook run on every request right before it is sent. The returned request
/// is the one that goes out.
pub trait PreRequest: Send + Sync {
    fn transform(&self, request: HttpRequest) -> HttpRequest;
}

impl<F> PreRequest for F
where
    F: Fn(HttpRequest) -> HttpRequest + Send + Sync,
{
    fn transform(&self, request: HttpRequest) -> HttpRequest {
        self(request)
    }
}

pub struct Client {
    transport: Arc<dyn Transport>,
    pre_request: Option<Box<dyn PreRequest>>,
    analyzer: Box<dyn Analyzer>,
    user_agent: String,
}

impl Client {
    /// Client over a fresh `ureq` agent with the default configuration.
    pub fn new(analyzer: impl Analyzer + 'static) -> Self {
        Self::from_config(&ClientConfig::default(), analyzer)
    }

    pub fn from_config(config: &ClientConfig, analyzer: impl Analyzer + 'static) -> Self {
        Self {
            transport: Arc::new(UreqTransport::new(config)),
            pre_request: None,
            analyzer: Box::new(analyzer),
            user_agent: config.user_agent.clone(),
        }
    }

    /// Client over a transport shared with other clients.
    pub fn with_transport(transport: Arc<dyn Transport>, analyzer: impl Analyzer + 'static) -> Self {
        Self {
            transport,
            pre_request: None,
            analyzer: Box::new(analyzer),
            user_agent: ClientConfig::default().user_agent,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn set_pre_request(&mut self, hook: impl PreRequest + 'static) {
        self.pre_request = Some(Box::new(hook));
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Build and send one request and return the raw response without
    /// analysing it.
    ///
    /// `method` is matched case-insensitively against GET, POST, PUT, PATCH
    /// and DELETE; anything else fails before the transport is touched. An
    /// empty `content_type` sends no `Content-Type` header and a zero
    /// `length` leaves the body length to the transport.
    pub fn send(
        &self,
        logger: Option<&dyn Logger>,
        method: &str,
        url: &Url,
        content_type: &str,
        body: Option<Box<dyn Read>>,
        length: u64,
    ) -> Result<HttpResponse> {
        let method: HttpMethod = method.parse()?;

        let mut request = HttpRequest::new(method, url.clone());
        if !content_type.is_empty() {
            request.set_header(HEADER_CONTENT_TYPE, content_type);
        }
        request.body = body;
        if length > 0 {
            request.content_length = Some(length);
        }

        self.execute(logger, request)
    }

    /// Send a request built by the caller: request id, hook, user agent,
    /// transport, diagnostics.
    pub fn execute(&self, logger: Option<&dyn Logger>, mut request: HttpRequest) -> Result<HttpResponse> {
        if let Some(logger) = logger {
            request.set_header(HEADER_REQID, logger.request_id());
        }

        let mut request = match &self.pre_request {
            Some(hook) => hook.transform(request),
            None => request,
        };
        request.set_header(HEADER_USER_AGENT, self.user_agent.as_str());

        let method = request.method;
        let url = request.url.to_string();
        debug!("{} {}", method, url);

        let response = self.transport.send(request).map_err(|e| {
            warn!("{} {} failed: {}", method, url, e);
            RpcError::Transport(e)
        })?;
        debug!("{} {} -> {}", method, url, response.status);

        if let Some(logger) = logger {
            let details = response.header_values(HEADER_LOG);
            if !details.is_empty() {
                logger.receive_diagnostics(&details);
            }
        }
        Ok(response)
    }

    #[allow(clippy::too_many_arguments)]
    fn call(
        &self,
        logger: Option<&dyn Logger>,
        method: &str,
        url: &Url,
        content_type: &str,
        body: Option<Box<dyn Read>>,
        length: u64,
        ret: Option<&mut dyn DecodeTarget>,
    ) -> Result<()> {
        let response = self.send(logger, method, url, content_type, body, length)?;
        self.analyzer.analyse(ret, response)
    }

    pub fn get(&self, logger: Option<&dyn Logger>, url: &Url, ret: Option<&mut dyn DecodeTarget>) -> Result<()> {
        self.call(logger, "GET", url, "", None, 0, ret)
    }

    /// GET without analysis; the caller owns the response and its body.
    pub fn get_response(&self, logger: Option<&dyn Logger>, url: &Url) -> Result<HttpResponse> {
        self.send(logger, "GET", url, "", None, 0)
    }

    pub fn delete(&self, logger: Option<&dyn Logger>, url: &Url, ret: Option<&mut dyn DecodeTarget>) -> Result<()> {
        self.call(logger, "DELETE", url, "", None, 0, ret)
    }

    pub fn post(
        &self,
        logger: Option<&dyn Logger>,
        url: &Url,
        content_type: &str,
        body: impl Read + 'static,
        length: u64,
        ret: Option<&mut dyn DecodeTarget>,
    ) -> Result<()> {
        self.call(logger, "POST", url, content_type, Some(Box::new(body)), length, ret)
    }

    pub fn put(
        &self,
        logger: Option<&dyn Logger>,
        url: &Url,
        content_type: &str,
        body: impl Read + 'static,
        length: u64,
        ret: Option<&mut dyn DecodeTarget>,
    ) -> Result<()> {
        self.call(logger, "PUT", url, content_type, Some(Box::new(body)), length, ret)
    }

    pub fn patch(
        &self,
        logger: Option<&dyn Logger>,
        url: &Url,
        content_type: &str,
        body: impl Read + 'static,
        length: u64,
        ret: Option<&mut dyn DecodeTarget>,
    ) -> Result<()> {
        self.call(logger, "PATCH", url, content_type, Some(Box::new(body)), length, ret)
    }

    /// POST a raw byte stream as `application/octet-stream`.
    pub fn post_binary(
        &self,
        logger: Option<&dyn Logger>,
        url: &Url,
        body: impl Read + 'static,
        length: u64,
        ret: Option<&mut dyn DecodeTarget>,
    ) -> Result<()> {
        self.post(logger, url, MIME_BINARY, body, length, ret)
    }

    pub fn post_json<T: Serialize + ?Sized>(
        &self,
        logger: Option<&dyn Logger>,
        url: &Url,
        data: &T,
        ret: Option<&mut dyn DecodeTarget>,
    ) -> Result<()> {
        self.send_json(logger, "POST", url, data, ret)
    }

    pub fn put_json<T: Serialize + ?Sized>(
        &self,
        logger: Option<&dyn Logger>,
        url: &Url,
        data: &T,
        ret: Option<&mut dyn DecodeTarget>,
    ) -> Result<()> {
        self.send_json(logger, "PUT", url, data, ret)
    }

    pub fn patch_json<T: Serialize + ?Sized>(
        &self,
        logger: Option<&dyn Logger>,
        url: &Url,
        data: &T,
        ret: Option<&mut dyn DecodeTarget>,
    ) -> Result<()> {
        self.send_json(logger, "PATCH", url, data, ret)
    }

    fn send_json<T: Serialize + ?Sized>(
        &self,
        logger: Option<&dyn Logger>,
        method: &str,
        url: &Url,
        data: &T,
        ret: Option<&mut dyn DecodeTarget>,
    ) -> Result<()> {
        let body = serde_json::to_vec(data).map_err(|e| RpcError::Encoding(e.to_string()))?;
        let length = body.len() as u64;
        self.call(logger, method, url, MIME_JSON, Some(Box::new(Cursor::new(body))), length, ret)
    }

    pub fn post_form(
        &self,
        logger: Option<&dyn Logger>,
        url: &Url,
        form: &Values,
        ret: Option<&mut dyn DecodeTarget>,
    ) -> Result<()> {
        self.send_form(logger, "POST", url, form, ret)
    }

    pub fn put_form(
        &self,
        logger: Option<&dyn Logger>,
        url: &Url,
        form: &Values,
        ret: Option<&mut dyn DecodeTarget>,
    ) -> Result<()> {
        self.send_form(logger, "PUT", url, form, ret)
    }

    pub fn patch_form(
        &self,
        logger: Option<&dyn Logger>,
        url: &Url,
        form: &Values,
        ret: Option<&mut dyn DecodeTarget>,
    ) -> Result<()> {
        self.send_form(logger, "PATCH", url, form, ret)
    }

    fn send_form(
        &self,
        logger: Option<&dyn Logger>,
        method: &str,
        url: &Url,
        form: &Values,
        ret: Option<&mut dyn DecodeTarget>,
    ) -> Result<()> {
        let body = encode_values(form).into_bytes();
        let length = body.len() as u64;
        self.call(logger, method, url, MIME_FORM, Some(Box::new(Cursor::new(body))), length, ret)
    }

    pub fn post_multipart(
        &self,
        logger: Option<&dyn Logger>,
        url: &Url,
        form: &mut MultipartForm,
        ret: Option<&mut dyn DecodeTarget>,
    ) -> Result<()> {
        self.send_multipart(logger, "POST", url, form, ret)
    }

    pub fn put_multipart(
        &self,
        logger: Option<&dyn Logger>,
        url: &Url,
        form: &mut MultipartForm,
        ret: Option<&mut dyn DecodeTarget>,
    ) -> Result<()> {
        self.send_multipart(logger, "PUT", url, form, ret)
    }

    pub fn patch_multipart(
        &self,
        logger: Option<&dyn Logger>,
        url: &Url,
        form: &mut MultipartForm,
        ret: Option<&mut dyn DecodeTarget>,
    ) -> Result<()> {
        self.send_multipart(logger, "PATCH", url, form, ret)
    }

    /// Builds the form first, so an unreadable attachment fails the call
    /// before anything is sent.
    fn send_multipart(
        &self,
        logger: Option<&dyn Logger>,
        method: &str,
        url: &Url,
        form: &mut MultipartForm,
        ret: Option<&mut dyn DecodeTarget>,
    ) -> Result<()> {
        let content_type = form.content_type()?.to_string();
        let body = form.reader()?;
        let length = form.size()? as u64;
        self.call(logger, method, url, &content_type, Some(Box::new(body)), length, ret)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("user_agent", &self.user_agent)
            .field("pre_request", &self.pre_request.is_some())
            .finish_non_exhaustive()
    }
}
