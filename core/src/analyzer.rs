//! Response classification and error normalization.
//!
//! # Design
//! An [`Analyzer`] consumes every response the dispatcher receives. It drains
//! and drops the body on every path so the connection can go back to the
//! pool, decodes successful bodies into the caller's slot, and turns
//! everything else into an [`ErrorInfo`].
//!
//! The caller's slot is a `&mut dyn DecodeTarget`. Any
//! `serde::de::DeserializeOwned` type is a target, which keeps `Analyzer`
//! object-safe while still decoding straight into the caller's type.

use std::io::Read;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ErrorInfo, Result, RpcError};
use crate::http::{HttpResponse, HEADER_CONTENT_TYPE, HEADER_LOG, HEADER_REQID, MIME_JSON};

/// A mutable slot a JSON body can be decoded into.
pub trait DecodeTarget {
    fn decode_json(&mut self, bytes: &[u8]) -> serde_json::Result<()>;
}

impl<T: DeserializeOwned> DecodeTarget for T {
    fn decode_json(&mut self, bytes: &[u8]) -> serde_json::Result<()> {
        *self = serde_json::from_slice(bytes)?;
        Ok(())
    }
}

pub trait Analyzer: Send + Sync {
    /// Decode `response` into `target` or explain why it failed.
    fn analyse(&self, target: Option<&mut dyn DecodeTarget>, response: HttpResponse) -> Result<()>;
}

/// Which 2xx statuses count as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuccessPolicy {
    /// Every 2xx status.
    #[default]
    AnySuccess,
    /// Only 200. Other 2xx statuses are reported as `ErrorInfo` after the
    /// body has been decoded into the target.
    OkOnly,
}

/// Analyzer for JSON backends that report failures with `X-Reqid`, `X-Log`
/// and an optional `{"error": "..."}` body.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAnalyzer {
    policy: SuccessPolicy,
}

impl JsonAnalyzer {
    pub fn new(policy: SuccessPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SuccessPolicy {
        self.policy
    }
}

impl Analyzer for JsonAnalyzer {
    fn analyse(&self, target: Option<&mut dyn DecodeTarget>, mut response: HttpResponse) -> Result<()> {
        let body = drain(&mut response)?;

        if response.is_success() {
            if let Some(target) = target {
                if !body.is_empty() {
                    target
                        .decode_json(&body)
                        .map_err(|e| RpcError::Decode(e.to_string()))?;
                }
            }
            if self.policy == SuccessPolicy::AnySuccess || response.status == 200 {
                return Ok(());
            }
        }

        Err(RpcError::Remote(error_info(&response, &body)))
    }
}

/// Normalize any response into an `ErrorInfo`, draining its body.
///
/// A body that cannot be read only costs the message; the status, request id
/// and details are still reported.
pub fn response_error(mut response: HttpResponse) -> ErrorInfo {
    let body = match drain(&mut response) {
        Ok(body) => body,
        Err(e) => {
            debug!("error body unreadable: {}", e);
            Vec::new()
        }
    };
    error_info(&response, &body)
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
}

fn error_info(response: &HttpResponse, body: &[u8]) -> ErrorInfo {
    let mut message = String::new();
    let is_json = response
        .header(HEADER_CONTENT_TYPE)
        .is_some_and(|ct| ct.contains(MIME_JSON));

    if response.status > 299 && !body.is_empty() && is_json {
        match serde_json::from_slice::<ErrorBody>(body) {
            Ok(parsed) => message = parsed.error,
            Err(e) => debug!("ignoring undecodable error body (HTTP {}): {}", response.status, e),
        }
    }

    ErrorInfo::new(
        response.status,
        response.header(HEADER_REQID).unwrap_or_default(),
        response.header_values(HEADER_LOG),
        message,
    )
}

/// Read the body to the end and release the stream.
fn drain(response: &mut HttpResponse) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    if let Some(length) = response.content_length {
        body.reserve(length.min(1 << 20) as usize);
    }
    let read = response.body.read_to_end(&mut body);
    response.body = Box::new(std::io::empty());
    read.map_err(|source| RpcError::Io {
        path: "response body".to_string(),
        source,
    })?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;
    use std::io;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Person {
        name: String,
        age: u32,
    }

    fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn remote(err: RpcError) -> ErrorInfo {
        match err {
            RpcError::Remote(info) => info,
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn ok_response_populates_target() {
        let resp = HttpResponse::from_bytes(200, Vec::new(), r#"{"name":"james","age":34}"#);
        let mut person = Person::default();
        JsonAnalyzer::default().analyse(Some(&mut person), resp).unwrap();
        assert_eq!(person, Person { name: "james".to_string(), age: 34 });
    }

    #[test]
    fn not_found_carries_request_id_and_details() {
        let resp = HttpResponse::from_bytes(
            404,
            headers(&[("X-Log", "a"), ("X-Log", "b"), ("X-Reqid", "r1")]),
            "",
        );
        let info = remote(JsonAnalyzer::default().analyse(None, resp).unwrap_err());
        assert_eq!(info.status_code(), 404);
        assert_eq!(info.request_id(), "r1");
        assert_eq!(info.details(), ["a", "b"]);
        assert_eq!(info.message(), "");
    }

    #[test]
    fn json_error_body_becomes_message() {
        let resp = HttpResponse::from_bytes(
            500,
            headers(&[("Content-Type", "application/json; charset=utf-8")]),
            r#"{"error":"boom"}"#,
        );
        let info = remote(JsonAnalyzer::default().analyse(None, resp).unwrap_err());
        assert_eq!(info.message(), "boom");
        assert_eq!(info.status_code(), 500);
    }

    #[test]
    fn invalid_json_on_success_is_a_decode_error() {
        let resp = HttpResponse::from_bytes(200, Vec::new(), "not json");
        let mut target: HashMap<String, String> = HashMap::new();
        let err = JsonAnalyzer::default().analyse(Some(&mut target), resp).unwrap_err();
        assert!(matches!(err, RpcError::Decode(_)));
    }

    #[test]
    fn empty_success_body_is_not_decoded() {
        let resp = HttpResponse::from_bytes(200, Vec::new(), "");
        let mut person = Person { name: "kept".to_string(), age: 1 };
        JsonAnalyzer::default().analyse(Some(&mut person), resp).unwrap();
        assert_eq!(person.name, "kept");
    }

    #[test]
    fn success_without_target_ignores_body() {
        let resp = HttpResponse::from_bytes(200, Vec::new(), "not json");
        JsonAnalyzer::default().analyse(None, resp).unwrap();
    }

    #[test]
    fn any_2xx_succeeds_by_default() {
        let resp = HttpResponse::from_bytes(204, Vec::new(), "");
        JsonAnalyzer::default().analyse(None, resp).unwrap();

        let resp = HttpResponse::from_bytes(201, Vec::new(), r#"{"name":"n","age":2}"#);
        let mut person = Person::default();
        JsonAnalyzer::default().analyse(Some(&mut person), resp).unwrap();
        assert_eq!(person.age, 2);
    }

    #[test]
    fn ok_only_policy_reports_other_2xx() {
        let analyzer = JsonAnalyzer::new(SuccessPolicy::OkOnly);
        let resp = HttpResponse::from_bytes(
            201,
            headers(&[("Content-Type", "application/json"), ("X-Reqid", "r2")]),
            r#"{"name":"n","age":2}"#,
        );
        let mut person = Person::default();
        let info = remote(analyzer.analyse(Some(&mut person), resp).unwrap_err());
        assert_eq!(info.status_code(), 201);
        assert_eq!(info.request_id(), "r2");
        // the body is still decoded, and 2xx bodies never become messages
        assert_eq!(person.age, 2);
        assert_eq!(info.message(), "");
    }

    #[test]
    fn ok_only_policy_rejects_empty_no_content() {
        let analyzer = JsonAnalyzer::new(SuccessPolicy::OkOnly);
        assert_eq!(analyzer.policy(), SuccessPolicy::OkOnly);
        assert_eq!(JsonAnalyzer::default().policy(), SuccessPolicy::AnySuccess);

        let resp = HttpResponse::from_bytes(204, Vec::new(), "");
        let err = analyzer.analyse(None, resp).unwrap_err();
        assert_eq!(err.status_code(), Some(204));
        assert!(remote(err).details().is_empty());

        let resp = HttpResponse::from_bytes(204, Vec::new(), "");
        JsonAnalyzer::default().analyse(None, resp).unwrap();
    }

    #[test]
    fn non_json_error_body_leaves_message_empty() {
        let resp = HttpResponse::from_bytes(
            502,
            headers(&[("Content-Type", "text/plain"), ("X-Reqid", "r3"), ("X-Log", "upstream")]),
            "bad gateway",
        );
        let info = remote(JsonAnalyzer::default().analyse(None, resp).unwrap_err());
        assert_eq!(info.message(), "");
        assert_eq!(info.request_id(), "r3");
        assert_eq!(info.details(), ["upstream"]);
    }

    #[test]
    fn malformed_json_error_body_is_tolerated() {
        let resp = HttpResponse::from_bytes(
            400,
            headers(&[("Content-Type", "application/json")]),
            "{\"error\":",
        );
        let info = remote(JsonAnalyzer::default().analyse(None, resp).unwrap_err());
        assert_eq!(info.status_code(), 400);
        assert_eq!(info.message(), "");
    }

    #[test]
    fn body_is_drained_on_error_paths() {
        struct Tracking(std::rc::Rc<std::cell::Cell<bool>>, io::Cursor<Vec<u8>>);
        impl Read for Tracking {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let n = self.1.read(buf)?;
                if n == 0 {
                    self.0.set(true);
                }
                Ok(n)
            }
        }

        let reached_end = std::rc::Rc::new(std::cell::Cell::new(false));
        let resp = HttpResponse {
            status: 503,
            headers: Vec::new(),
            body: Box::new(Tracking(reached_end.clone(), io::Cursor::new(b"unavailable".to_vec()))),
            content_length: None,
        };
        JsonAnalyzer::default().analyse(None, resp).unwrap_err();
        assert!(reached_end.get());
    }

    #[test]
    fn unreadable_success_body_is_an_io_error() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            }
        }
        let resp = HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: Box::new(Broken),
            content_length: None,
        };
        let err = JsonAnalyzer::default().analyse(None, resp).unwrap_err();
        assert!(matches!(err, RpcError::Io { .. }));
    }

    #[test]
    fn response_error_tolerates_unreadable_body() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            }
        }
        let resp = HttpResponse {
            status: 500,
            headers: headers(&[("X-Reqid", "r4")]),
            body: Box::new(Broken),
            content_length: None,
        };
        let info = response_error(resp);
        assert_eq!(info.status_code(), 500);
        assert_eq!(info.request_id(), "r4");
    }
}
