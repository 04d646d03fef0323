//! # HTTP Response
//!
//! [`Response`] is the framework's response value, [`ResponseWriter`] the
//! per-request slot handlers and middleware write it into. The helper
//! functions below are the only code that renders JSON payloads and error
//! envelopes.

use crate::api_error::{ApiError, ErrorEnvelope};
use crate::error::Result;
use crate::request::{Request, REQUEST_ID_HEADER};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::StatusCode;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};

/// Content type written by the JSON helpers
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Bytes,
    /// Content type, omitted when `None`
    pub content_type: Option<String>,
    /// Response headers
    pub headers: HashMap<String, String>,
}

impl Default for Response {
    fn default() -> Self {
        Self::empty()
    }
}

impl Response {
    /// Empty 200 response
    #[must_use]
    pub fn empty() -> Self {
        Self {
            status: 200,
            body: Bytes::new(),
            content_type: None,
            headers: HashMap::new(),
        }
    }

    /// Create a JSON response from an already-encoded body
    #[must_use]
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            content_type: Some(JSON_CONTENT_TYPE.to_string()),
            ..Self::empty()
        }
    }

    /// Create a text response
    #[must_use]
    pub fn text(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            content_type: Some("text/plain".to_string()),
            ..Self::empty()
        }
    }

    /// Set status code
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set a header, routing `Content-Type` to its own field
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.set_header(key, value);
        self
    }

    /// Set or override a header
    pub fn set_header(&mut self, key: &str, value: &str) {
        if key.eq_ignore_ascii_case("content-type") {
            self.content_type = Some(value.to_string());
        } else {
            self.headers.insert(key.to_ascii_lowercase(), value.to_string());
        }
    }

    /// Look up a header (case-insensitive)
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        if key.eq_ignore_ascii_case("content-type") {
            return self.content_type.as_deref();
        }
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Body as UTF-8, if it is valid UTF-8
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Convert to hyper Response
    pub(crate) fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = hyper::Response::builder().status(status);
        if let Some(content_type) = &self.content_type {
            builder = builder.header(hyper::header::CONTENT_TYPE, content_type.as_str());
        }
        for (k, v) in &self.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }

        builder.body(Full::new(self.body)).unwrap_or_else(|err| {
            error!(error = %err, "Invalid response header, sending 500");
            let mut fallback = hyper::Response::new(Full::new(Bytes::from("Internal Server Error")));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
    }
}

/// Per-request response slot
///
/// Clones share the slot. The first write wins; later writes are dropped
/// with a warning so a response is never emitted twice.
#[derive(Debug, Clone, Default)]
pub struct ResponseWriter {
    slot: Arc<Mutex<Option<Response>>>,
}

impl ResponseWriter {
    /// Create an empty writer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `response`; returns `false` if a response was already written
    pub fn write(&self, response: Response) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = slot.as_ref() {
            warn!(
                status = existing.status,
                dropped_status = response.status,
                "Response already written, dropping second write"
            );
            return false;
        }
        *slot = Some(response);
        true
    }

    /// Whether a response was written
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Status of the written response
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.status)
    }

    /// A copy of the written response
    #[must_use]
    pub fn snapshot(&self) -> Option<Response> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take the written response out of the slot
    pub fn take(&self) -> Option<Response> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Serialize `data` and write it with `status`
///
/// # Errors
///
/// Returns `Error::Json` when `data` cannot be serialized; nothing is written then.
pub fn write_json<T: Serialize + ?Sized>(writer: &ResponseWriter, status: u16, data: &T) -> Result<()> {
    let body = crate::json::to_json_vec(data)?;
    writer.write(Response::json(body).with_status(status));
    Ok(())
}

/// Like [`write_json`], offered as a download named `filename`
///
/// # Errors
///
/// Returns `Error::Json` when `data` cannot be serialized; nothing is written then.
pub fn write_json_file<T: Serialize + ?Sized>(
    writer: &ResponseWriter,
    status: u16,
    data: &T,
    filename: &str,
) -> Result<()> {
    let body = crate::json::to_json_vec(data)?;
    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));
    writer.write(
        Response::json(body)
            .with_status(status)
            .with_header("content-disposition", &disposition),
    );
    Ok(())
}

/// 200 with `data`
///
/// # Errors
///
/// Returns `Error::Json` when `data` cannot be serialized.
pub fn success<T: Serialize + ?Sized>(writer: &ResponseWriter, data: &T) -> Result<()> {
    write_json(writer, 200, data)
}

/// 201 with `data`
///
/// # Errors
///
/// Returns `Error::Json` when `data` cannot be serialized.
pub fn created<T: Serialize + ?Sized>(writer: &ResponseWriter, data: &T) -> Result<()> {
    write_json(writer, 201, data)
}

/// 204 with no body
pub fn no_content(writer: &ResponseWriter) {
    writer.write(Response::empty().with_status(204));
}

/// 200 `{"data": [...], "count": n}`
///
/// # Errors
///
/// Returns `Error::Json` when an item cannot be serialized.
pub fn list<T: Serialize>(writer: &ResponseWriter, data: &[T]) -> Result<()> {
    write_json(
        writer,
        200,
        &serde_json::json!({ "data": data, "count": data.len() }),
    )
}

/// 200 `{"status": ..., "checks": {...}}`
///
/// # Errors
///
/// Returns `Error::Json` if serialization fails.
pub fn health(writer: &ResponseWriter, status: &str, checks: &BTreeMap<String, bool>) -> Result<()> {
    write_json(
        writer,
        200,
        &serde_json::json!({ "status": status, "checks": checks }),
    )
}

/// Write an error envelope built from `status` and `message`
pub fn write_error(writer: &ResponseWriter, request: &Request, status: u16, message: &str) {
    write_api_error(writer, request, &ApiError::new(status, message));
}

/// Log `err` with request context and write it as `{"error": {...}}`
///
/// Logged at error level for 5xx, warn for 4xx and info otherwise.
pub fn write_api_error(writer: &ResponseWriter, request: &Request, err: &ApiError) {
    let method = request.method.as_str();
    let path = request.path.as_str();
    let remote_addr = request.remote_addr().map(|a| a.to_string()).unwrap_or_default();
    let user_agent = request.header("user-agent").unwrap_or_default();
    let query = request.query_string().unwrap_or_default();
    let request_id = request.header(REQUEST_ID_HEADER).unwrap_or_default();
    let detail = err.detail.as_deref().unwrap_or_default();

    if err.is_server_error() {
        error!(code = err.code, message = %err.message, detail, method, path, remote_addr = %remote_addr, user_agent, query, request_id, "API error");
    } else if err.is_client_error() {
        warn!(code = err.code, message = %err.message, detail, method, path, remote_addr = %remote_addr, user_agent, query, request_id, "API error");
    } else {
        info!(code = err.code, message = %err.message, detail, method, path, remote_addr = %remote_addr, user_agent, query, request_id, "API error");
    }

    let body = crate::json::to_json_vec(&ErrorEnvelope { error: err }).unwrap_or_else(|e| {
        error!(error = %e, "Failed to encode error envelope");
        br#"{"error":{"code":500,"message":"Internal server error"}}"#.to_vec()
    });
    writer.write(Response::json(body).with_status(err.code));
}
