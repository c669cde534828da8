//! The uniform per-request contract between HTTP backends and the session
//! layer.
//!
//! A session handler is written once against [`HttpContext`] and never learns
//! which concrete server executes it. Each backend contributes one adapter
//! type implementing the contract over its own request/response
//! representations; [`ServerContext`] is the adapter for the engine in
//! [`crate::http`]. The read side wraps an immutable request snapshot, the
//! write side accumulates status, headers, and body until [`Finalize::finalize`]
//! converts the whole thing into the backend's native response exactly once.
//!
//! # Examples
//!
//! ```
//! use gantry::context::{Content, Finalize, HttpContext, ServerContext};
//! use gantry::http::Request;
//!
//! let raw = b"GET /?app=demo HTTP/1.1\r\nHost: localhost\r\n\r\n";
//! let (request, _) = Request::parse(raw).unwrap();
//! let mut ctx = ServerContext::new(request);
//!
//! assert_eq!(ctx.method(), "GET");
//! assert_eq!(ctx.url_parameter_or("app", "index"), "demo");
//!
//! ctx.set_content(Content::from("hello"));
//! let response = ctx.finalize();
//! assert_eq!(response.content(), b"hello");
//! assert_eq!(response.status().as_u16(), 200);
//! ```

use std::net::IpAddr;

use serde_json::Value;
use thiserror::Error;

use crate::http::{Headers, Request, Response, StatusCode};

/// Error produced while assembling a response through the context.
///
/// Fatal only to the request being handled; the serving loops never let it
/// cross into other requests.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The value handed to [`HttpContext::set_json`] could not be serialized.
    #[error("response body is not JSON-serializable: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Response body content accepted by [`HttpContext::set_content`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// UTF-8 text, sent as-is.
    Text(String),
    /// Raw bytes, sent as-is.
    Binary(Vec<u8>),
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<&[u8]> for Content {
    fn from(bytes: &[u8]) -> Self {
        Self::Binary(bytes.to_vec())
    }
}

/// The backend-independent request/response contract.
///
/// One instance exists per inbound request. Read operations are pure
/// accessors over the request snapshot; write operations mutate the response
/// accumulator owned by this instance. No operation blocks or suspends.
///
/// Implementations must uphold:
///
/// - [`method`](Self::method) returns the uppercase method string.
/// - Header lookup is case-insensitive.
/// - [`url_parameter`](Self::url_parameter) is single-value (repeated keys
///   resolve to one value).
/// - [`json_body`](Self::json_body) never fails: malformed, non-JSON, or
///   absent bodies all come back as `None`.
/// - [`set_header`](Self::set_header) is last-write-wins.
/// - The response status defaults to 200 until
///   [`set_status`](Self::set_status) is called.
pub trait HttpContext: Send {
    /// Short identifier of the backend serving this request, for logging.
    fn backend_name(&self) -> &'static str;

    /// The uppercase HTTP method string, e.g. `"GET"`.
    fn method(&self) -> &str;

    /// Case-insensitive view of the request headers.
    fn headers(&self) -> &Headers;

    /// Single-value lookup of a URL query parameter.
    fn url_parameter(&self, name: &str) -> Option<&str>;

    /// Single-value lookup with a fallback default.
    fn url_parameter_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.url_parameter(name).unwrap_or(default)
    }

    /// Best-effort decode of the request body as JSON.
    ///
    /// Returns `None` for malformed, non-JSON, or absent bodies; decoding a
    /// body is a recoverable condition, never an error. Decodes on each call.
    fn json_body(&self) -> Option<Value>;

    /// The client's IP address, where the transport recorded one.
    fn client_ip(&self) -> Option<IpAddr>;

    /// Records a response header, replacing any previous value for the name.
    fn set_header(&mut self, name: &str, value: &str);

    /// Records the response status code.
    fn set_status(&mut self, status: StatusCode);

    /// Records the response body.
    fn set_content(&mut self, content: Content);

    /// Serializes `value` as the response body and marks the response as
    /// `application/json`.
    ///
    /// The content-type header is only written once serialization has
    /// succeeded, so a failed call leaves the response untouched.
    ///
    /// # Errors
    ///
    /// [`ContextError::Serialize`] when `value` cannot be encoded; fatal to
    /// this request only.
    fn set_json(&mut self, value: &Value) -> Result<(), ContextError> {
        let body = serde_json::to_string(value)?;
        self.set_header("content-type", "application/json");
        self.set_content(Content::Text(body));
        Ok(())
    }
}

/// Conversion of a fully populated context into the backend's native response.
///
/// Split from [`HttpContext`] so the handler-facing trait stays object-safe
/// while each backend still gets a compile-time checked response type.
/// Called exactly once, after the session handler returns.
pub trait Finalize: HttpContext + Sized {
    /// The backend's own response representation.
    type Response;

    /// Consumes the context and emits the native response.
    fn finalize(self) -> Self::Response;
}

/// Write-only response accumulator owned by one adapter instance.
#[derive(Debug)]
struct ResponseParts {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl Default for ResponseParts {
    fn default() -> Self {
        Self {
            status: StatusCode::Ok,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }
}

/// [`HttpContext`] adapter for the built-in HTTP engine.
///
/// Wraps one parsed [`Request`] and finalizes into an [`Response`]. The
/// serving loops construct one per inbound request and hand it to the
/// session bridge; nothing here is shared across requests.
#[derive(Debug)]
pub struct ServerContext {
    request: Request,
    reply: ResponseParts,
}

impl ServerContext {
    /// Wraps a parsed request in a fresh adapter with an empty 200 response.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            reply: ResponseParts::default(),
        }
    }

    /// Read access to the underlying request snapshot.
    pub fn request(&self) -> &Request {
        &self.request
    }
}

impl HttpContext for ServerContext {
    fn backend_name(&self) -> &'static str {
        "builtin"
    }

    fn method(&self) -> &str {
        self.request.method().as_str()
    }

    fn headers(&self) -> &Headers {
        self.request.headers()
    }

    fn url_parameter(&self, name: &str) -> Option<&str> {
        self.request.query_param(name)
    }

    fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(self.request.body().as_ref()).ok()
    }

    fn client_ip(&self) -> Option<IpAddr> {
        self.request.peer_addr().map(|addr| addr.ip())
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.reply.headers.set(name, value);
    }

    fn set_status(&mut self, status: StatusCode) {
        self.reply.status = status;
    }

    fn set_content(&mut self, content: Content) {
        self.reply.body = match content {
            Content::Text(text) => text.into_bytes(),
            Content::Binary(bytes) => bytes,
        };
    }
}

impl Finalize for ServerContext {
    type Response = Response;

    fn finalize(self) -> Response {
        let mut response = Response::new(self.reply.status);
        *response.headers_mut() = self.reply.headers;
        response.body_bytes(self.reply.body)
    }
}
