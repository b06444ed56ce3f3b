use bytes::Bytes;

use crate::http::headers::HeaderMap;

/// The first line of a request: `METHOD SP TARGET SP HTTP/1.1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestLine {
    /// Method token, uppercase ASCII letters only (e.g. `GET`)
    pub method: String,
    /// Raw request-target exactly as received; never decoded
    pub target: String,
    /// Protocol version without the `HTTP/` prefix; always `"1.1"`
    pub http_version: String,
}

/// A fully parsed HTTP request.
///
/// Only ever produced by the parser once it has reached its terminal state,
/// so every field is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub request_line: RequestLine,
    pub headers: HeaderMap,
    /// Present iff the request carried a `Content-Length` header.
    pub body: Option<Bytes>,
}

impl Request {
    pub fn method(&self) -> &str {
        &self.request_line.method
    }

    pub fn target(&self) -> &str {
        &self.request_line.target
    }

    /// Retrieves a header value by name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The body bytes, or an empty slice when the request had no body.
    pub fn body_bytes(&self) -> &[u8] {
        self.body.as_deref().unwrap_or_default()
    }
}
