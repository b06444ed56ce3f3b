use crate::http::headers::HeaderMap;
use crate::http::writer::WriteError;

/// HTTP status codes the writer knows how to emit.
///
/// - `Ok` (200): Request successful
/// - `BadRequest` (400): Malformed request
/// - `InternalServerError` (500): Server error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use httpwire::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the reason phrase written on the status line.
    ///
    /// # Example
    ///
    /// ```
    /// # use httpwire::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::InternalServerError.reason_phrase(), "Internal Server Error");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

impl TryFrom<u16> for StatusCode {
    type Error = WriteError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            200 => Ok(StatusCode::Ok),
            400 => Ok(StatusCode::BadRequest),
            500 => Ok(StatusCode::InternalServerError),
            other => Err(WriteError::UnsupportedStatus(other)),
        }
    }
}

/// Baseline headers for a response whose body is `content_len` bytes long.
///
/// Callers adjust the set before writing it, e.g. swapping `content-length`
/// for `transfer-encoding: chunked`.
pub fn default_headers(content_len: usize) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.replace("content-length", content_len.to_string());
    headers.replace("connection", "close");
    headers.replace("content-type", "text/plain");
    headers
}
