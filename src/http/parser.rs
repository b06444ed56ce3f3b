//! Incremental request parser.
//!
//! [`RequestParser`] never performs I/O. Bytes are handed to [`RequestParser::feed`]
//! as they arrive, and it consumes as much as the currently buffered input
//! allows. [`read_request`] drives it from any [`AsyncRead`].

use std::mem;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

use crate::http::headers::{HeaderError, HeaderMap, find_crlf};
use crate::http::request::{Request, RequestLine};

/// Starting size of the accumulation buffer used by [`read_request`].
pub const DEFAULT_INITIAL_BUFFER_SIZE: usize = 8;

/// Largest `Content-Length` accepted unless configured otherwise.
pub const DEFAULT_MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// Largest request-line plus header block accepted unless configured otherwise.
pub const DEFAULT_MAX_HEAD_SIZE: usize = 64 * 1024;

const HTTP_PREFIX: &str = "HTTP/";
const SUPPORTED_VERSION: &str = "1.1";

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),

    #[error("unsupported HTTP version: {0}")]
    UnsupportedVersion(String),

    #[error("malformed header: {0}")]
    MalformedHeader(#[from] HeaderError),

    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    #[error("request head exceeds the {limit} byte limit")]
    HeadTooLarge { limit: usize },

    #[error("declared body of {declared} bytes exceeds the {limit} byte limit")]
    BodyTooLarge { declared: usize, limit: usize },

    #[error("body is longer than the declared {expected} bytes")]
    BodyOverflow { expected: usize },

    #[error("stream ended after {received} of {expected} body bytes")]
    TruncatedBody { expected: usize, received: usize },

    #[error("stream ended in the middle of the request head")]
    TruncatedRequest,

    #[error("parser already produced its request")]
    InvalidState,

    #[error("I/O error while reading request: {0}")]
    Io(#[from] std::io::Error),
}

/// Limits applied while reading a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Initial size of the read buffer; it doubles whenever it fills up
    /// without completing a line.
    pub initial_buffer_size: usize,
    /// Largest accepted request-line plus header block, terminators included.
    pub max_head_size: usize,
    /// Largest accepted `Content-Length`.
    pub max_body_size: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            initial_buffer_size: DEFAULT_INITIAL_BUFFER_SIZE,
            max_head_size: DEFAULT_MAX_HEAD_SIZE,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

#[derive(Debug)]
enum State {
    Initialized,
    ParsingHeaders {
        line: RequestLine,
        headers: HeaderMap,
    },
    ParsingBody {
        line: RequestLine,
        headers: HeaderMap,
        body: BytesMut,
        expected: usize,
    },
    Done(Request),
}

enum Step {
    Consumed(usize),
    NeedMore,
}

/// Request parser state machine: request-line, then headers, then body.
#[derive(Debug)]
pub struct RequestParser {
    state: State,
    limits: ParseLimits,
    received_any: bool,
    head_consumed: usize,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self::with_limits(ParseLimits::default())
    }

    pub fn with_limits(limits: ParseLimits) -> Self {
        Self {
            state: State::Initialized,
            limits,
            received_any: false,
            head_consumed: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done(_))
    }

    /// The completed request, if parsing has finished.
    pub fn request(&self) -> Option<&Request> {
        match &self.state {
            State::Done(request) => Some(request),
            _ => None,
        }
    }

    /// Feeds the currently buffered, not yet consumed bytes.
    ///
    /// Returns how many bytes from the front of `data` were consumed. The
    /// caller keeps the remainder, appends newly received bytes to it and
    /// feeds again.
    pub fn feed(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        if !data.is_empty() {
            self.received_any = true;
        }

        if let State::Done(request) = &self.state {
            return Err(overflow_or_reentry(request, data));
        }

        let mut consumed = 0;
        while !self.is_done() {
            let in_head = self.in_head();
            match self.step(&data[consumed..])? {
                Step::Consumed(n) => {
                    consumed += n;
                    if in_head {
                        self.head_consumed += n;
                    }
                }
                Step::NeedMore => break,
            }
        }

        // An unterminated line counts against the head limit as well.
        let pending = if self.in_head() { data.len() - consumed } else { 0 };
        if self.head_consumed + pending > self.limits.max_head_size {
            return Err(ParseError::HeadTooLarge {
                limit: self.limits.max_head_size,
            });
        }

        // A length-framed body ends exactly at its declared size.
        if let State::Done(request) = &self.state {
            if request.body.is_some() && consumed < data.len() {
                return Err(overflow_or_reentry(request, &data[consumed..]));
            }
        }

        Ok(consumed)
    }

    /// Signals end of stream.
    ///
    /// Returns `Ok(None)` when the peer closed without sending a single byte.
    /// Any other end of stream before the request is complete is an error.
    pub fn finish(self) -> Result<Option<Request>, ParseError> {
        let received_any = self.received_any;

        match self.state {
            State::Done(request) => Ok(Some(request)),
            State::Initialized if !received_any => Ok(None),
            State::Initialized | State::ParsingHeaders { .. } => Err(ParseError::TruncatedRequest),
            State::ParsingBody { body, expected, .. } => Err(ParseError::TruncatedBody {
                expected,
                received: body.len(),
            }),
        }
    }

    pub fn into_request(self) -> Result<Request, ParseError> {
        match self.state {
            State::Done(request) => Ok(request),
            _ => Err(ParseError::InvalidState),
        }
    }

    /// Whether a length-framed body has been completely received.
    fn has_framed_body(&self) -> bool {
        matches!(&self.state, State::Done(request) if request.body.is_some())
    }

    fn in_head(&self) -> bool {
        matches!(
            self.state,
            State::Initialized | State::ParsingHeaders { .. }
        )
    }

    fn step(&mut self, data: &[u8]) -> Result<Step, ParseError> {
        match &mut self.state {
            State::Initialized => {
                let Some(idx) = find_crlf(data) else {
                    return Ok(Step::NeedMore);
                };
                let line = parse_request_line(&data[..idx])?;
                self.state = State::ParsingHeaders {
                    line,
                    headers: HeaderMap::new(),
                };
                Ok(Step::Consumed(idx + 2))
            }

            State::ParsingHeaders { line, headers } => {
                let (n, done) = headers.parse_line(data)?;
                if done {
                    let line = mem::take(line);
                    let headers = mem::take(headers);
                    self.state = start_body(line, headers, &self.limits)?;
                    return Ok(Step::Consumed(n));
                }
                if n == 0 {
                    Ok(Step::NeedMore)
                } else {
                    Ok(Step::Consumed(n))
                }
            }

            State::ParsingBody {
                line,
                headers,
                body,
                expected,
            } => {
                let take = data.len().min(*expected - body.len());
                if take == 0 {
                    return Ok(Step::NeedMore);
                }
                body.extend_from_slice(&data[..take]);

                if body.len() == *expected {
                    let request = Request {
                        request_line: mem::take(line),
                        headers: mem::take(headers),
                        body: Some(mem::take(body).freeze()),
                    };
                    self.state = State::Done(request);
                }
                Ok(Step::Consumed(take))
            }

            State::Done(_) => Err(ParseError::InvalidState),
        }
    }
}

/// Reads one request from `reader`.
///
/// The read buffer starts at `limits.initial_buffer_size` bytes and doubles
/// whenever it is full without yielding a parseable unit. Bytes received after
/// a request without a body are discarded.
///
/// Once a `Content-Length` body is complete, any bytes the reader can hand
/// over without waiting are checked too, so a body longer than declared is a
/// [`ParseError::BodyOverflow`] however the stream was split into reads.
pub async fn read_request<R>(
    reader: &mut R,
    limits: &ParseLimits,
) -> Result<Option<Request>, ParseError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut parser = RequestParser::with_limits(*limits);
    let mut buf = vec![0u8; limits.initial_buffer_size.max(1)];
    let mut filled = 0;

    while !parser.is_done() {
        if filled == buf.len() {
            buf.resize(buf.len() * 2, 0);
            tracing::trace!(capacity = buf.len(), "grew request buffer");
        }

        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return parser.finish();
        }
        filled += n;

        let consumed = parser.feed(&buf[..filled])?;
        buf.copy_within(consumed..filled, 0);
        filled -= consumed;
    }

    if filled > 0 {
        tracing::debug!(discarded = filled, "ignoring bytes after request");
    } else if parser.has_framed_body() {
        check_body_overflow(reader, &mut parser, &mut buf).await?;
    }

    parser.into_request().map(Some)
}

/// Polls `reader` once without waiting. Bytes already available past the end
/// of the body are fed to the parser, which rejects them.
async fn check_body_overflow<R>(
    reader: &mut R,
    parser: &mut RequestParser,
    buf: &mut [u8],
) -> Result<(), ParseError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match timeout(Duration::ZERO, reader.read(buf)).await {
        Ok(Ok(0)) | Err(_) => Ok(()),
        Ok(Ok(n)) => parser.feed(&buf[..n]).map(|_| ()),
        Ok(Err(e)) => Err(e.into()),
    }
}

fn overflow_or_reentry(request: &Request, extra: &[u8]) -> ParseError {
    match &request.body {
        Some(body) if !extra.is_empty() => ParseError::BodyOverflow {
            expected: body.len(),
        },
        _ => ParseError::InvalidState,
    }
}

fn start_body(
    line: RequestLine,
    headers: HeaderMap,
    limits: &ParseLimits,
) -> Result<State, ParseError> {
    let Some(raw) = headers.get("content-length") else {
        return Ok(State::Done(Request {
            request_line: line,
            headers,
            body: None,
        }));
    };

    let expected = parse_content_length(raw)?;
    if expected > limits.max_body_size {
        return Err(ParseError::BodyTooLarge {
            declared: expected,
            limit: limits.max_body_size,
        });
    }

    if expected == 0 {
        return Ok(State::Done(Request {
            request_line: line,
            headers,
            body: Some(Bytes::new()),
        }));
    }

    Ok(State::ParsingBody {
        line,
        headers,
        body: BytesMut::with_capacity(expected),
        expected,
    })
}

fn parse_content_length(raw: &str) -> Result<usize, ParseError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidContentLength(raw.to_string()));
    }
    raw.parse()
        .map_err(|_| ParseError::InvalidContentLength(raw.to_string()))
}

fn parse_request_line(bytes: &[u8]) -> Result<RequestLine, ParseError> {
    let line = std::str::from_utf8(bytes).map_err(|_| {
        ParseError::MalformedRequestLine(String::from_utf8_lossy(bytes).into_owned())
    })?;
    let malformed = || ParseError::MalformedRequestLine(line.to_string());

    let parts: Vec<&str> = line.split(' ').collect();
    let [method, target, version] = parts.as_slice() else {
        return Err(malformed());
    };

    if method.is_empty() || target.is_empty() {
        return Err(malformed());
    }
    if !method.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(malformed());
    }

    let Some(number) = version.strip_prefix(HTTP_PREFIX) else {
        return Err(malformed());
    };
    if number != SUPPORTED_VERSION {
        return Err(ParseError::UnsupportedVersion(version.to_string()));
    }

    Ok(RequestLine {
        method: method.to_string(),
        target: target.to_string(),
        http_version: number.to_string(),
    })
}
