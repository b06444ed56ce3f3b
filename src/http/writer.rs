//! Response serialization.
//!
//! [`ResponseWriter`] writes a response straight onto its sink, one write per
//! call, and refuses calls made out of order:
//!
//! ```text
//! StatusLine ─▶ Headers ─▶ Body ─┬─ write_body* ───────────────────────────▶ (done)
//!                                └─ write_chunk* ─▶ write_chunked_body_done ─┬─▶ Finished
//!                                                                            └─▶ Trailers ─▶ write_trailers ─▶ Finished
//! ```

use std::fmt;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::headers::{HeaderMap, canonical_name};
use crate::http::response::StatusCode;

const HTTP_VERSION: &str = "HTTP/1.1";
const CRLF: &[u8] = b"\r\n";

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("unsupported status code {0}")]
    UnsupportedStatus(u16),

    #[error("{operation} called while writer expects {state}")]
    OutOfOrder {
        operation: &'static str,
        state: WriterState,
    },

    #[error("trailer {0:?} was not declared in the Trailer header")]
    UndeclaredTrailer(String),

    #[error("I/O error while writing response: {0}")]
    Io(#[from] std::io::Error),
}

/// The part of the response the writer expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    StatusLine,
    Headers,
    Body,
    Chunked,
    Trailers,
    Finished,
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriterState::StatusLine => "status line",
            WriterState::Headers => "headers",
            WriterState::Body => "body",
            WriterState::Chunked => "chunked body",
            WriterState::Trailers => "trailers",
            WriterState::Finished => "nothing",
        };
        f.write_str(name)
    }
}

pub struct ResponseWriter<W> {
    sink: W,
    state: WriterState,
    declared_trailers: Vec<String>,
}

impl<W> ResponseWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            state: WriterState::StatusLine,
            declared_trailers: Vec::new(),
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Whether anything has been written yet.
    pub fn has_started(&self) -> bool {
        self.state != WriterState::StatusLine
    }

    /// Whether a chunked body has been fully terminated.
    pub fn is_finished(&self) -> bool {
        self.state == WriterState::Finished
    }

    /// Writes `HTTP/1.1 <code> <reason> \r\n`.
    pub async fn write_status_line(&mut self, status: StatusCode) -> Result<(), WriteError> {
        self.require("write_status_line", &[WriterState::StatusLine])?;

        let line = format!(
            "{} {} {} \r\n",
            HTTP_VERSION,
            status.as_u16(),
            status.reason_phrase()
        );
        self.sink.write_all(line.as_bytes()).await?;

        self.state = WriterState::Headers;
        Ok(())
    }

    /// Writes the header block, including the blank line that ends it.
    ///
    /// Names listed in a `Trailer` header are remembered so that
    /// [`write_trailers`](Self::write_trailers) can check against them.
    pub async fn write_headers(&mut self, headers: &HeaderMap) -> Result<(), WriteError> {
        self.require("write_headers", &[WriterState::Headers])?;

        let block = serialize_fields(headers.iter().map(|(n, v)| (canonical_name(n), v)));
        self.sink.write_all(&block).await?;

        self.declared_trailers = headers
            .get("trailer")
            .map(|names| {
                names
                    .split(',')
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        self.state = WriterState::Body;
        Ok(())
    }

    /// Writes raw body bytes. May be called repeatedly.
    pub async fn write_body(&mut self, body: &[u8]) -> Result<usize, WriteError> {
        self.require("write_body", &[WriterState::Body])?;
        self.sink.write_all(body).await?;
        Ok(body.len())
    }

    /// Writes one chunk of a chunked body. Empty input writes nothing, since
    /// a zero-length chunk would end the body.
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        self.require("write_chunk", &[WriterState::Body, WriterState::Chunked])?;
        self.state = WriterState::Chunked;

        if data.is_empty() {
            return Ok(0);
        }

        let mut frame = Vec::with_capacity(data.len() + 12);
        frame.extend_from_slice(format!("{:x}", data.len()).as_bytes());
        frame.extend_from_slice(CRLF);
        frame.extend_from_slice(data);
        frame.extend_from_slice(CRLF);
        self.sink.write_all(&frame).await?;

        Ok(data.len())
    }

    /// Writes the terminating zero-length chunk. Without declared trailers
    /// this also ends the message (`0\r\n\r\n`).
    pub async fn write_chunked_body_done(&mut self) -> Result<(), WriteError> {
        self.require(
            "write_chunked_body_done",
            &[WriterState::Body, WriterState::Chunked],
        )?;

        if self.declared_trailers.is_empty() {
            self.sink.write_all(b"0\r\n\r\n").await?;
            self.state = WriterState::Finished;
        } else {
            self.sink.write_all(b"0\r\n").await?;
            self.state = WriterState::Trailers;
        }
        Ok(())
    }

    /// Writes trailer fields after the zero-length chunk, then the final
    /// blank line. Every trailer must have been declared in advance, and each
    /// is written with the spelling used in the `Trailer` header.
    pub async fn write_trailers(&mut self, trailers: &HeaderMap) -> Result<(), WriteError> {
        self.require("write_trailers", &[WriterState::Trailers])?;

        if let Some((name, _)) = trailers
            .iter()
            .find(|(name, _)| {
                !self
                    .declared_trailers
                    .iter()
                    .any(|d| d.eq_ignore_ascii_case(name))
            })
        {
            return Err(WriteError::UndeclaredTrailer(name.to_string()));
        }

        let fields = self
            .declared_trailers
            .iter()
            .filter_map(|name| trailers.get(name).map(|value| (name.clone(), value)));
        let block = serialize_fields(fields);
        self.sink.write_all(&block).await?;

        self.state = WriterState::Finished;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), WriteError> {
        self.sink.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    fn require(&self, operation: &'static str, allowed: &[WriterState]) -> Result<(), WriteError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(WriteError::OutOfOrder {
                operation,
                state: self.state,
            })
        }
    }
}

fn serialize_fields<'a>(fields: impl Iterator<Item = (String, &'a str)>) -> Vec<u8> {
    let mut buf = Vec::new();
    for (name, value) in fields {
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(CRLF);
    }
    buf.extend_from_slice(CRLF);
    buf
}
