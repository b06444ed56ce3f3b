use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::http::parser::{ParseError, ParseLimits, read_request};
use crate::http::request::Request;
use crate::http::response::{StatusCode, default_headers};
use crate::http::writer::{ResponseWriter, WriteError};
use crate::server::handler::Handler;

/// One accepted client connection, served exactly once and then closed.
pub struct Connection<S> {
    stream: S,
    peer: SocketAddr,
    limits: ParseLimits,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Rejecting(ParseError),
    Closed,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, peer: SocketAddr, limits: ParseLimits) -> Self {
        Self {
            stream,
            peer,
            limits,
            state: ConnectionState::Reading,
        }
    }

    /// Runs parse, handle and write in sequence, then shuts the stream down.
    pub async fn run<H: Handler>(mut self, handler: &H) {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    self.state = match read_request(&mut self.stream, &self.limits).await {
                        Ok(Some(request)) => ConnectionState::Processing(request),
                        Ok(None) => {
                            tracing::debug!(peer = %self.peer, "client closed without sending a request");
                            ConnectionState::Closed
                        }
                        Err(e) => ConnectionState::Rejecting(e),
                    };
                }

                ConnectionState::Processing(request) => {
                    tracing::debug!(
                        peer = %self.peer,
                        method = request.method(),
                        target = request.target(),
                        "handling request"
                    );
                    self.respond(handler, request).await;
                }

                ConnectionState::Rejecting(e) => {
                    tracing::warn!(peer = %self.peer, error = %e, "rejecting malformed request");
                    if let Err(e) = self.reject().await {
                        tracing::error!(peer = %self.peer, error = %e, "failed to write 400 response");
                    }
                }

                ConnectionState::Closed => break,
            }
        }

        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(peer = %self.peer, error = %e, "error shutting down connection");
        }
    }

    async fn respond<H: Handler>(&mut self, handler: &H, request: Request) {
        let mut writer = ResponseWriter::new(&mut self.stream);

        if let Err(e) = handler.handle(request, &mut writer).await {
            tracing::error!(peer = %self.peer, error = %e, "handler failed");
            if !writer.has_started() {
                if let Err(e) = write_handler_error(&mut writer, &e).await {
                    tracing::error!(peer = %self.peer, error = %e, "failed to write 500 response");
                }
            }
        }

        if let Err(e) = writer.flush().await {
            tracing::error!(peer = %self.peer, error = %e, "failed to flush response");
        }
    }

    async fn reject(&mut self) -> Result<(), WriteError> {
        let mut writer = ResponseWriter::new(&mut self.stream);
        writer.write_status_line(StatusCode::BadRequest).await?;
        writer.write_headers(&default_headers(0)).await?;
        writer.flush().await
    }
}

async fn write_handler_error<W>(
    writer: &mut ResponseWriter<W>,
    error: &anyhow::Error,
) -> Result<(), WriteError>
where
    W: AsyncWrite + Unpin,
{
    let message = error.to_string();
    writer
        .write_status_line(StatusCode::InternalServerError)
        .await?;
    writer
        .write_headers(&default_headers(message.len()))
        .await?;
    writer.write_body(message.as_bytes()).await?;
    Ok(())
}
