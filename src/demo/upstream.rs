//! Re-streams an upstream HTTP body as a chunked response.
//!
//! The upstream body length is not known in advance, so each fragment read
//! from upstream is written as one chunk. The SHA-256 and total length of the
//! body are sent as trailers once the body is complete.

use sha2::{Digest, Sha256};
use tokio::io::AsyncWrite;

use crate::http::headers::HeaderMap;
use crate::http::response::{StatusCode, default_headers};
use crate::http::writer::ResponseWriter;

pub const TRAILER_SHA256: &str = "X-Content-SHA256";
pub const TRAILER_LENGTH: &str = "X-Content-Length";

/// Headers announcing a chunked body with the hash and length trailers.
pub fn chunked_headers() -> HeaderMap {
    let mut headers = default_headers(0);
    headers.remove("content-length");
    headers.replace("transfer-encoding", "chunked");
    headers.set("trailer", TRAILER_SHA256);
    headers.set("trailer", TRAILER_LENGTH);
    headers
}

/// Streams `upstream` to the client. The status line is written only once
/// the upstream request has succeeded, so a failing upstream can still be
/// answered with an error page by the caller.
pub async fn relay_chunked<W>(
    mut upstream: reqwest::Response,
    writer: &mut ResponseWriter<W>,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    writer.write_status_line(StatusCode::Ok).await?;
    writer.write_headers(&chunked_headers()).await?;

    let mut hasher = Sha256::new();
    let mut total = 0usize;

    while let Some(fragment) = upstream.chunk().await? {
        hasher.update(&fragment);
        total += fragment.len();
        writer.write_chunk(&fragment).await?;
    }

    tracing::debug!(bytes = total, "upstream body relayed");

    writer.write_chunked_body_done().await?;

    let mut trailers = HeaderMap::new();
    trailers.set(TRAILER_SHA256, format!("{:x}", hasher.finalize()));
    trailers.set(TRAILER_LENGTH, total.to_string());
    writer.write_trailers(&trailers).await?;

    Ok(())
}
