//! Demo request handler.
//!
//! Routes:
//!
//! - `/yourproblem` → 400 page
//! - `/myproblem` → 500 page
//! - `/video` → the configured video file
//! - `/httpbin/<path>` → `<upstream_url><path>`, relayed as a chunked body
//!   with hash and length trailers; paths leaving the upstream origin get
//!   the 400 page
//! - anything else → 200 page

pub mod upstream;

use std::path::PathBuf;

use anyhow::Context;
use tokio::io::AsyncWrite;
use url::Url;

use crate::config::DemoConfig;
use crate::http::request::Request;
use crate::http::response::{StatusCode, default_headers};
use crate::http::writer::ResponseWriter;
use crate::server::handler::Handler;

const HTTPBIN_PREFIX: &str = "/httpbin/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<'a> {
    Index,
    YourProblem,
    MyProblem,
    Video,
    Httpbin(&'a str),
}

impl<'a> Route<'a> {
    pub fn from_target(target: &'a str) -> Self {
        match target {
            "/yourproblem" => Route::YourProblem,
            "/myproblem" => Route::MyProblem,
            "/video" => Route::Video,
            t => match t.strip_prefix(HTTPBIN_PREFIX) {
                Some(rest) => Route::Httpbin(rest),
                None => Route::Index,
            },
        }
    }
}

pub struct DemoHandler {
    client: reqwest::Client,
    upstream: Url,
    video_path: PathBuf,
}

impl DemoHandler {
    pub fn new(cfg: &DemoConfig) -> anyhow::Result<Self> {
        let upstream = Url::parse(&cfg.upstream_url)
            .with_context(|| format!("invalid upstream URL {:?}", cfg.upstream_url))?;
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .context("failed to build upstream HTTP client")?;

        Ok(Self {
            client,
            upstream,
            video_path: cfg.video_path.clone(),
        })
    }

    /// Resolves `path` against the upstream base. Paths that would leave the
    /// base's origin (absolute URLs, `//host` references) yield `None`.
    pub fn upstream_url(&self, path: &str) -> Option<Url> {
        let url = self.upstream.join(path).ok()?;
        (url.origin() == self.upstream.origin()).then_some(url)
    }

    async fn serve_video<W>(&self, writer: &mut ResponseWriter<W>) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let video = match tokio::fs::read(&self.video_path).await {
            Ok(video) => video,
            Err(e) => {
                tracing::error!(path = %self.video_path.display(), error = %e, "failed to read video");
                return write_page(writer, StatusCode::InternalServerError).await;
            }
        };

        let mut headers = default_headers(video.len());
        headers.replace("content-type", "video/mp4");

        writer.write_status_line(StatusCode::Ok).await?;
        writer.write_headers(&headers).await?;
        writer.write_body(&video).await?;
        Ok(())
    }

    async fn proxy<W>(&self, path: &str, writer: &mut ResponseWriter<W>) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let url = match self.upstream_url(path) {
            Some(url) => url,
            None => {
                tracing::warn!(path, "refusing upstream path outside the configured origin");
                return write_page(writer, StatusCode::BadRequest).await;
            }
        };

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(%url, error = %e, "upstream request failed");
                return write_page(writer, StatusCode::InternalServerError).await;
            }
        };

        tracing::debug!(%url, status = response.status().as_u16(), "relaying upstream response");
        upstream::relay_chunked(response, writer).await
    }
}

impl Handler for DemoHandler {
    async fn handle<W>(
        &self,
        request: Request,
        writer: &mut ResponseWriter<W>,
    ) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match Route::from_target(request.target()) {
            Route::Index => write_page(writer, StatusCode::Ok).await,
            Route::YourProblem => write_page(writer, StatusCode::BadRequest).await,
            Route::MyProblem => write_page(writer, StatusCode::InternalServerError).await,
            Route::Video => self.serve_video(writer).await,
            Route::Httpbin(path) => self.proxy(path, writer).await,
        }
    }
}

/// HTML page for `status`.
pub fn page(status: StatusCode) -> String {
    let (title, heading, text) = match status {
        StatusCode::Ok => ("200 OK", "Success!", "Your request was handled."),
        StatusCode::BadRequest => (
            "400 Bad Request",
            "Bad Request",
            "The server could not understand your request.",
        ),
        StatusCode::InternalServerError => (
            "500 Internal Server Error",
            "Internal Server Error",
            "Something went wrong on our side.",
        ),
    };

    format!(
        "<html>\n  <head>\n    <title>{title}</title>\n  </head>\n  <body>\n    <h1>{heading}</h1>\n    <p>{text}</p>\n  </body>\n</html>\n"
    )
}

async fn write_page<W>(writer: &mut ResponseWriter<W>, status: StatusCode) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let body = page(status);
    let mut headers = default_headers(body.len());
    headers.replace("content-type", "text/html");

    writer.write_status_line(status).await?;
    writer.write_headers(&headers).await?;
    writer.write_body(body.as_bytes()).await?;
    Ok(())
}
