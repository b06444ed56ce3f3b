use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use httpwire::config::{DemoConfig, ServerConfig};
use httpwire::demo::upstream::chunked_headers;
use httpwire::demo::{DemoHandler, Route, page};
use httpwire::http::parser::RequestParser;
use httpwire::http::request::Request;
use httpwire::http::response::{StatusCode, default_headers};
use httpwire::http::writer::ResponseWriter;
use httpwire::server::{Handler, Server};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWrite;

const UPSTREAM_BODY: &str = "{\"slideshow\": {\"title\": \"Sample\"}}";

/// Stands in for httpbin: answers every request with a fixed JSON body.
struct FixedUpstream;

impl Handler for FixedUpstream {
    async fn handle<W>(&self, _request: Request, writer: &mut ResponseWriter<W>) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut headers = default_headers(UPSTREAM_BODY.len());
        headers.replace("content-type", "application/json");
        writer.write_status_line(StatusCode::Ok).await?;
        writer.write_headers(&headers).await?;
        writer.write_body(UPSTREAM_BODY.as_bytes()).await?;
        Ok(())
    }
}

/// Counts the requests that reach it and answers each with an empty 200.
#[derive(Clone, Default)]
struct CountingUpstream(Arc<AtomicUsize>);

impl Handler for CountingUpstream {
    async fn handle<W>(&self, _request: Request, writer: &mut ResponseWriter<W>) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.0.fetch_add(1, Ordering::SeqCst);
        writer.write_status_line(StatusCode::Ok).await?;
        writer.write_headers(&default_headers(0)).await?;
        Ok(())
    }
}

fn get(target: &str) -> Request {
    let mut parser = RequestParser::new();
    parser
        .feed(format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes())
        .unwrap();
    parser.into_request().unwrap()
}

async fn serve(handler: &DemoHandler, target: &str) -> String {
    let mut writer = ResponseWriter::new(Vec::new());
    handler.handle(get(target), &mut writer).await.unwrap();
    String::from_utf8_lossy(&writer.into_inner()).into_owned()
}

/// Concatenates the chunk payloads of a chunked body and returns them with
/// whatever follows the zero-length chunk.
fn decode_chunked(mut body: &str) -> (String, &str) {
    let mut data = String::new();
    loop {
        let (size, rest) = body.split_once("\r\n").unwrap();
        let size = usize::from_str_radix(size, 16).unwrap();
        if size == 0 {
            return (data, rest);
        }
        data.push_str(&rest[..size]);
        body = &rest[size + 2..];
    }
}

#[test]
fn test_routes() {
    assert_eq!(Route::from_target("/"), Route::Index);
    assert_eq!(Route::from_target("/anything"), Route::Index);
    assert_eq!(Route::from_target("/yourproblem"), Route::YourProblem);
    assert_eq!(Route::from_target("/myproblem"), Route::MyProblem);
    assert_eq!(Route::from_target("/video"), Route::Video);
    assert_eq!(Route::from_target("/httpbin/stream/10"), Route::Httpbin("stream/10"));
    assert_eq!(Route::from_target("/httpbin"), Route::Index);
}

#[test]
fn test_pages_have_titles() {
    assert!(page(StatusCode::Ok).contains("<title>200 OK</title>"));
    assert!(page(StatusCode::BadRequest).contains("<title>400 Bad Request</title>"));
    assert!(page(StatusCode::InternalServerError).contains("<title>500 Internal Server Error</title>"));
}

#[test]
fn test_chunked_headers() {
    let headers = chunked_headers();

    assert!(!headers.contains("content-length"));
    assert_eq!(headers.get("transfer-encoding"), Some("chunked"));
    assert_eq!(
        headers.get("trailer"),
        Some("X-Content-SHA256, X-Content-Length")
    );
}

#[tokio::test]
async fn test_static_pages() {
    let handler = DemoHandler::new(&DemoConfig::default()).unwrap();

    let ok = serve(&handler, "/").await;
    assert!(ok.starts_with("HTTP/1.1 200 OK \r\n"));
    assert!(ok.contains("Content-Type: text/html\r\n"));
    assert!(ok.ends_with(&page(StatusCode::Ok)));
    assert!(ok.contains(&format!("Content-Length: {}\r\n", page(StatusCode::Ok).len())));

    let bad = serve(&handler, "/yourproblem").await;
    assert!(bad.starts_with("HTTP/1.1 400 Bad Request \r\n"));

    let err = serve(&handler, "/myproblem").await;
    assert!(err.starts_with("HTTP/1.1 500 Internal Server Error \r\n"));
}

#[tokio::test]
async fn test_video_served_from_file() {
    let path = std::env::temp_dir().join(format!("httpwire-video-{}.mp4", std::process::id()));
    std::fs::write(&path, b"\x00\x00\x00\x18ftypmp42").unwrap();

    let handler = DemoHandler::new(&DemoConfig {
        video_path: path.clone(),
        ..DemoConfig::default()
    })
    .unwrap();
    let response = serve(&handler, "/video").await;
    std::fs::remove_file(&path).unwrap();

    assert!(response.starts_with("HTTP/1.1 200 OK \r\n"));
    assert!(response.contains("Content-Type: video/mp4\r\n"));
    assert!(response.contains("Content-Length: 12\r\n"));
    assert!(response.ends_with("ftypmp42"));
}

#[tokio::test]
async fn test_missing_video_is_500() {
    let handler = DemoHandler::new(&DemoConfig {
        video_path: std::env::temp_dir().join("httpwire-no-such-video.mp4"),
        ..DemoConfig::default()
    })
    .unwrap();

    let response = serve(&handler, "/video").await;

    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error \r\n"));
}

#[tokio::test]
async fn test_httpbin_relays_chunked_with_trailers() {
    let upstream = Server::serve(
        &ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        },
        FixedUpstream,
    )
    .await
    .unwrap();

    let handler = DemoHandler::new(&DemoConfig {
        upstream_url: format!("http://{}/", upstream.local_addr()),
        ..DemoConfig::default()
    })
    .unwrap();

    let response = serve(&handler, "/httpbin/json").await;
    upstream.close().await.unwrap();

    let (head, body) = response.split_once("\r\n\r\n").unwrap();
    assert!(head.starts_with("HTTP/1.1 200 OK \r\n"));
    assert!(head.contains("Transfer-Encoding: chunked"));
    assert!(head.contains("Trailer: X-Content-SHA256, X-Content-Length"));
    assert!(!head.contains("Content-Length"));

    let (data, trailers) = decode_chunked(body);
    assert_eq!(data, UPSTREAM_BODY);

    let digest = format!("{:x}", Sha256::digest(UPSTREAM_BODY.as_bytes()));
    assert_eq!(
        trailers,
        format!(
            "X-Content-SHA256: {digest}\r\nX-Content-Length: {}\r\n\r\n",
            UPSTREAM_BODY.len()
        )
    );
}

#[tokio::test]
async fn test_httpbin_unreachable_upstream_is_500() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let handler = DemoHandler::new(&DemoConfig {
        upstream_url: format!("http://{addr}/"),
        ..DemoConfig::default()
    })
    .unwrap();

    let response = serve(&handler, "/httpbin/get").await;

    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error \r\n"));
}

#[test]
fn test_upstream_url_stays_on_configured_origin() {
    let handler = DemoHandler::new(&DemoConfig::default()).unwrap();

    assert_eq!(
        handler.upstream_url("stream/10").unwrap().as_str(),
        "https://httpbin.org/stream/10"
    );
    assert!(handler.upstream_url("http://169.254.169.254/latest/meta-data").is_none());
    assert!(handler.upstream_url("//169.254.169.254/latest").is_none());
    assert!(handler.upstream_url("https://httpbin.org:8443/get").is_none());
}

#[tokio::test]
async fn test_httpbin_refuses_foreign_hosts() {
    let other = CountingUpstream::default();
    let hits = other.0.clone();
    let server = Server::serve(
        &ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        },
        other,
    )
    .await
    .unwrap();
    let other_addr = server.local_addr();

    let handler = DemoHandler::new(&DemoConfig::default()).unwrap();
    let absolute = serve(&handler, &format!("/httpbin/http://{other_addr}/get")).await;
    let scheme_relative = serve(&handler, &format!("/httpbin///{other_addr}/get")).await;
    server.close().await.unwrap();

    assert!(absolute.starts_with("HTTP/1.1 400 Bad Request \r\n"));
    assert!(scheme_relative.starts_with("HTTP/1.1 400 Bad Request \r\n"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
