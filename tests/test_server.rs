use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use httpwire::config::ServerConfig;
use httpwire::http::request::Request;
use httpwire::http::response::{StatusCode, default_headers};
use httpwire::http::writer::ResponseWriter;
use httpwire::server::{Handler, Server};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Answers with `"<method> <target> <body length>"`.
#[derive(Default)]
struct Echo {
    calls: Arc<AtomicUsize>,
}

impl Handler for Echo {
    async fn handle<W>(&self, request: Request, writer: &mut ResponseWriter<W>) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let body = format!(
            "{} {} {}",
            request.method(),
            request.target(),
            request.body_bytes().len()
        );
        writer.write_status_line(StatusCode::Ok).await?;
        writer.write_headers(&default_headers(body.len())).await?;
        writer.write_body(body.as_bytes()).await?;
        Ok(())
    }
}

struct Failing;

impl Handler for Failing {
    async fn handle<W>(&self, _request: Request, _writer: &mut ResponseWriter<W>) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        anyhow::bail!("boom")
    }
}

fn local_config() -> ServerConfig {
    ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        ..ServerConfig::default()
    }
}

async fn roundtrip(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn test_serves_request_through_handler() {
    let server = Server::serve(&local_config(), Echo::default()).await.unwrap();
    assert!(server.is_running());

    let response = roundtrip(
        server.local_addr(),
        b"POST /submit HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200 OK \r\n"));
    assert!(response.contains("Content-Length: 14\r\n"));
    assert!(response.contains("Connection: close\r\n"));
    assert!(response.ends_with("\r\n\r\nPOST /submit 5"));

    server.close().await.unwrap();
}

#[tokio::test]
async fn test_malformed_request_gets_400_without_handler() {
    let echo = Echo::default();
    let calls = Arc::clone(&echo.calls);
    let server = Server::serve(&local_config(), echo).await.unwrap();

    let response = roundtrip(server.local_addr(), b"GET / HTTP/1.0\r\n").await;

    assert!(response.starts_with("HTTP/1.1 400 Bad Request \r\n"));
    assert!(response.contains("Content-Length: 0\r\n"));
    assert!(response.ends_with("\r\n\r\n"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    server.close().await.unwrap();
}

#[tokio::test]
async fn test_invalid_header_gets_400() {
    let server = Server::serve(&local_config(), Echo::default()).await.unwrap();

    let response = roundtrip(server.local_addr(), b"GET / HTTP/1.1\r\nX Header: v\r\n").await;

    assert!(response.starts_with("HTTP/1.1 400 Bad Request \r\n"));

    server.close().await.unwrap();
}

#[tokio::test]
async fn test_truncated_body_gets_400() {
    let echo = Echo::default();
    let calls = Arc::clone(&echo.calls);
    let server = Server::serve(&local_config(), echo).await.unwrap();

    let response = roundtrip(
        server.local_addr(),
        b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nab",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 400 Bad Request \r\n"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    server.close().await.unwrap();
}

#[tokio::test]
async fn test_failing_handler_gets_500() {
    let server = Server::serve(&local_config(), Failing).await.unwrap();

    let response = roundtrip(server.local_addr(), b"GET / HTTP/1.1\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error \r\n"));
    assert!(response.contains("Content-Length: 4\r\n"));
    assert!(response.ends_with("\r\n\r\nboom"));

    server.close().await.unwrap();
}

#[tokio::test]
async fn test_empty_connection_is_closed_quietly() {
    let echo = Echo::default();
    let calls = Arc::clone(&echo.calls);
    let server = Server::serve(&local_config(), echo).await.unwrap();

    let response = roundtrip(server.local_addr(), b"").await;
    assert!(response.is_empty());

    let response = roundtrip(server.local_addr(), b"GET /after HTTP/1.1\r\n\r\n").await;
    assert!(response.ends_with("GET /after 0"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    server.close().await.unwrap();
}

#[tokio::test]
async fn test_connections_are_served_concurrently() {
    let server = Server::serve(&local_config(), Echo::default()).await.unwrap();
    let addr = server.local_addr();

    // Holds its connection open with half a request line.
    let mut stalled = TcpStream::connect(addr).await.unwrap();
    stalled.write_all(b"GET /slow HT").await.unwrap();

    let response = roundtrip(addr, b"GET /fast HTTP/1.1\r\n\r\n").await;
    assert!(response.ends_with("GET /fast 0"));

    stalled.write_all(b"TP/1.1\r\n\r\n").await.unwrap();
    stalled.shutdown().await.unwrap();
    let mut out = Vec::new();
    stalled.read_to_end(&mut out).await.unwrap();
    assert!(String::from_utf8(out).unwrap().ends_with("GET /slow 0"));

    server.close().await.unwrap();
}

#[tokio::test]
async fn test_close_stops_accepting() {
    let server = Server::serve(&local_config(), Echo::default()).await.unwrap();
    let addr = server.local_addr();

    server.close().await.unwrap();

    assert!(TcpStream::connect(addr).await.is_err());
}
