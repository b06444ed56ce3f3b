//! HTTP/1.1 protocol implementation over raw byte streams.
//!
//! # Architecture
//!
//! - **`headers`**: Case-insensitive header map with line-by-line parsing
//! - **`request`**: The parsed request representation
//! - **`parser`**: Incremental request parser and the async read loop
//! - **`response`**: Status codes and default response headers
//! - **`writer`**: Serializes responses, including chunked bodies with trailers
//! - **`connection`**: Per-connection parse → handle → write pipeline
//!
//! # Connection State Machine
//!
//! Every connection serves exactly one request:
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Feed bytes to the parser until a request is complete
//!        └──────┬──────┘
//!               ├─ Parse error ──▶ Rejecting (400 Bad Request) ─┐
//!               ├─ Empty close ─────────────────────────────────┤
//!               │ Request complete                              │
//!               ▼                                               │
//!        ┌──────────────────┐                                   │
//!        │   Processing     │ ← Handler writes the response     │
//!        └──────┬───────────┘                                   │
//!               ▼                                               │
//!        ┌──────────────────┐                                   │
//!        │     Closed       │ ◀─────────────────────────────────┘
//!        └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use httpwire::http::parser::{read_request, ParseLimits};
//! use httpwire::http::response::{default_headers, StatusCode};
//! use httpwire::http::writer::ResponseWriter;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:42069").await?;
//!     let (mut socket, _addr) = listener.accept().await?;
//!
//!     let request = read_request(&mut socket, &ParseLimits::default()).await?;
//!     println!("{:?}", request);
//!
//!     let mut writer = ResponseWriter::new(&mut socket);
//!     writer.write_status_line(StatusCode::Ok).await?;
//!     writer.write_headers(&default_headers(2)).await?;
//!     writer.write_body(b"hi").await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
