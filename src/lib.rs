//! httpwire - HTTP/1.1 from raw TCP
//!
//! Incremental request parsing, response serialization (including chunked
//! bodies with trailers) and a concurrent accept loop, without an HTTP library.

pub mod config;
pub mod demo;
pub mod http;
pub mod server;
