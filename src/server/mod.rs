//! Connection acceptance and the handler interface.

pub mod handler;
pub mod listener;

pub use handler::Handler;
pub use listener::Server;
