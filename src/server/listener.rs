use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ServerConfig;
use crate::http::connection::Connection;
use crate::http::parser::ParseLimits;
use crate::server::handler::Handler;

/// A running server: a listening socket plus the task accepting on it.
///
/// Each accepted connection gets its own task. [`Server::close`] stops
/// accepting; connections already being served run to completion.
pub struct Server {
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    local_addr: SocketAddr,
    accept_task: Option<JoinHandle<()>>,
}

impl Server {
    /// Binds `cfg.listen_addr` and starts accepting connections.
    pub async fn serve<H: Handler>(cfg: &ServerConfig, handler: H) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&cfg.listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", cfg.listen_addr))?;
        Self::from_listener(listener, cfg.parse_limits(), handler)
    }

    /// Starts accepting on an already bound listener.
    pub fn from_listener<H: Handler>(
        listener: TcpListener,
        limits: ParseLimits,
        handler: H,
    ) -> anyhow::Result<Self> {
        let local_addr = listener.local_addr()?;
        let running = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(Notify::new());

        info!("Listening on {}", local_addr);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&running),
            Arc::clone(&shutdown),
            Arc::new(handler),
            limits,
        ));

        Ok(Self {
            running,
            shutdown,
            local_addr,
            accept_task: Some(accept_task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops accepting and closes the listener.
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.stop();
        if let Some(task) = self.accept_task.take() {
            task.await.context("accept loop panicked")?;
        }
        info!("Server on {} closed", self.local_addr);
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.shutdown.notify_one();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.accept_task.is_some() {
            self.stop();
        }
    }
}

async fn accept_loop<H: Handler>(
    listener: TcpListener,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    handler: Arc<H>,
    limits: ParseLimits,
) {
    while running.load(Ordering::Acquire) {
        tokio::select! {
            _ = shutdown.notified() => break,

            accepted = listener.accept() => {
                let (socket, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        if !running.load(Ordering::Acquire) {
                            break;
                        }
                        tracing::warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                tracing::debug!("Accepted connection from {}", peer);

                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    Connection::new(socket, peer, limits).run(handler.as_ref()).await;
                });
            }
        }
    }
    // `listener` is dropped here, closing the socket.
}
