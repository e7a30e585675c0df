//! TCP Server
//!
//! Accepts connections and serves each one on its own thread.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::node::Node;

use super::Connection;

/// How long the accept loop sleeps when no connection is waiting
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// TCP server for a shardkv node
pub struct Server {
    listener: TcpListener,
    max_connections: usize,
    read_timeout_ms: u64,
    write_timeout_ms: u64,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Bind the configured listen address
    ///
    /// Binding is separate from serving so callers can learn the real port
    /// (e.g. when listening on port 0) before the node is built.
    pub fn bind(config: &Config) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;

        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            max_connections: config.max_connections.max(1),
            read_timeout_ms: config.read_timeout_ms,
            write_timeout_ms: config.write_timeout_ms,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Flag that stops the server when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Open connections right now
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Accept and serve connections until shutdown (blocking)
    pub fn run(&self, node: Arc<Node>) -> Result<()> {
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => self.dispatch(stream, addr, &node),
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
        tracing::info!("Server on {:?} stopped accepting", self.listener.local_addr().ok());
        Ok(())
    }

    fn dispatch(&self, stream: TcpStream, addr: SocketAddr, node: &Arc<Node>) {
        if self.active.load(Ordering::Relaxed) >= self.max_connections {
            tracing::warn!("Rejecting {}: {} connections open", addr, self.max_connections);
            return;
        }

        // Accepted sockets inherit non-blocking mode on some platforms
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Failed to configure connection from {}: {}", addr, e);
            return;
        }

        let mut connection = match Connection::new(stream, Arc::clone(node), self.shutdown_handle()) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Failed to set up connection from {}: {}", addr, e);
                return;
            }
        };
        if let Err(e) = connection.set_timeouts(self.read_timeout_ms, self.write_timeout_ms) {
            tracing::warn!("Failed to set timeouts for {}: {}", addr, e);
            return;
        }

        let active = Arc::clone(&self.active);
        active.fetch_add(1, Ordering::Relaxed);
        let spawned = thread::Builder::new()
            .name(format!("conn-{}", addr))
            .spawn(move || {
                if let Err(e) = connection.handle() {
                    tracing::debug!("Connection {} ended with error: {}", connection.peer_addr(), e);
                }
                active.fetch_sub(1, Ordering::Relaxed);
            });

        if let Err(e) = spawned {
            tracing::warn!("Failed to spawn handler for {}: {}", addr, e);
            self.active.fetch_sub(1, Ordering::Relaxed);
        }
    }
}
