//! HTTP Server
//!
//! Accepts connections and dispatches them to worker threads.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::cluster::Coordinator;
use crate::config::Config;
use crate::error::{Result, RingError};

use super::{Connection, Handler, WorkerPool};

/// How long the accept loop sleeps when no connection is waiting
const ACCEPT_POLL: Duration = Duration::from_millis(5);

/// HTTP server for one ringkv node
pub struct Server {
    listener: TcpListener,
    handler: Arc<Handler>,
    /// One thread per concurrently served connection
    connections: WorkerPool,
    shutdown: Arc<AtomicBool>,
    read_timeout_ms: u64,
    write_timeout_ms: u64,
}

impl Server {
    /// Bind to `config.listen_addr`
    pub fn bind(config: &Config, coordinator: Arc<Coordinator>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        Self::with_listener(listener, config, coordinator)
    }

    /// Serve on an already bound listener
    pub fn with_listener(
        listener: TcpListener,
        config: &Config,
        coordinator: Arc<Coordinator>,
    ) -> Result<Self> {
        listener.set_nonblocking(true)?;
        let connections = WorkerPool::new("ringkv-conn", config.max_connections)?;

        Ok(Self {
            listener,
            handler: Arc::new(Handler::new(coordinator)),
            connections,
            shutdown: Arc::new(AtomicBool::new(false)),
            read_timeout_ms: config.read_timeout_ms,
            write_timeout_ms: config.write_timeout_ms,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle that stops [`Server::run`] from another thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// Accept connections until shut down (blocking)
    pub fn run(&self) -> Result<()> {
        tracing::info!("Listening on {}", self.local_addr()?);

        while !self.shutdown.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false)?;
                    let handler = Arc::clone(&self.handler);
                    let (read_ms, write_ms) = (self.read_timeout_ms, self.write_timeout_ms);

                    self.connections.execute(move || {
                        let result = Connection::new(stream, handler).and_then(|mut connection| {
                            connection.set_timeouts(read_ms, write_ms)?;
                            connection.handle()
                        });
                        if let Err(e) = result {
                            tracing::debug!("Connection {} ended with error: {}", peer, e);
                        }
                    })?;
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }

        tracing::info!("Server stopped accepting connections");
        Ok(())
    }

    /// Run on a background thread
    pub fn spawn(self) -> Result<ServerHandle> {
        let addr = self.local_addr()?;
        let shutdown = self.shutdown_handle();
        let thread = thread::Builder::new()
            .name("ringkv-accept".to_string())
            .spawn(move || self.run())?;

        Ok(ServerHandle {
            addr,
            shutdown,
            thread: Some(thread),
        })
    }
}

/// Stops a running server
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A server running on its own thread; stopped on drop
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    thread: Option<JoinHandle<Result<()>>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL of the server, e.g. `http://127.0.0.1:8080`
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting, wait for open connections to finish
    pub fn stop(&mut self) -> Result<()> {
        self.shutdown.shutdown();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| RingError::Network("accept thread panicked".to_string()))?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Server did not stop cleanly: {}", e);
        }
    }
}
