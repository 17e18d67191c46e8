//! Network Module
//!
//! HTTP server and connection handling.
//!
//! ## Architecture
//! - Single acceptor thread polling a non-blocking listener
//! - Worker thread pool for connections
//! - Requests routed through the [`Handler`] to the cluster coordinator

mod connection;
mod handler;
mod pool;
mod server;

pub use connection::Connection;
pub use handler::{Handler, ENTITIES_PATH, STATUS_PATH};
pub use pool::WorkerPool;
pub use server::{Server, ServerHandle, ShutdownHandle};
