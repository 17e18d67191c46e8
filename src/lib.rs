//! # ringkv
//!
//! An LSM-tree key-value store replicated across a small cluster:
//! - Lock-free memtables flushed by a background worker
//! - Immutable, memory-mapped SSTables merged on every read
//! - Lazy TTL expiry, dropped for good at compaction
//! - Quorum replication (`ack/from`) with last-write-wins reads
//! - HTTP/1.1 interface
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Server                            │
//! │                  (Multiple Clients)                         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   Coordinator                               │
//! │        (fan-out to replicas, quorum tally, LWW merge)       │
//! └──────────┬──────────────────────────────┬───────────────────┘
//!            │ local                        │ X-OK-Proxy
//!            ▼                              ▼
//!   ┌─────────────────┐              ┌─────────────┐
//!   │     Engine      │              │ other nodes │
//!   └────────┬────────┘              └─────────────┘
//!            │
//!   ┌────────▼────────┐   flush queue   ┌──────────────┐
//!   │  MemTablePool   │ ──────────────▶ │ Flush worker │
//!   └─────────────────┘                 └──────┬───────┘
//!                                              ▼
//!                                       ┌─────────────┐
//!                                       │  SSTables   │
//!                                       └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod value;
pub mod table;
pub mod memtable;
pub mod storage;
pub mod engine;
pub mod cluster;
pub mod protocol;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RingError, Result};
pub use config::Config;
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ringkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
