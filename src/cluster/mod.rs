//! Cluster Module
//!
//! Quorum replication across a fixed set of nodes.
//!
//! ## Responsibilities
//! - Place keys on nodes (hash of the key, then consecutive nodes)
//! - Parse and validate `ack/from` replica factors
//! - Fan operations out to replicas and decide on partial acknowledgement
//! - Reconcile replica reads by last write wins
//!
//! There is no read repair, hinted handoff or rebalancing: a replica that
//! missed a write stays stale until it is overwritten.

mod client;
mod coordinator;
mod replicas;
mod tally;
mod topology;
mod value;

pub use client::{replica_value, HttpReplicaClient, ReplicaClient, ENTITY_PATH};
pub use coordinator::Coordinator;
pub use replicas::ReplicaFactor;
pub use tally::{Tally, TallyState};
pub use topology::Topology;
pub use value::ReplicaValue;
