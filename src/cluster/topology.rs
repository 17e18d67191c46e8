//! Topology
//!
//! Maps keys to the nodes that store them.
//!
//! Nodes are kept sorted so every node computes the same placement. A key's
//! primary is `crc32(key) mod N`; its replicas are the primary and the nodes
//! that follow it, wrapping around.

use crate::error::{Result, RingError};

#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<String>,
    me: String,
}

impl Topology {
    /// `nodes` must contain `me`; duplicates are ignored
    pub fn new<I, S>(nodes: I, me: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let me = me.into();
        let mut nodes: Vec<String> = nodes.into_iter().map(Into::into).collect();
        nodes.sort();
        nodes.dedup();

        if !nodes.contains(&me) {
            return Err(RingError::Config(format!("{} is not one of the cluster nodes", me)));
        }
        Ok(Self { nodes, me })
    }

    pub fn is_me(&self, node: &str) -> bool {
        self.me == node
    }

    pub fn me(&self) -> &str {
        &self.me
    }

    /// Every node, sorted
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node owning `key`
    pub fn primary_for(&self, key: &[u8]) -> &str {
        &self.nodes[self.primary_index(key)]
    }

    /// The `count` nodes storing `key`, primary first
    pub fn replicas_for(&self, key: &[u8], count: usize) -> Result<Vec<&str>> {
        if count > self.nodes.len() {
            return Err(RingError::InvalidReplicaFactor(format!(
                "{} replicas requested from {} nodes",
                count,
                self.nodes.len()
            )));
        }

        let start = self.primary_index(key);
        Ok((0..count)
            .map(|i| self.nodes[(start + i) % self.nodes.len()].as_str())
            .collect())
    }

    fn primary_index(&self, key: &[u8]) -> usize {
        crc32fast::hash(key) as usize % self.nodes.len()
    }
}
