//! Configuration for ringkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::cluster::ReplicaFactor;

/// Main configuration for a ringkv node
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── sstables/        (SSTable files)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Size of the active memtable (in bytes) above which it is flushed
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // Cluster Configuration
    // -------------------------------------------------------------------------
    /// URL under which the other nodes reach this one, e.g. `http://127.0.0.1:8080`
    pub advertise_url: String,

    /// URLs of every node in the cluster, this one included.
    /// Empty means a single-node cluster made of `advertise_url`.
    pub cluster_nodes: Vec<String>,

    /// Replica factor used when a request does not name one.
    /// `None` means a majority of all nodes.
    pub replica_factor: Option<ReplicaFactor>,

    /// How long the coordinator waits for replicas (milliseconds)
    pub replica_timeout_ms: u64,

    /// Threads serving replica calls on the coordinator
    pub worker_threads: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// HTTP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./ringkv_data"),
            memtable_size_limit: 4 * 1024 * 1024, // 4 MB
            advertise_url: "http://127.0.0.1:8080".to_string(),
            cluster_nodes: Vec::new(),
            replica_factor: None,
            replica_timeout_ms: 1000,
            worker_threads: 8,
            listen_addr: "127.0.0.1:8080".to_string(),
            max_connections: 1024,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Every node of the cluster, falling back to this node alone
    pub fn nodes(&self) -> Vec<String> {
        if self.cluster_nodes.is_empty() {
            vec![self.advertise_url.clone()]
        } else {
            self.cluster_nodes.clone()
        }
    }

    pub fn replica_timeout(&self) -> Duration {
        Duration::from_millis(self.replica_timeout_ms)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set the URL other nodes use to reach this one
    pub fn advertise_url(mut self, url: impl Into<String>) -> Self {
        self.config.advertise_url = url.into();
        self
    }

    /// Set the URLs of every cluster node
    pub fn cluster_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.cluster_nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the default replica factor
    pub fn replica_factor(mut self, factor: ReplicaFactor) -> Self {
        self.config.replica_factor = Some(factor);
        self
    }

    /// Set the replica timeout (in milliseconds)
    pub fn replica_timeout_ms(mut self, ms: u64) -> Self {
        self.config.replica_timeout_ms = ms;
        self
    }

    /// Set the number of coordinator worker threads
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    /// Set the HTTP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
