//! Coordinator
//!
//! Runs one client operation against every replica of its key.
//!
//! ## Flow
//! 1. Resolve the replica set from the topology
//! 2. Dispatch one task per replica on the worker pool: the local replica
//!    goes straight to the engine, the others through the [`ReplicaClient`]
//! 3. Tally answers as they arrive and return as soon as the outcome is
//!    certain, or when the replica timeout runs out
//!
//! Replicas that answer after the decision keep running; their results land
//! in a channel nobody reads any more.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam::channel::bounded;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{Result, RingError};
use crate::network::WorkerPool;
use crate::value::wall_clock_nanos;

use super::{
    HttpReplicaClient, ReplicaClient, ReplicaFactor, ReplicaValue, Tally, TallyState, Topology,
};

/// Where one replica call goes
#[derive(Debug, Clone)]
enum Target {
    Local,
    Remote(String),
}

/// Everything a replica task needs, shared by all tasks of the coordinator
struct Replicas {
    engine: Arc<Engine>,
    client: Arc<dyn ReplicaClient>,
}

pub struct Coordinator {
    replicas: Arc<Replicas>,
    topology: Topology,
    default_factor: ReplicaFactor,
    timeout: Duration,
    workers: WorkerPool,
}

impl Coordinator {
    /// Coordinator talking to the other nodes over HTTP
    pub fn open(engine: Arc<Engine>, config: &Config) -> Result<Self> {
        let topology = Topology::new(config.nodes(), config.advertise_url.clone())?;
        let client = Arc::new(HttpReplicaClient::new(config.replica_timeout()));
        Self::new(engine, topology, client, config)
    }

    pub fn new(
        engine: Arc<Engine>,
        topology: Topology,
        client: Arc<dyn ReplicaClient>,
        config: &Config,
    ) -> Result<Self> {
        let default_factor = config
            .replica_factor
            .unwrap_or_else(|| ReplicaFactor::majority(topology.len()));
        default_factor.validate(topology.len())?;

        let workers = WorkerPool::new("ringkv-replica", config.worker_threads)?;

        tracing::info!(
            me = topology.me(),
            nodes = topology.len(),
            replicas = %default_factor,
            "Coordinator ready"
        );

        Ok(Self {
            replicas: Arc::new(Replicas { engine, client }),
            topology,
            default_factor,
            timeout: config.replica_timeout(),
            workers,
        })
    }

    /// Parse and validate a requested factor, or fall back to the default
    pub fn factor(&self, requested: Option<&str>) -> Result<ReplicaFactor> {
        let factor = match requested {
            Some(requested) => requested.parse()?,
            None => self.default_factor,
        };
        factor.validate(self.topology.len())?;
        Ok(factor)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.replicas.engine
    }

    // =========================================================================
    // Replicated operations
    // =========================================================================

    /// Read `key` from `factor.from()` replicas; last write wins
    pub fn get(&self, key: &[u8], factor: ReplicaFactor) -> Result<Option<Bytes>> {
        let owned = Bytes::copy_from_slice(key);
        let replies = self.replicate(key, factor, move |replicas, target| match target {
            Target::Local => replicas.local_get(&owned),
            Target::Remote(node) => replicas.client.get(node, &owned),
        })?;
        Ok(ReplicaValue::merge(replies).into_data())
    }

    /// Write `key` to `factor.from()` replicas
    pub fn upsert(
        &self,
        key: &[u8],
        value: &[u8],
        ttl: Option<Duration>,
        factor: ReplicaFactor,
    ) -> Result<()> {
        let owned = Bytes::copy_from_slice(key);
        let value = Bytes::copy_from_slice(value);
        self.replicate(key, factor, move |replicas, target| match target {
            Target::Local => replicas.local_upsert(&owned, &value, ttl),
            Target::Remote(node) => replicas.client.upsert(node, &owned, &value, ttl),
        })?;
        Ok(())
    }

    /// Delete `key` on `factor.from()` replicas
    pub fn remove(&self, key: &[u8], factor: ReplicaFactor) -> Result<()> {
        let owned = Bytes::copy_from_slice(key);
        self.replicate(key, factor, move |replicas, target| match target {
            Target::Local => replicas.local_remove(&owned),
            Target::Remote(node) => replicas.client.remove(node, &owned),
        })?;
        Ok(())
    }

    // =========================================================================
    // Local operations (serving proxied requests)
    // =========================================================================

    pub fn local_get(&self, key: &[u8]) -> Result<ReplicaValue> {
        self.replicas.local_get(key)
    }

    pub fn local_upsert(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.replicas.local_upsert(key, value, ttl)
    }

    pub fn local_remove(&self, key: &[u8]) -> Result<()> {
        self.replicas.local_remove(key)
    }

    // =========================================================================
    // Fan-out
    // =========================================================================

    /// Run `call` against every replica of `key` and collect the acks
    fn replicate<T, F>(&self, key: &[u8], factor: ReplicaFactor, call: F) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(&Replicas, &Target) -> Result<T> + Send + Sync + 'static,
    {
        let deadline = Instant::now() + self.timeout;
        let targets: Vec<Target> = self
            .topology
            .replicas_for(key, factor.from())?
            .into_iter()
            .map(|node| {
                if self.topology.is_me(node) {
                    Target::Local
                } else {
                    Target::Remote(node.to_string())
                }
            })
            .collect();

        // Room for every answer, so late replicas never block on send
        let (tx, rx) = bounded(targets.len());
        let call = Arc::new(call);

        for target in targets {
            let reply = tx.clone();
            let call = Arc::clone(&call);
            let replicas = Arc::clone(&self.replicas);
            let submitted = self.workers.execute(move || {
                let result = call(&replicas, &target);
                if let Err(e) = &result {
                    tracing::warn!(replica = ?target, error = %e, "Replica call failed");
                }
                let _ = reply.send(result);
            });
            if let Err(e) = submitted {
                let _ = tx.send(Err(e));
            }
        }
        drop(tx);

        let mut tally = Tally::new(factor);
        let mut replies = Vec::with_capacity(factor.from());
        loop {
            match tally.state() {
                TallyState::Reached => return Ok(replies),
                TallyState::Failed => break,
                TallyState::Pending => {}
            }

            match rx.recv_deadline(deadline) {
                Ok(Ok(reply)) => {
                    replies.push(reply);
                    tally.ack();
                }
                Ok(Err(_)) => {
                    tally.fail();
                }
                Err(_) => {
                    tracing::warn!(
                        acks = tally.acks(),
                        outstanding = tally.outstanding(),
                        "Replicas timed out"
                    );
                    break;
                }
            }
        }

        Err(RingError::QuorumNotReached {
            acks: tally.acks(),
            required: tally.required(),
        })
    }
}

impl Replicas {
    fn local_get(&self, key: &[u8]) -> Result<ReplicaValue> {
        let stored = self.engine.latest(key)?;
        Ok(ReplicaValue::from_stored(stored, wall_clock_nanos()))
    }

    fn local_upsert(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        match ttl {
            Some(ttl) => self.engine.upsert_with_ttl(key, value, ttl),
            None => self.engine.upsert(key, value),
        }
    }

    fn local_remove(&self, key: &[u8]) -> Result<()> {
        self.engine.remove(key)
    }
}
