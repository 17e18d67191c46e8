//! Replica client
//!
//! How a coordinator talks to the other nodes of the cluster.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::Bytes;

use crate::error::{Result, RingError};
use crate::protocol::{
    read_response, write_request, Method, Request, Response, Status, PROXY_HEADER,
    PROXY_HEADER_VALUE, TIMESTAMP_HEADER,
};

use super::ReplicaValue;

/// Path of the single-key route
pub const ENTITY_PATH: &str = "/v0/entity";

/// Forwarded operations against one remote node
///
/// Each call either succeeds (an acknowledgement) or fails; the coordinator
/// counts both. Implementations must be safe to call from many threads.
pub trait ReplicaClient: Send + Sync + 'static {
    fn get(&self, node: &str, key: &[u8]) -> Result<ReplicaValue>;

    fn upsert(&self, node: &str, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()>;

    fn remove(&self, node: &str, key: &[u8]) -> Result<()>;
}

/// [`ReplicaClient`] speaking the node HTTP protocol
///
/// Opens one short-lived connection per call; `timeout` bounds connecting,
/// writing and reading alike.
#[derive(Debug, Clone)]
pub struct HttpReplicaClient {
    timeout: Duration,
}

impl HttpReplicaClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn call(&self, node: &str, request: Request) -> Result<Response> {
        let host = host_of(node)?;
        let addr = resolve(host)?;

        let stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.set_nodelay(true)?;

        let request = request
            .with_header(PROXY_HEADER, PROXY_HEADER_VALUE)
            .with_header("Connection", "close");

        let mut writer = BufWriter::new(stream.try_clone()?);
        write_request(&mut writer, &request, host)?;

        let mut reader = BufReader::new(stream);
        let response = read_response(&mut reader)?;
        tracing::trace!(node, status = response.status.code(), "Replica replied");
        Ok(response)
    }
}

impl ReplicaClient for HttpReplicaClient {
    fn get(&self, node: &str, key: &[u8]) -> Result<ReplicaValue> {
        let request = Request::new(Method::Get, ENTITY_PATH).with_param("id", key);
        let response = self.call(node, request)?;
        replica_value(&response)
    }

    fn upsert(&self, node: &str, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let mut request = Request::new(Method::Put, ENTITY_PATH)
            .with_param("id", key)
            .with_body(Bytes::copy_from_slice(value));
        if let Some(ttl) = ttl {
            request = request.with_param("ttl", ttl.as_millis().to_string());
        }
        expect_status(self.call(node, request)?, Status::Created)
    }

    fn remove(&self, node: &str, key: &[u8]) -> Result<()> {
        let request = Request::new(Method::Delete, ENTITY_PATH).with_param("id", key);
        expect_status(self.call(node, request)?, Status::Accepted)
    }
}

/// Decode a proxied read: 200 + timestamp is present, 404 + timestamp is
/// removed, 404 alone is absent
pub fn replica_value(response: &Response) -> Result<ReplicaValue> {
    let timestamp = response
        .header(TIMESTAMP_HEADER)
        .map(|ts| {
            ts.parse::<u64>()
                .map_err(|_| RingError::Protocol(format!("Bad {} header: {}", TIMESTAMP_HEADER, ts)))
        })
        .transpose()?;

    match (response.status, timestamp) {
        (Status::Ok, Some(timestamp)) => Ok(ReplicaValue::Present {
            timestamp,
            data: Bytes::copy_from_slice(response.body_bytes()),
        }),
        (Status::NotFound, Some(timestamp)) => Ok(ReplicaValue::Removed { timestamp }),
        (Status::NotFound, None) => Ok(ReplicaValue::Absent),
        (status, _) => Err(RingError::Network(format!(
            "Unexpected replica reply {}",
            status.code()
        ))),
    }
}

fn expect_status(response: Response, expected: Status) -> Result<()> {
    if response.status == expected {
        Ok(())
    } else {
        Err(RingError::Network(format!(
            "Replica replied {} instead of {}",
            response.status.code(),
            expected.code()
        )))
    }
}

/// `http://host:port[/...]` → `host:port`
fn host_of(node: &str) -> Result<&str> {
    let rest = node.strip_prefix("http://").unwrap_or(node);
    let host = rest.split('/').next().unwrap_or(rest);
    if host.is_empty() {
        return Err(RingError::Config(format!("Bad node URL: {}", node)));
    }
    Ok(host)
}

fn resolve(host: &str) -> Result<SocketAddr> {
    host.to_socket_addrs()?
        .next()
        .ok_or_else(|| RingError::Network(format!("{} did not resolve", host)))
}
