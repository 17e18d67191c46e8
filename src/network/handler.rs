//! Request Handler
//!
//! Routes HTTP requests to the coordinator or the local engine.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};

use crate::cluster::{Coordinator, ReplicaValue, ENTITY_PATH};
use crate::error::RingError;
use crate::protocol::{Method, Request, Response, Status, TIMESTAMP_HEADER};

pub const STATUS_PATH: &str = "/v0/status";
pub const ENTITIES_PATH: &str = "/v0/entities";

/// Maps requests to responses
pub struct Handler {
    coordinator: Arc<Coordinator>,
}

impl Handler {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    pub fn handle(&self, request: Request) -> Response {
        match request.path.as_str() {
            STATUS_PATH => Response::new(Status::Ok),
            ENTITY_PATH => self.entity(&request),
            ENTITIES_PATH => self.entities(&request),
            _ => Response::error(Status::BadRequest, "Unknown path"),
        }
    }

    /// `/v0/entity`: single-key operations
    fn entity(&self, request: &Request) -> Response {
        let key = match request.param("id") {
            Some(id) if !id.is_empty() => id,
            _ => return Response::error(Status::BadRequest, "No id"),
        };
        let ttl = match ttl_param(request) {
            Ok(ttl) => ttl,
            Err(response) => return response,
        };

        if request.is_proxied() {
            return self.local(request, key, ttl);
        }

        let requested = match request.param("replicas").map(std::str::from_utf8) {
            None => None,
            Some(Ok(requested)) => Some(requested),
            Some(Err(_)) => return Response::error(Status::BadRequest, "Bad replicas"),
        };
        let factor = match self.coordinator.factor(requested) {
            Ok(factor) => factor,
            Err(e) => return error_response(&e),
        };

        let result = match request.method {
            Method::Get => self.coordinator.get(key, factor).map(|value| match value {
                Some(value) => Response::ok(value),
                None => Response::new(Status::NotFound),
            }),
            Method::Put => self
                .coordinator
                .upsert(key, &request.body, ttl, factor)
                .map(|()| Response::new(Status::Created)),
            Method::Delete => self
                .coordinator
                .remove(key, factor)
                .map(|()| Response::new(Status::Accepted)),
            Method::Other(_) => return Response::error(Status::MethodNotAllowed, "Wrong method"),
        };

        result.unwrap_or_else(|e| error_response(&e))
    }

    /// A coordinator forwarded this request: serve it from the local engine
    fn local(&self, request: &Request, key: &[u8], ttl: Option<Duration>) -> Response {
        let result = match request.method {
            Method::Get => self.coordinator.local_get(key).map(replica_response),
            Method::Put => self
                .coordinator
                .local_upsert(key, &request.body, ttl)
                .map(|()| Response::new(Status::Created)),
            Method::Delete => self
                .coordinator
                .local_remove(key)
                .map(|()| Response::new(Status::Accepted)),
            Method::Other(_) => return Response::error(Status::MethodNotAllowed, "Wrong method"),
        };

        result.unwrap_or_else(|e| error_response(&e))
    }

    /// `/v0/entities`: stream this node's live records in `[start, end)`
    fn entities(&self, request: &Request) -> Response {
        if request.method != Method::Get {
            return Response::error(Status::MethodNotAllowed, "Wrong method");
        }
        let start = match request.param("start") {
            Some(start) if !start.is_empty() => start,
            _ => return Response::error(Status::BadRequest, "No start"),
        };
        let end = request.param("end");
        if end.map_or(false, <[u8]>::is_empty) {
            return Response::error(Status::BadRequest, "Empty end");
        }

        match self.coordinator.engine().range(start, end) {
            Ok(records) => Response::stream(records.map(|(key, value)| record(&key, &value))),
            Err(e) => error_response(&e),
        }
    }
}

/// Optional `ttl` query parameter, in milliseconds
fn ttl_param(request: &Request) -> Result<Option<Duration>, Response> {
    match request.param("ttl") {
        None => Ok(None),
        Some(raw) => std::str::from_utf8(raw)
            .ok()
            .and_then(|ms| ms.parse::<u64>().ok())
            .map(|ms| Some(Duration::from_millis(ms)))
            .ok_or_else(|| Response::error(Status::BadRequest, "Bad ttl")),
    }
}

/// Reply to a proxied read; the timestamp lets the coordinator merge
fn replica_response(value: ReplicaValue) -> Response {
    match value {
        ReplicaValue::Present { timestamp, data } => {
            Response::ok(data).with_header(TIMESTAMP_HEADER, timestamp.to_string())
        }
        ReplicaValue::Removed { timestamp } => {
            Response::new(Status::NotFound).with_header(TIMESTAMP_HEADER, timestamp.to_string())
        }
        ReplicaValue::Absent => Response::new(Status::NotFound),
    }
}

fn error_response(error: &RingError) -> Response {
    match error {
        RingError::QuorumNotReached { .. } => {
            Response::error(Status::GatewayTimeout, &error.to_string())
        }
        RingError::InvalidReplicaFactor(_) => {
            Response::error(Status::BadRequest, &error.to_string())
        }
        _ => {
            tracing::error!(error = %error, "Request failed");
            Response::error(Status::InternalError, &error.to_string())
        }
    }
}

/// One `/v0/entities` record: `key\nvalue\n`
fn record(key: &[u8], value: &[u8]) -> Bytes {
    let mut record = BytesMut::with_capacity(key.len() + value.len() + 2);
    record.extend_from_slice(key);
    record.extend_from_slice(b"\n");
    record.extend_from_slice(value);
    record.extend_from_slice(b"\n");
    record.freeze()
}
