//! Protocol Module
//!
//! Defines the HTTP/1.1 wire protocol spoken by clients and between nodes.
//!
//! ## Routes
//! - `GET /v0/status`: liveness probe
//! - `GET|PUT|DELETE /v0/entity?id=<key>[&replicas=<ack>/<from>][&ttl=<ms>]`
//! - `GET /v0/entities?start=<key>[&end=<key>]`: chunked `key\nvalue\n` records
//!
//! ## Inter-node Headers
//! - `X-OK-Proxy: True` marks a request forwarded by a coordinator; the
//!   receiving node serves it from its local engine only
//! - `X-OK-Timestamp: <ts>` on proxied reads carries the timestamp of the
//!   present or removed value
//!
//! ### Status Codes
//! - 200 read ok, 201 stored, 202 deleted
//! - 400 bad request, 404 not found, 405 wrong method
//! - 500 local failure, 504 not enough replicas answered

mod codec;
mod request;
mod response;

pub use codec::{
    percent_decode, percent_encode, read_request, read_response, write_request, write_response,
    MAX_BODY_SIZE, MAX_HEADERS, MAX_LINE_SIZE,
};
pub use request::{Method, Request, PROXY_HEADER, PROXY_HEADER_VALUE};
pub use response::{Body, Response, Status, TIMESTAMP_HEADER};
