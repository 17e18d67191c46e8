//! Response definitions
//!
//! Represents responses to clients and replies from other nodes.

use bytes::Bytes;

/// Header carrying the timestamp of a value on proxied reads
pub const TIMESTAMP_HEADER: &str = "X-OK-Timestamp";

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Created,
    Accepted,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    InternalError,
    GatewayTimeout,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::Accepted => 202,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::InternalError => 500,
            Status::GatewayTimeout => 504,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Created => "Created",
            Status::Accepted => "Accepted",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::InternalError => "Internal Server Error",
            Status::GatewayTimeout => "Gateway Timeout",
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        let status = match code {
            200 => Status::Ok,
            201 => Status::Created,
            202 => Status::Accepted,
            400 => Status::BadRequest,
            404 => Status::NotFound,
            405 => Status::MethodNotAllowed,
            500 => Status::InternalError,
            504 => Status::GatewayTimeout,
            _ => return None,
        };
        Some(status)
    }
}

/// Response payload
pub enum Body {
    /// Sent with `Content-Length`
    Full(Bytes),
    /// Sent with chunked transfer encoding, one chunk per item
    Stream(Box<dyn Iterator<Item = Bytes> + Send>),
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Body::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// A response to send to a client
#[derive(Debug)]
pub struct Response {
    pub status: Status,
    pub headers: Vec<(String, String)>,
    pub body: Body,
}

impl Response {
    /// Response with an empty body
    pub fn new(status: Status) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Body::Full(Bytes::new()),
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(Status::Ok).with_body(body)
    }

    /// Plain-text error message
    pub fn error(status: Status, message: &str) -> Self {
        Self::new(status).with_body(Bytes::copy_from_slice(message.as_bytes()))
    }

    /// Chunked response, one chunk per item
    pub fn stream<I>(chunks: I) -> Self
    where
        I: Iterator<Item = Bytes> + Send + 'static,
    {
        Self {
            status: Status::Ok,
            headers: Vec::new(),
            body: Body::Stream(Box::new(chunks)),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::Full(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Header lookup, case-insensitive on the name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body bytes of a fully buffered response; empty for streams
    pub fn body_bytes(&self) -> &[u8] {
        match &self.body {
            Body::Full(bytes) => bytes,
            Body::Stream(_) => &[],
        }
    }
}
