//! Request definitions
//!
//! An HTTP/1.1 request as seen by the server and built by the replica client.

use bytes::Bytes;

/// Header marking a request forwarded by another node
pub const PROXY_HEADER: &str = "X-OK-Proxy";

/// Value of [`PROXY_HEADER`] on forwarded requests
pub const PROXY_HEADER_VALUE: &str = "True";

/// Request methods the server knows about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Delete,
    /// Anything else, kept so the router can answer 405
    Other(String),
}

impl Method {
    pub fn parse(token: &str) -> Self {
        match token {
            "GET" => Method::Get,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Other(other) => other,
        }
    }
}

/// A parsed request
///
/// Query parameter values are percent-decoded bytes, since keys are arbitrary
/// byte strings.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, Vec<u8>)>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl AsRef<[u8]>) -> Self {
        self.params.push((name.into(), value.as_ref().to_vec()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of query parameter `name`
    pub fn param(&self, name: &str) -> Option<&[u8]> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_slice())
    }

    /// First value of query parameter `name`, as UTF-8
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.param(name).and_then(|value| std::str::from_utf8(value).ok())
    }

    /// Header lookup, case-insensitive on the name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// True if another node forwarded this request
    pub fn is_proxied(&self) -> bool {
        self.header(PROXY_HEADER)
            .map_or(false, |value| value.eq_ignore_ascii_case(PROXY_HEADER_VALUE))
    }

    /// HTTP/1.1 keeps the connection open unless told otherwise
    pub fn keep_alive(&self) -> bool {
        !self
            .header("Connection")
            .map_or(false, |value| value.eq_ignore_ascii_case("close"))
    }
}
