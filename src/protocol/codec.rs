//! Protocol codec
//!
//! Reading and writing HTTP/1.1 messages over blocking streams.
//!
//! ## Wire Format
//! ```text
//! METHOD /path?name=value&... HTTP/1.1\r\n
//! Header: value\r\n
//! ...
//! \r\n
//! body (Content-Length bytes, or chunked)
//! ```
//!
//! Query values are percent-encoded bytes. Bodies of unknown length are sent
//! with chunked transfer encoding; each chunk is `size-in-hex\r\ndata\r\n` and
//! a zero-sized chunk ends the body.

use std::io::{BufRead, Read, Write};

use bytes::Bytes;

use crate::error::{Result, RingError};

use super::{Body, Method, Request, Response, Status};

/// Longest accepted request, status or header line
pub const MAX_LINE_SIZE: usize = 8 * 1024;

/// Most headers accepted on one message
pub const MAX_HEADERS: usize = 64;

/// Largest accepted body (64 MB)
pub const MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

// =============================================================================
// Requests
// =============================================================================

/// Read the next request from a connection
///
/// Returns `Ok(None)` when the peer closed the connection between requests.
pub fn read_request<R: BufRead>(reader: &mut R) -> Result<Option<Request>> {
    let mut line = String::new();
    if read_line(reader, &mut line)? == 0 {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version)) => (method, target, version),
        _ => return Err(protocol_error(format!("Malformed request line: {:?}", line))),
    };
    if !version.starts_with("HTTP/1.") {
        return Err(protocol_error(format!("Unsupported version: {}", version)));
    }

    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let mut request = Request::new(Method::parse(method), path);
    request.params = parse_query(query)?;
    request.headers = read_headers(reader)?;
    request.body = read_body(reader, &request.headers, false)?;

    Ok(Some(request))
}

/// Send a request to another node
pub fn write_request<W: Write>(writer: &mut W, request: &Request, host: &str) -> Result<()> {
    let mut head = format!("{} {}", request.method.as_str(), request.path);
    for (i, (name, value)) in request.params.iter().enumerate() {
        head.push(if i == 0 { '?' } else { '&' });
        head.push_str(&percent_encode(name.as_bytes()));
        head.push('=');
        head.push_str(&percent_encode(value));
    }
    head.push_str(" HTTP/1.1\r\n");
    head.push_str(&format!("Host: {}\r\n", host));
    for (name, value) in &request.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str(&format!("Content-Length: {}\r\n\r\n", request.body.len()));

    writer.write_all(head.as_bytes())?;
    writer.write_all(&request.body)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Responses
// =============================================================================

/// Read a response, buffering its whole body
pub fn read_response<R: BufRead>(reader: &mut R) -> Result<Response> {
    let mut line = String::new();
    if read_line(reader, &mut line)? == 0 {
        return Err(protocol_error("Connection closed before response"));
    }

    let mut parts = line.splitn(3, ' ');
    let code = match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/1.") => code,
        _ => return Err(protocol_error(format!("Malformed status line: {:?}", line))),
    };
    let status = code
        .parse::<u16>()
        .ok()
        .and_then(Status::from_code)
        .ok_or_else(|| protocol_error(format!("Unsupported status: {}", code)))?;

    let headers = read_headers(reader)?;
    let body = read_body(reader, &headers, true)?;

    Ok(Response {
        status,
        headers,
        body: Body::Full(body),
    })
}

/// Send a response, streaming chunked bodies as they are produced
pub fn write_response<W: Write>(writer: &mut W, response: Response, keep_alive: bool) -> Result<()> {
    let status = response.status;
    let mut head = format!("HTTP/1.1 {} {}\r\n", status.code(), status.reason());
    for (name, value) in &response.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    if !keep_alive {
        head.push_str("Connection: close\r\n");
    }

    match response.body {
        Body::Full(body) => {
            head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
            writer.write_all(head.as_bytes())?;
            writer.write_all(&body)?;
        }
        Body::Stream(chunks) => {
            head.push_str("Transfer-Encoding: chunked\r\n\r\n");
            writer.write_all(head.as_bytes())?;
            for chunk in chunks.filter(|chunk| !chunk.is_empty()) {
                write!(writer, "{:x}\r\n", chunk.len())?;
                writer.write_all(&chunk)?;
                writer.write_all(b"\r\n")?;
            }
            writer.write_all(b"0\r\n\r\n")?;
        }
    }

    writer.flush()?;
    Ok(())
}

// =============================================================================
// Percent Encoding
// =============================================================================

/// Encode bytes for a query string, keeping only unreserved characters
pub fn percent_encode(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len());
    for &byte in bytes {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

/// Decode `%XX` escapes; every other byte (including `+`) is taken literally
pub fn percent_decode(input: &str) -> Result<Vec<u8>> {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| protocol_error(format!("Bad escape in {:?}", input)))?;
            decoded.push(hex);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    Ok(decoded)
}

// =============================================================================
// Helpers
// =============================================================================

fn protocol_error(message: impl Into<String>) -> RingError {
    RingError::Protocol(message.into())
}

/// Read one line without its CRLF; returns the raw byte count (0 at EOF)
fn read_line<R: BufRead>(reader: &mut R, line: &mut String) -> Result<usize> {
    let mut raw = Vec::new();
    let read = reader
        .by_ref()
        .take(MAX_LINE_SIZE as u64 + 1)
        .read_until(b'\n', &mut raw)?;

    if read > MAX_LINE_SIZE {
        return Err(protocol_error("Line too long"));
    }
    if read > 0 && !raw.ends_with(b"\n") {
        return Err(RingError::Io(std::io::ErrorKind::UnexpectedEof.into()));
    }

    while matches!(raw.last(), Some(b'\n' | b'\r')) {
        raw.pop();
    }
    line.clear();
    line.push_str(
        std::str::from_utf8(&raw).map_err(|_| protocol_error("Line is not valid UTF-8"))?,
    );
    Ok(read)
}

fn read_headers<R: BufRead>(reader: &mut R) -> Result<Vec<(String, String)>> {
    let mut headers = Vec::new();
    let mut line = String::new();

    loop {
        if read_line(reader, &mut line)? == 0 {
            return Err(RingError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        if line.is_empty() {
            return Ok(headers);
        }
        if headers.len() == MAX_HEADERS {
            return Err(protocol_error("Too many headers"));
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| protocol_error(format!("Malformed header: {:?}", line)))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Read a body framed by Content-Length or chunked encoding
///
/// With neither header, requests have no body and responses run to EOF.
fn read_body<R: BufRead>(
    reader: &mut R,
    headers: &[(String, String)],
    until_eof: bool,
) -> Result<Bytes> {
    let chunked = find_header(headers, "Transfer-Encoding")
        .map_or(false, |value| value.eq_ignore_ascii_case("chunked"));
    if chunked {
        return read_chunked(reader);
    }

    if let Some(length) = find_header(headers, "Content-Length") {
        let length: usize = length
            .parse()
            .map_err(|_| protocol_error(format!("Bad Content-Length: {}", length)))?;
        if length > MAX_BODY_SIZE {
            return Err(protocol_error(format!("Body too large: {} bytes", length)));
        }
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body)?;
        return Ok(Bytes::from(body));
    }

    if until_eof {
        let mut body = Vec::new();
        reader
            .by_ref()
            .take(MAX_BODY_SIZE as u64)
            .read_to_end(&mut body)?;
        return Ok(Bytes::from(body));
    }

    Ok(Bytes::new())
}

fn read_chunked<R: BufRead>(reader: &mut R) -> Result<Bytes> {
    let mut body = Vec::new();
    let mut line = String::new();

    loop {
        if read_line(reader, &mut line)? == 0 {
            return Err(RingError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        let size = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size, 16)
            .map_err(|_| protocol_error(format!("Bad chunk size: {:?}", line)))?;

        if size == 0 {
            // Optional trailers, then the blank line
            read_headers(reader)?;
            return Ok(Bytes::from(body));
        }
        let start = body.len();
        let end = start
            .checked_add(size)
            .filter(|end| *end <= MAX_BODY_SIZE)
            .ok_or_else(|| protocol_error("Chunked body too large"))?;
        body.resize(end, 0);
        reader.read_exact(&mut body[start..])?;

        read_line(reader, &mut line)?;
        if !line.is_empty() {
            return Err(protocol_error("Missing CRLF after chunk"));
        }
    }
}

fn parse_query(query: &str) -> Result<Vec<(String, Vec<u8>)>> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = String::from_utf8(percent_decode(name)?)
                .map_err(|_| protocol_error("Parameter name is not valid UTF-8"))?;
            Ok((name, percent_decode(value)?))
        })
        .collect()
}
