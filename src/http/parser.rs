use std::fmt;
use std::net::SocketAddr;

use crate::http::request::{Method, Request, Version};

/// Longest request path accepted on the request line, in bytes.
pub const MAX_REQUEST_PATH: usize = 2047;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No blank line terminating the request yet.
    Incomplete,
    /// The request line does not have exactly three tokens or is not UTF-8.
    InvalidRequest,
    InvalidVersion,
    InvalidMethod,
    PathTooLong,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ParseError::Incomplete => "incomplete request",
            ParseError::InvalidRequest => "malformed request line",
            ParseError::InvalidVersion => "unsupported protocol version",
            ParseError::InvalidMethod => "unsupported method",
            ParseError::PathTooLong => "request path too long",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ParseError {}

/// Parses the request held in `buf`, which must contain the blank line that
/// ends the request head. Only the request line is interpreted; header lines
/// are skipped.
///
/// Returns the request and the number of bytes making up the request head.
pub fn parse_http_request(buf: &[u8], client: SocketAddr) -> Result<(Request, usize), ParseError> {
    let headers_end = find_headers_end(buf).ok_or(ParseError::Incomplete)?;
    let head = &buf[..headers_end];

    let line_end = head
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(head.len());

    let line = std::str::from_utf8(&head[..line_end]).map_err(|_| ParseError::InvalidRequest)?;
    let request = parse_request_line(line, client)?;

    Ok((request, headers_end + 4))
}

/// Parses `METHOD PATH VERSION`.
pub fn parse_request_line(line: &str, client: SocketAddr) -> Result<Request, ParseError> {
    let mut parts = line.split_whitespace();

    let (method_str, path, version_str) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(p), Some(v), None) => (m, p, v),
        _ => return Err(ParseError::InvalidRequest),
    };

    let version = Version::from_str(version_str).ok_or(ParseError::InvalidVersion)?;
    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;

    if path.len() > MAX_REQUEST_PATH {
        return Err(ParseError::PathTooLong);
    }

    Ok(Request {
        method,
        path: strip_query(path).to_string(),
        version,
        client,
    })
}

/// Returns the offset of the first `\r\n\r\n` in `buf`.
pub fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

pub fn strip_query(path: &str) -> &str {
    match path.find('?') {
        Some(idx) => &path[..idx],
        None => path,
    }
}
