use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

/// Capacity of the buffer a response header is built in.
pub const MAX_HEADER_SIZE: usize = 1024;

const HTTP_VERSION: &str = "HTTP/1.1";
const ERROR_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// HTTP status codes produced by the server.
///
/// - `Ok` (200): File served
/// - `BadRequest` (400): Request path unusable after default-document mapping
/// - `Forbidden` (403): Directory or path outside the document root
/// - `NotFound` (404): Nothing servable at the path
/// - `MethodNotAllowed` (405): Malformed or unsupported request line
/// - `PayloadTooLarge` (413): Oversized request head or file
/// - `InternalServerError` (500): Response could not be constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 413 Payload Too Large
    PayloadTooLarge,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use docserve::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::PayloadTooLarge.as_u16(), 413);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

/// The header did not fit in `MAX_HEADER_SIZE` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderOverflow;

impl fmt::Display for HeaderOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "response header exceeds {} bytes", MAX_HEADER_SIZE)
    }
}

impl std::error::Error for HeaderOverflow {}

/// Status line plus the fixed header set every response carries.
///
/// `Connection: close` is always emitted; there is no keep-alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub content_type: String,
    pub content_length: u64,
}

impl ResponseHead {
    pub fn new(status: StatusCode, content_type: impl Into<String>, content_length: u64) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            content_length,
        }
    }

    /// Serializes the head, terminated by the blank line, into a buffer of at
    /// most `MAX_HEADER_SIZE` bytes.
    pub fn encode(&self) -> Result<BytesMut, HeaderOverflow> {
        let encoded = self.to_string();
        if encoded.len() > MAX_HEADER_SIZE {
            return Err(HeaderOverflow);
        }

        let mut buf = BytesMut::with_capacity(MAX_HEADER_SIZE);
        buf.put_slice(encoded.as_bytes());
        Ok(buf)
    }
}

impl fmt::Display for ResponseHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            HTTP_VERSION,
            self.status.as_u16(),
            self.status.reason_phrase(),
            self.content_type,
            self.content_length,
        )
    }
}

/// Minimal HTML body used for every error status.
pub fn error_page(status: StatusCode) -> String {
    format!(
        "<html><head><title>{0}</title></head><body><h1>{0}</h1></body></html>",
        status
    )
}

/// A complete error response: head followed by the HTML page.
///
/// Error heads carry a fixed content type and are always well under
/// `MAX_HEADER_SIZE`, so they skip the bounded encoder.
pub fn error_response(status: StatusCode) -> Bytes {
    let page = error_page(status);
    let head = ResponseHead::new(status, ERROR_CONTENT_TYPE, page.len() as u64).to_string();

    let mut buf = BytesMut::with_capacity(head.len() + page.len());
    buf.put_slice(head.as_bytes());
    buf.put_slice(page.as_bytes());
    buf.freeze()
}
