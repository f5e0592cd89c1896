//! HTTP protocol implementation.
//!
//! This module serves files from a document root over HTTP/1.0 and HTTP/1.1.
//! Every response carries `Connection: close`; one request is read, answered
//! and the socket closed.
//!
//! # Architecture
//!
//! - **`connection`**: Per-client state machine driven by socket readiness
//! - **`parser`**: Request line parsing and request head framing
//! - **`request`**: `Method` and `Request`
//! - **`resolve`**: Safe resolution of request paths beneath the document root
//! - **`files`**: Maps a request onto a servable file (status, size, type)
//! - **`response`**: Status codes, bounded response header, error pages
//! - **`writer`**: Incremental header and body output
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Accumulate bytes until the blank line
//!        └──────┬──────┘
//!               │ Request line parsed, file opened
//!               ▼
//!        ┌──────────────────┐
//!        │  SendingHeader   │ ← Partial writes tracked per readiness event
//!        └──────┬───────────┘
//!               │ Header sent (GET, non-empty file)
//!               ▼
//!        ┌──────────────────┐
//!        │   SendingBody    │ ← sendfile or buffered copy from offset
//!        └──────┬───────────┘
//!               │ Body complete
//!               ▼
//!        ┌──────────────────┐
//!        │       Done       │ ← File and socket released
//!        └──────────────────┘
//! ```
//!
//! Errors in `Reading` send a complete error response and jump straight to
//! `Done`; HEAD requests and empty files go from `SendingHeader` to `Done`.
//! Hard I/O errors in any state abort to `Done` without further output.

pub mod connection;
pub mod files;
pub mod mime;
pub mod parser;
pub mod request;
pub mod resolve;
pub mod response;
pub mod writer;
