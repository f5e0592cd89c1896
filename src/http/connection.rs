use std::fs::File;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::access_log::{AccessLog, AccessRecord};
use crate::http::files::Site;
use crate::http::parser::{find_headers_end, parse_http_request};
use crate::http::request::Request;
use crate::http::response::{error_response, ResponseHead, StatusCode};
use crate::http::writer::{BodyTransfer, HeaderWriter};

/// Capacity of the per-connection request buffer.
pub const READ_BUF_SIZE: usize = 4096;

/// Lifecycle of a connection. States only ever advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Reading,
    SendingHeader,
    SendingBody,
    Done,
}

pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    site: Arc<Site>,
    log: AccessLog,
    read_buf: BytesMut,
    request: Option<Request>,
    state: ConnectionState,
    /// Status of the response once one has been decided.
    status: Option<StatusCode>,
    header: Option<HeaderWriter>,
    /// Holds the open file; present only while a body may still be sent.
    body: Option<BodyTransfer>,
    file_size: u64,
    body_sent: u64,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, site: Arc<Site>, log: AccessLog) -> Self {
        Self {
            stream,
            peer,
            site,
            log,
            read_buf: BytesMut::with_capacity(READ_BUF_SIZE),
            request: None,
            state: ConnectionState::Reading,
            status: None,
            header: None,
            body: None,
            file_size: 0,
            body_sent: 0,
        }
    }

    /// Drives the connection to `Done`. The socket is closed when `self` is
    /// dropped on return.
    pub async fn run(mut self) {
        while self.state != ConnectionState::Done {
            let result = match self.state {
                ConnectionState::Reading => self.on_readable().await,
                ConnectionState::SendingHeader => self.on_header_writable().await,
                ConnectionState::SendingBody => self.on_body_writable().await,
                ConnectionState::Done => break,
            };

            if let Err(e) = result {
                match e.kind() {
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => continue,
                    _ => {
                        tracing::debug!(
                            peer = %self.peer,
                            state = ?self.state,
                            error = %e,
                            "Connection aborted"
                        );
                        self.transition(ConnectionState::Done);
                    }
                }
            }
        }

        self.finish();
    }

    fn transition(&mut self, next: ConnectionState) {
        debug_assert!(next > self.state, "state moved backwards: {:?} -> {:?}", self.state, next);
        self.state = next;

        if next == ConnectionState::Done {
            if let Some(body) = self.body.take() {
                self.body_sent = body.sent();
            }
        }
    }

    async fn on_readable(&mut self) -> io::Result<()> {
        self.stream.readable().await?;

        let room = READ_BUF_SIZE - self.read_buf.len();
        let n = self.stream.try_read_buf(&mut (&mut self.read_buf).limit(room))?;
        if n == 0 {
            tracing::debug!(peer = %self.peer, "Peer closed before sending a request");
            self.transition(ConnectionState::Done);
            return Ok(());
        }

        if find_headers_end(&self.read_buf).is_some() {
            self.on_request().await;
        } else if self.read_buf.len() >= READ_BUF_SIZE {
            self.reject(StatusCode::PayloadTooLarge).await;
        }

        Ok(())
    }

    async fn on_request(&mut self) {
        let request = match parse_http_request(&self.read_buf, self.peer) {
            Ok((request, _)) => request,
            Err(e) => {
                tracing::debug!(peer = %self.peer, error = %e, "Rejecting request line");
                self.reject(StatusCode::MethodNotAllowed).await;
                return;
            }
        };

        tracing::debug!(
            peer = %self.peer,
            method = %request.method,
            path = %request.path,
            version = request.version.as_str(),
            "Request parsed"
        );

        let prepared = self.site.prepare(&request);
        self.request = Some(request);

        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(status) => {
                self.reject(status).await;
                return;
            }
        };

        let file = match File::open(&prepared.path) {
            Ok(file) => file,
            Err(e) => {
                tracing::debug!(peer = %self.peer, error = %e, "Failed to open file");
                self.reject(StatusCode::NotFound).await;
                return;
            }
        };

        let header = match ResponseHead::new(StatusCode::Ok, prepared.content_type, prepared.size).encode() {
            Ok(header) => header,
            Err(e) => {
                tracing::warn!(peer = %self.peer, error = %e, "Failed to build response header");
                self.reject(StatusCode::InternalServerError).await;
                return;
            }
        };

        self.status = Some(StatusCode::Ok);
        self.header = Some(HeaderWriter::new(header));
        let body = BodyTransfer::new(file, prepared.size, self.site.sendfile);
        tracing::debug!(peer = %self.peer, size = prepared.size, mode = ?body.mode(), "Serving file");
        self.body = Some(body);
        self.file_size = prepared.size;
        self.transition(ConnectionState::SendingHeader);
    }

    async fn on_header_writable(&mut self) -> io::Result<()> {
        let Some(header) = self.header.as_mut() else {
            self.transition(ConnectionState::Done);
            return Ok(());
        };

        if header.write_to_stream(&self.stream).await? == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        if !header.is_complete() {
            return Ok(());
        }

        let wants_body = self.request.as_ref().is_some_and(|r| r.wants_body());
        if wants_body && self.file_size > 0 {
            self.transition(ConnectionState::SendingBody);
        } else {
            self.transition(ConnectionState::Done);
        }
        Ok(())
    }

    async fn on_body_writable(&mut self) -> io::Result<()> {
        let Some(body) = self.body.as_mut() else {
            self.transition(ConnectionState::Done);
            return Ok(());
        };

        if body.send_chunk(&self.stream).await? == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        if body.is_complete() {
            self.transition(ConnectionState::Done);
        }
        Ok(())
    }

    /// Sends a complete error response and moves to `Done`. Write failures
    /// are ignored: the connection is closing either way.
    async fn reject(&mut self, status: StatusCode) {
        self.status = Some(status);

        if let Err(e) = self.stream.write_all(&error_response(status)).await {
            tracing::debug!(peer = %self.peer, error = %e, "Failed to send error response");
        }
        self.transition(ConnectionState::Done);
    }

    fn finish(&mut self) {
        let Some(status) = self.status else {
            return;
        };

        let (method, path) = match &self.request {
            Some(req) => (Some(req.method), req.path.clone()),
            None => (None, "/".to_string()),
        };

        self.log.record(&AccessRecord {
            client: self.peer,
            method,
            path,
            status,
            bytes_sent: if status == StatusCode::Ok { self.body_sent } else { 0 },
        });
    }
}
