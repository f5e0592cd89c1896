//! Incremental response output.
//!
//! Both writers perform at most one non-blocking transfer per call after the
//! socket reports write readiness, so the owning connection can be advanced
//! one readiness event at a time. A `WouldBlock` error leaves all progress
//! counters untouched.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use bytes::{Buf, Bytes, BytesMut};
use tokio::net::TcpStream;

/// Largest slice handed to a single `sendfile` call.
const SENDFILE_CHUNK: usize = 1024 * 1024;

/// Read size for the buffered copy path.
const COPY_CHUNK: usize = 64 * 1024;

/// Writes a fully built response head, tracking partial writes.
pub struct HeaderWriter {
    buffer: Bytes,
    written: usize,
}

impl HeaderWriter {
    pub fn new(buffer: impl Into<Bytes>) -> Self {
        Self {
            buffer: buffer.into(),
            written: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.written >= self.buffer.len()
    }

    pub async fn write_to_stream(&mut self, stream: &TcpStream) -> io::Result<usize> {
        stream.writable().await?;
        let n = stream.try_write(&self.buffer[self.written..])?;
        self.written += n;
        Ok(n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Kernel file-to-socket copy.
    SendFile,
    /// Read into a user-space buffer, then write.
    Buffered,
}

/// Streams an open file to a socket from the current body offset.
pub struct BodyTransfer {
    file: File,
    size: u64,
    sent: u64,
    mode: TransferMode,
    /// Bytes read from the file but not yet accepted by the socket.
    pending: BytesMut,
}

impl BodyTransfer {
    pub fn new(file: File, size: u64, prefer_sendfile: bool) -> Self {
        let mode = if prefer_sendfile && cfg!(target_os = "linux") {
            TransferMode::SendFile
        } else {
            TransferMode::Buffered
        };

        Self {
            file,
            size,
            sent: 0,
            mode,
            pending: BytesMut::new(),
        }
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn is_complete(&self) -> bool {
        self.sent >= self.size
    }

    /// Waits for write readiness and transfers the next chunk.
    ///
    /// `Ok(0)` means no progress is possible (the file ended early or the
    /// peer stopped accepting data) and the transfer must be abandoned.
    pub async fn send_chunk(&mut self, stream: &TcpStream) -> io::Result<usize> {
        if self.is_complete() {
            return Ok(0);
        }

        stream.writable().await?;

        let n = match self.mode {
            TransferMode::SendFile => match self.try_sendfile(stream) {
                Err(e) if sendfile_unsupported(&e) => {
                    tracing::debug!(error = %e, "sendfile unavailable, falling back to buffered copy");
                    self.mode = TransferMode::Buffered;
                    self.file.seek(SeekFrom::Start(self.sent))?;
                    self.try_buffered(stream)?
                }
                other => other?,
            },
            TransferMode::Buffered => self.try_buffered(stream)?,
        };

        self.sent += n as u64;
        Ok(n)
    }

    #[cfg(target_os = "linux")]
    fn try_sendfile(&mut self, stream: &TcpStream) -> io::Result<usize> {
        use std::os::fd::AsRawFd;
        use tokio::io::Interest;

        let count = (self.size - self.sent).min(SENDFILE_CHUNK as u64) as usize;
        let socket_fd = stream.as_raw_fd();
        let file_fd = self.file.as_raw_fd();
        let mut offset = self.sent as libc::off_t;

        stream.try_io(Interest::WRITABLE, || {
            // SAFETY: both descriptors are owned by live objects borrowed for the
            // duration of the call, and `offset` outlives it.
            let rc = unsafe { libc::sendfile(socket_fd, file_fd, &mut offset, count) };
            if rc < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(rc as usize)
            }
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn try_sendfile(&mut self, stream: &TcpStream) -> io::Result<usize> {
        self.try_buffered(stream)
    }

    fn try_buffered(&mut self, stream: &TcpStream) -> io::Result<usize> {
        if self.pending.is_empty() {
            let want = (self.size - self.sent).min(COPY_CHUNK as u64) as usize;
            self.pending.resize(want, 0);
            match self.file.read(&mut self.pending) {
                Ok(n) => self.pending.truncate(n),
                Err(e) => {
                    self.pending.clear();
                    return Err(e);
                }
            }
            if self.pending.is_empty() {
                return Ok(0);
            }
        }

        let n = stream.try_write(&self.pending)?;
        self.pending.advance(n);
        Ok(n)
    }
}

#[cfg(target_os = "linux")]
fn sendfile_unsupported(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(libc::EINVAL) | Some(libc::ENOSYS) | Some(libc::EOPNOTSUPP))
}

#[cfg(not(target_os = "linux"))]
fn sendfile_unsupported(_e: &io::Error) -> bool {
    false
}
