//! Cross-thread connection handoff.
//!
//! Ownership of an accepted socket moves from the listener to exactly one
//! worker through that worker's bounded channel. The listener never waits on
//! a channel: a full or closed channel sheds the connection on the spot, and
//! dropping the undelivered message closes the socket.

use std::fmt;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Message carried by a worker's handoff channel.
#[derive(Debug)]
pub enum Handoff {
    /// A freshly accepted, non-blocking socket and its peer address.
    Accepted { stream: TcpStream, peer: SocketAddr },
    /// Sentinel asking the worker to leave its event loop.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// The target worker's channel is at capacity.
    Full { worker: usize },
    /// The target worker is gone or no workers exist.
    Closed { worker: usize },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Full { worker } => write!(f, "handoff channel of worker {} is full", worker),
            DispatchError::Closed { worker } => write!(f, "worker {} is not accepting connections", worker),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Round-robin distribution of accepted sockets over worker channels.
#[derive(Debug)]
pub struct Dispatcher {
    workers: Vec<mpsc::Sender<Handoff>>,
    next_worker: AtomicUsize,
}

impl Dispatcher {
    pub fn new(workers: Vec<mpsc::Sender<Handoff>>) -> Self {
        Self {
            workers,
            next_worker: AtomicUsize::new(0),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Hands `stream` to the next worker in round-robin order and returns
    /// that worker's index. On error the stream has already been closed.
    pub fn dispatch(&self, stream: TcpStream, peer: SocketAddr) -> Result<usize, DispatchError> {
        if self.workers.is_empty() {
            return Err(DispatchError::Closed { worker: 0 });
        }

        let worker = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();

        match self.workers[worker].try_send(Handoff::Accepted { stream, peer }) {
            Ok(()) => Ok(worker),
            Err(TrySendError::Full(_)) => Err(DispatchError::Full { worker }),
            Err(TrySendError::Closed(_)) => Err(DispatchError::Closed { worker }),
        }
    }
}
