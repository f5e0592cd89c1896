//! Worker threads.
//!
//! Each worker owns one OS thread running a single-threaded tokio runtime.
//! All of a worker's connections are tasks on that runtime, held in a
//! `JoinSet` that serves as the bounded connection table; nothing in it is
//! ever touched from another thread.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, Notify};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::access_log::AccessLog;
use crate::http::connection::Connection;
use crate::http::files::Site;
use crate::server::dispatch::Handoff;

/// How long an idle worker sleeps before re-checking its shutdown flag.
const IDLE_WAIT: Duration = Duration::from_millis(200);

/// Settings shared by every worker of a server.
#[derive(Clone)]
pub struct WorkerConfig {
    pub site: Arc<Site>,
    pub access_log: AccessLog,
    /// Maximum number of live connections per worker.
    pub capacity: usize,
    /// Depth of the handoff channel.
    pub handoff_capacity: usize,
}

/// Point-in-time counters of one worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub active: usize,
    pub admitted: u64,
    pub rejected: u64,
}

#[derive(Default)]
struct WorkerStats {
    active: AtomicUsize,
    admitted: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Default)]
struct ShutdownSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Owning handle to a running worker thread.
pub struct WorkerHandle {
    id: usize,
    sender: mpsc::Sender<Handoff>,
    shutdown: Arc<ShutdownSignal>,
    stats: Arc<WorkerStats>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Builds the worker's runtime and starts its thread.
    pub fn spawn(id: usize, config: WorkerConfig) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel(config.handoff_capacity.max(1));
        let shutdown = Arc::new(ShutdownSignal::default());
        let stats = Arc::new(WorkerStats::default());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let worker = Worker {
            id,
            site: config.site,
            access_log: config.access_log,
            capacity: config.capacity,
            shutdown: shutdown.clone(),
            stats: stats.clone(),
        };

        let thread = thread::Builder::new()
            .name(format!("worker-{}", id))
            .spawn(move || worker.run_on(runtime, receiver))?;

        Ok(Self {
            id,
            sender,
            shutdown,
            stats,
            thread: Some(thread),
        })
    }

    pub fn sender(&self) -> mpsc::Sender<Handoff> {
        self.sender.clone()
    }

    pub fn stats(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            active: self.stats.active.load(Ordering::Relaxed),
            admitted: self.stats.admitted.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
        }
    }

    /// Sets the shutdown flag and wakes the event loop. Does not wait.
    pub fn signal_shutdown(&self) {
        self.shutdown.trigger();
        // Best effort: the flag and the notification already guarantee exit.
        let _ = self.sender.try_send(Handoff::Shutdown);
    }

    /// Waits for the worker thread to finish.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(worker = self.id, "Worker thread panicked");
            }
        }
    }
}

struct Worker {
    id: usize,
    site: Arc<Site>,
    access_log: AccessLog,
    capacity: usize,
    shutdown: Arc<ShutdownSignal>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    fn run_on(self, runtime: Runtime, receiver: mpsc::Receiver<Handoff>) {
        runtime.block_on(self.run(receiver));
    }

    async fn run(self, mut receiver: mpsc::Receiver<Handoff>) {
        let mut connections: JoinSet<()> = JoinSet::new();
        info!(worker = self.id, capacity = self.capacity, "Worker started");

        'event_loop: while !self.shutdown.is_triggered() {
            tokio::select! {
                message = receiver.recv() => {
                    let Some(message) = message else { break };
                    if !self.handle(message, &mut connections) {
                        break;
                    }
                    while let Ok(message) = receiver.try_recv() {
                        if !self.handle(message, &mut connections) {
                            break 'event_loop;
                        }
                    }
                }
                Some(result) = connections.join_next(), if !connections.is_empty() => {
                    self.reaped(result);
                }
                _ = self.shutdown.notify.notified() => {}
                _ = tokio::time::sleep(IDLE_WAIT), if connections.is_empty() => {}
            }

            self.compact(&mut connections);
        }

        // In-flight connections are abandoned; aborting their tasks drops
        // every socket and open file they own.
        receiver.close();
        let abandoned = connections.len();
        connections.shutdown().await;
        while let Ok(message) = receiver.try_recv() {
            drop(message);
        }
        self.stats.active.store(0, Ordering::Relaxed);

        info!(worker = self.id, abandoned, "Worker stopped");
    }

    /// Returns `false` when the loop must exit.
    fn handle(&self, message: Handoff, connections: &mut JoinSet<()>) -> bool {
        match message {
            Handoff::Accepted { stream, peer } => {
                self.admit(connections, stream, peer);
                true
            }
            Handoff::Shutdown => false,
        }
    }

    fn admit(&self, connections: &mut JoinSet<()>, stream: std::net::TcpStream, peer: SocketAddr) {
        self.compact(connections);

        if connections.len() >= self.capacity {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(worker = self.id, peer = %peer, capacity = self.capacity, "Connection table full, closing connection");
            return;
        }

        let stream = match stream.set_nonblocking(true).and_then(|_| TcpStream::from_std(stream)) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(worker = self.id, peer = %peer, error = %e, "Failed to register connection");
                return;
            }
        };

        self.stats.admitted.fetch_add(1, Ordering::Relaxed);
        debug!(worker = self.id, peer = %peer, "Connection admitted");

        let connection = Connection::new(stream, peer, self.site.clone(), self.access_log.clone());
        connections.spawn(connection.run());
        self.stats.active.store(connections.len(), Ordering::Relaxed);
    }

    /// Removes every finished connection from the table.
    fn compact(&self, connections: &mut JoinSet<()>) {
        while let Some(result) = connections.try_join_next() {
            self.reaped(result);
        }
        self.stats.active.store(connections.len(), Ordering::Relaxed);
    }

    fn reaped(&self, result: Result<(), JoinError>) {
        if let Err(e) = result {
            if e.is_panic() {
                error!(worker = self.id, error = %e, "Connection task panicked");
            }
        }
    }
}
