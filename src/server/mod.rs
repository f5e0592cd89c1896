//! Server context: the worker pool, the dispatcher and the accept loop.
//!
//! ```text
//!   listener ──accept──▶ Dispatcher ──try_send──▶ worker-0 channel ─▶ JoinSet<Connection>
//!                          (round robin)   ├────▶ worker-1 channel ─▶ JoinSet<Connection>
//!                                          └────▶ ...
//! ```

pub mod dispatch;
pub mod listener;
pub mod worker;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use crate::access_log::AccessLog;
use crate::config::Config;
use crate::http::files::Site;
use crate::server::dispatch::Dispatcher;
use crate::server::worker::{WorkerConfig, WorkerHandle, WorkerSnapshot};

/// Owns every worker and the round-robin dispatcher shared with the listener.
pub struct Server {
    dispatcher: Arc<Dispatcher>,
    workers: Vec<WorkerHandle>,
}

impl Server {
    /// Starts `config.workers` worker threads. If any worker fails to start,
    /// the ones already running are stopped and the error is returned.
    pub fn start(config: &Config, access_log: AccessLog) -> anyhow::Result<Self> {
        let site = Arc::new(Site {
            document_root: config.document_root.clone(),
            index_file: config.index_file.clone(),
            sendfile: config.sendfile,
        });

        let worker_config = WorkerConfig {
            site,
            access_log,
            capacity: config.max_connections_per_worker,
            handoff_capacity: config.handoff_capacity,
        };

        let mut workers = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            match WorkerHandle::spawn(id, worker_config.clone()) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    stop_workers(workers);
                    return Err(e).with_context(|| format!("failed to start worker {}", id));
                }
            }
        }

        let dispatcher = Dispatcher::new(workers.iter().map(WorkerHandle::sender).collect());

        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            workers,
        })
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Runs the accept loop on `listener`.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        listener::run(listener, self.dispatcher()).await
    }

    pub fn stats(&self) -> Vec<WorkerSnapshot> {
        self.workers.iter().map(WorkerHandle::stats).collect()
    }

    /// Signals every worker, then joins them all. Blocks until every worker
    /// thread has exited and released its connections.
    pub fn shutdown(self) {
        stop_workers(self.workers);
        info!("Server stopped");
    }
}

fn stop_workers(workers: Vec<WorkerHandle>) {
    for worker in &workers {
        worker.signal_shutdown();
    }
    for worker in workers {
        worker.join();
    }
}
