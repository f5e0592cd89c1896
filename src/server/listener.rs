use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::server::dispatch::Dispatcher;

/// Pause after running out of descriptors, so the accept loop does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Accepts connections until an unrecoverable accept error occurs, handing
/// each socket to a worker.
pub async fn run(listener: TcpListener, dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    info!(
        "Listening on {} with {} workers",
        listener.local_addr()?,
        dispatcher.worker_count()
    );

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) if is_transient(&e) => {
                warn!(error = %e, "Accept failed, retrying");
                if is_descriptor_exhaustion(&e) {
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
                continue;
            }
            Err(e) => return Err(e).context("accept failed"),
        };
        debug!("Accepted connection from {}", peer);

        let stream = match socket.into_std() {
            Ok(stream) => stream,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Failed to detach accepted socket");
                continue;
            }
        };

        match dispatcher.dispatch(stream, peer) {
            Ok(worker) => debug!(peer = %peer, worker, "Connection handed off"),
            Err(e) => warn!(peer = %peer, error = %e, "Connection shed"),
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    ) || is_descriptor_exhaustion(e)
}

fn is_descriptor_exhaustion(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(libc::EMFILE) | Some(libc::ENFILE))
}
