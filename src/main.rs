use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;

use docserve::access_log::AccessLog;
use docserve::config::{Args, Config};
use docserve::server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load(&Args::parse())?;
    tracing::info!(
        root = %cfg.document_root.display(),
        port = cfg.port,
        workers = cfg.workers,
        "Starting server"
    );

    let access_log = AccessLog::open(cfg.access_log.as_deref())?;
    let listener = TcpListener::bind(cfg.listen_addr())
        .await
        .with_context(|| format!("failed to listen on {}", cfg.listen_addr()))?;
    let server = Server::start(&cfg, access_log)?;

    let result = tokio::select! {
        res = server.serve(listener) => res,

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    };

    tokio::task::spawn_blocking(move || server.shutdown()).await?;
    result
}
