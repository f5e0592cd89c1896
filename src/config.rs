use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use serde::Deserialize;

/// Command line: `docserve [DOCUMENT_ROOT] [PORT] [WORKERS] [--config FILE]`.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "docserve", version, about = "Concurrent static file server")]
pub struct Args {
    /// Directory files are served from
    pub document_root: Option<PathBuf>,
    /// TCP port to listen on (1-65535)
    pub port: Option<u16>,
    /// Number of worker threads
    pub workers: Option<usize>,
    /// YAML file with additional settings
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub document_root: PathBuf,
    pub bind_address: IpAddr,
    pub port: u16,
    pub workers: usize,
    /// File served for `/` and for paths ending in `/`.
    pub index_file: String,
    pub max_connections_per_worker: usize,
    /// Pending handoffs a worker may queue before new connections are shed.
    pub handoff_capacity: usize,
    /// Use `sendfile(2)` for response bodies where available.
    pub sendfile: bool,
    /// Access log file; `None` writes records to stderr.
    pub access_log: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            document_root: PathBuf::from("./htdocs"),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            workers: 8,
            index_file: "index.html".to_string(),
            max_connections_per_worker: 1024,
            handoff_capacity: 64,
            sendfile: true,
            access_log: Some(PathBuf::from("server.log")),
        }
    }
}

impl Config {
    /// Builds the configuration from defaults, the optional YAML file and
    /// the positional arguments, in increasing order of precedence, then
    /// validates it.
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let mut cfg = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(root) = &args.document_root {
            cfg.document_root = root.clone();
        }
        if let Some(port) = args.port {
            cfg.port = port;
        }
        if let Some(workers) = args.workers {
            cfg.workers = workers;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            bail!("port must be between 1 and 65535");
        }
        if self.workers == 0 {
            bail!("worker count must be greater than zero");
        }
        if self.max_connections_per_worker == 0 {
            bail!("max_connections_per_worker must be greater than zero");
        }
        if self.handoff_capacity == 0 {
            bail!("handoff_capacity must be greater than zero");
        }
        if self.index_file.is_empty() || self.index_file.contains('/') {
            bail!("index_file must be a plain file name");
        }

        let metadata = std::fs::metadata(&self.document_root).with_context(|| {
            format!("document root {} is not accessible", self.document_root.display())
        })?;
        if !metadata.is_dir() {
            bail!("document root {} is not a directory", self.document_root.display());
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
