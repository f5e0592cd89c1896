//! Shared fixtures for end-to-end server tests.

#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use docserve::access_log::AccessLog;
use docserve::config::Config;
use docserve::server::{listener, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const INDEX_HTML: &str = "<html><body>home</body></html>";
pub const SUB_INDEX_HTML: &str = "<html><body>sub</body></html>";

const IO_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TestServer {
    pub addr: SocketAddr,
    pub dir: tempfile::TempDir,
    server: Option<Server>,
    accept: JoinHandle<anyhow::Result<()>>,
}

/// Deterministic, non-repeating-at-small-scale file content.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 251) % 256) as u8).collect()
}

fn populate(root: &Path) {
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("index.html"), INDEX_HTML).unwrap();
    fs::write(root.join("sub/index.html"), SUB_INDEX_HTML).unwrap();
    fs::write(root.join("empty.txt"), "").unwrap();
    fs::write(root.join("data.bin"), pattern(3 * 1024 * 1024 + 17)).unwrap();
    fs::write(root.join("style.css"), "body { color: red }").unwrap();
}

/// Starts a server on an ephemeral loopback port serving a fresh document root.
pub async fn start(configure: impl FnOnce(&mut Config)) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("www");
    populate(&root);
    fs::write(dir.path().join("secret.txt"), "top secret").unwrap();

    let mut config = Config {
        document_root: root,
        workers: 2,
        access_log: Some(dir.path().join("access.log")),
        ..Config::default()
    };
    configure(&mut config);
    config.validate().unwrap();

    let access_log = AccessLog::open(config.access_log.as_deref()).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = Server::start(&config, access_log).unwrap();
    let accept = tokio::spawn(listener::run(listener, server.dispatcher()));

    TestServer {
        addr,
        dir,
        server: Some(server),
        accept,
    }
}

impl TestServer {
    pub fn server(&self) -> &Server {
        self.server.as_ref().unwrap()
    }

    pub fn document_root(&self) -> PathBuf {
        self.dir.path().join("www")
    }

    pub fn access_log_path(&self) -> PathBuf {
        self.dir.path().join("access.log")
    }

    pub fn access_log(&self) -> String {
        fs::read_to_string(self.access_log_path()).unwrap_or_default()
    }

    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    /// Sends `raw` on a fresh connection and returns everything the server
    /// writes before closing.
    pub async fn send(&self, raw: &[u8]) -> Vec<u8> {
        let mut stream = self.connect().await;
        stream.write_all(raw).await.unwrap();
        read_all(&mut stream).await
    }

    pub async fn get(&self, path: &str) -> HttpResponse {
        let raw = format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path);
        HttpResponse::parse(&self.send(raw.as_bytes()).await)
    }

    pub async fn head(&self, path: &str) -> HttpResponse {
        let raw = format!("HEAD {} HTTP/1.0\r\n\r\n", path);
        HttpResponse::parse(&self.send(raw.as_bytes()).await)
    }

    /// Polls `condition` against the server until it holds or a timeout expires.
    pub async fn wait_until(&self, condition: impl Fn(&Server) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + IO_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            if condition(self.server()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    /// Stops accepting, then shuts down and joins every worker. The returned
    /// directory keeps the document root alive until the caller drops it.
    pub async fn stop(mut self) -> tempfile::TempDir {
        self.accept.abort();
        let server = self.server.take().unwrap();
        tokio::task::spawn_blocking(move || server.shutdown())
            .await
            .unwrap();
        self.dir
    }
}

/// Counts this process's descriptors that refer to `path`.
#[cfg(target_os = "linux")]
pub fn open_descriptors_for(path: &Path) -> usize {
    let target = fs::canonicalize(path).unwrap();
    fs::read_dir("/proc/self/fd")
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| fs::read_link(entry.path()).ok())
        .filter(|link| *link == target)
        .count()
}

pub async fn read_all(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    match tokio::time::timeout(IO_TIMEOUT, stream.read_to_end(&mut buf)).await {
        Ok(Ok(_)) => {}
        // A reset after the response still leaves the bytes read so far.
        Ok(Err(_)) => {}
        Err(_) => panic!("server did not close the connection"),
    }
    buf
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status_line: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn parse(raw: &[u8]) -> Self {
        let end = raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .unwrap_or_else(|| panic!("no header terminator in {:?}", String::from_utf8_lossy(raw)));
        let head = std::str::from_utf8(&raw[..end]).unwrap();
        let mut lines = head.split("\r\n");

        let status_line = lines.next().unwrap().to_string();
        let status = status_line.split(' ').nth(1).unwrap().parse().unwrap();
        let headers = lines
            .map(|line| {
                let (k, v) = line.split_once(':').unwrap();
                (k.trim().to_string(), v.trim().to_string())
            })
            .collect();

        Self {
            status_line,
            status,
            headers,
            body: raw[end + 4..].to_vec(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> usize {
        self.header("Content-Length").unwrap().parse().unwrap()
    }
}
