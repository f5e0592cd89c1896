//! Append-only request log.
//!
//! Every worker thread writes through the same [`AccessLog`] handle; a single
//! mutex serializes records, and each record is flushed before the lock is
//! released.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use parking_lot::Mutex;

use crate::http::request::Method;
use crate::http::response::StatusCode;

/// One completed or rejected request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub client: SocketAddr,
    /// `None` when the request line could not be parsed.
    pub method: Option<Method>,
    pub path: String,
    pub status: StatusCode,
    pub bytes_sent: u64,
}

impl AccessRecord {
    pub fn method_str(&self) -> &'static str {
        self.method.map(|m| m.as_str()).unwrap_or("UNKNOWN")
    }

    /// Formats the record as a single log line (without trailing newline).
    pub fn format(&self, timestamp: &str) -> String {
        format!(
            "[{}] [{}:{}] \"{} {}\" {} {}",
            timestamp,
            self.client.ip(),
            self.client.port(),
            self.method_str(),
            self.path,
            self.status.as_u16(),
            self.bytes_sent
        )
    }
}

/// Cloneable handle to the shared log sink.
#[derive(Clone)]
pub struct AccessLog {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl AccessLog {
    /// Opens `path` for appending, or logs to stderr when no path is given.
    pub fn open(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("failed to open access log {}", path.display()))?;
                Ok(Self::from_writer(file))
            }
            None => Ok(Self::from_writer(io::stderr())),
        }
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn record(&self, record: &AccessRecord) {
        tracing::info!(
            client = %record.client,
            method = record.method_str(),
            path = %record.path,
            status = record.status.as_u16(),
            bytes = record.bytes_sent,
            "Request completed"
        );

        let line = record.format(&utc_timestamp(SystemTime::now()));

        let mut sink = self.sink.lock();
        let result = writeln!(sink, "{}", line).and_then(|_| sink.flush());
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to write access log record");
        }
    }
}

/// Formats `time` as ISO-8601 UTC with second precision, e.g. `2026-02-16T12:00:00Z`.
pub fn utc_timestamp(time: SystemTime) -> String {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format_timestamp(secs)
}

fn format_timestamp(secs: u64) -> String {
    let days = (secs / 86400) as i64;
    let time_of_day = secs % 86400;
    let (year, month, day) = civil_from_days(days);

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        time_of_day / 3600,
        (time_of_day % 3600) / 60,
        time_of_day % 60
    )
}

/// Convert days since 1970-01-01 to (year, month, day).
fn civil_from_days(days: i64) -> (i64, u64, u64) {
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}
