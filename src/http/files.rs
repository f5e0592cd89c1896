//! Maps a parsed request onto a servable file.

use std::path::PathBuf;

use crate::http::mime::content_type_for;
use crate::http::parser::strip_query;
use crate::http::request::Request;
use crate::http::resolve::{join_under, resolve, with_default_document};
use crate::http::response::StatusCode;

/// Files larger than this are never served.
pub const MAX_FILE_SIZE: u64 = 128 * 1024 * 1024;

/// Read-only serving parameters shared by every connection of every worker.
#[derive(Debug, Clone)]
pub struct Site {
    pub document_root: PathBuf,
    pub index_file: String,
    /// Use `sendfile(2)` for bodies where the platform supports it.
    pub sendfile: bool,
}

/// A file that passed every check and may be opened and streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub path: PathBuf,
    pub size: u64,
    pub content_type: &'static str,
}

impl Site {
    pub fn new(document_root: impl Into<PathBuf>, index_file: impl Into<String>) -> Self {
        Self {
            document_root: document_root.into(),
            index_file: index_file.into(),
            sendfile: true,
        }
    }

    /// Resolves the request to a regular file under the document root.
    ///
    /// The file is not opened here; size and type checks happen on metadata
    /// only so that oversized files are refused before any descriptor exists.
    pub fn prepare(&self, request: &Request) -> Result<Prepared, StatusCode> {
        let path = strip_query(&request.path);
        let path = with_default_document(path, &self.index_file).ok_or(StatusCode::BadRequest)?;

        let resolved = match resolve(&self.document_root, &path) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::debug!(path = %request.path, error = %e, "Path rejected");
                return Err(if join_under(&self.document_root, &path).is_dir() {
                    StatusCode::Forbidden
                } else {
                    StatusCode::NotFound
                });
            }
        };

        let metadata = std::fs::metadata(&resolved).map_err(|_| StatusCode::NotFound)?;
        if !metadata.is_file() {
            return Err(StatusCode::Forbidden);
        }
        if metadata.len() > MAX_FILE_SIZE {
            return Err(StatusCode::PayloadTooLarge);
        }

        Ok(Prepared {
            content_type: content_type_for(&resolved),
            size: metadata.len(),
            path: resolved,
        })
    }
}
