//! Request path resolution beneath a document root.
//!
//! A request path is joined onto the document root, canonicalized by the
//! filesystem (symlinks, `.` and `..` resolved), and accepted only when the
//! canonical target is the canonical root itself or lies strictly inside it.
//! Containment is checked per path component, so `/srv/www-evil` is never
//! considered to be inside `/srv/www`.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::http::parser::MAX_REQUEST_PATH;

/// Upper bound on the joined root + request path, matching `PATH_MAX` on Linux.
pub const MAX_FS_PATH: usize = 4096;

#[derive(Debug)]
pub enum ResolveError {
    /// Root and request path together exceed `MAX_FS_PATH`.
    TooLong,
    /// The target (or the root) does not exist or cannot be canonicalized.
    Inaccessible(io::Error),
    /// The canonical target lies outside the canonical root.
    OutsideRoot,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::TooLong => f.write_str("path exceeds length limit"),
            ResolveError::Inaccessible(e) => write!(f, "path not accessible: {}", e),
            ResolveError::OutsideRoot => f.write_str("path escapes document root"),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Resolves `request_path` against `root`.
pub fn resolve(root: &Path, request_path: &str) -> Result<PathBuf, ResolveError> {
    let joined = join_under(root, request_path);
    if joined.as_os_str().len() > MAX_FS_PATH {
        return Err(ResolveError::TooLong);
    }

    let target = std::fs::canonicalize(&joined).map_err(ResolveError::Inaccessible)?;
    let canonical_root = std::fs::canonicalize(root).map_err(ResolveError::Inaccessible)?;

    if target == canonical_root || target.starts_with(&canonical_root) {
        Ok(target)
    } else {
        Err(ResolveError::OutsideRoot)
    }
}

/// Concatenates `root`, a separator and `request_path` without its leading
/// separator. Unlike `Path::join`, a request path that still begins with `/`
/// after stripping does not replace the root.
pub fn join_under(root: &Path, request_path: &str) -> PathBuf {
    let relative = request_path.strip_prefix('/').unwrap_or(request_path);

    let mut joined = OsString::from(root.as_os_str());
    joined.push("/");
    joined.push(relative);
    PathBuf::from(joined)
}

/// Applies the default-document policy: an empty path or `/` names
/// `index_file` in the root, and a path ending in `/` has `index_file`
/// appended.
///
/// Returns `None` when the result no longer fits the request path limit.
pub fn with_default_document(path: &str, index_file: &str) -> Option<String> {
    let mapped = if path.is_empty() || path == "/" {
        format!("/{}", index_file)
    } else if path.ends_with('/') {
        format!("{}{}", path, index_file)
    } else {
        return Some(path.to_string());
    };

    if mapped.len() > MAX_REQUEST_PATH {
        None
    } else {
        Some(mapped)
    }
}
