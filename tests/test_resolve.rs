//! Tests for request path resolution beneath the document root

use std::fs;
use std::path::Path;

use docserve::http::resolve::{resolve, ResolveError, MAX_FS_PATH};

/// Layout:
///
/// ```text
/// base/
///   www/index.html
///   www/sub/page.html
///   www-evil/secret.txt
///   outside.txt
/// ```
fn layout() -> tempfile::TempDir {
    let base = tempfile::tempdir().unwrap();
    let www = base.path().join("www");
    fs::create_dir_all(www.join("sub")).unwrap();
    fs::write(www.join("index.html"), "index").unwrap();
    fs::write(www.join("sub/page.html"), "page").unwrap();
    fs::create_dir_all(base.path().join("www-evil")).unwrap();
    fs::write(base.path().join("www-evil/secret.txt"), "secret").unwrap();
    fs::write(base.path().join("outside.txt"), "outside").unwrap();
    base
}

fn root(base: &tempfile::TempDir) -> std::path::PathBuf {
    base.path().join("www")
}

#[test]
fn test_resolve_file_inside_root() {
    let base = layout();
    let resolved = resolve(&root(&base), "/sub/page.html").unwrap();

    assert_eq!(resolved, fs::canonicalize(root(&base).join("sub/page.html")).unwrap());
}

#[test]
fn test_resolve_without_leading_slash() {
    let base = layout();
    assert!(resolve(&root(&base), "index.html").is_ok());
}

#[test]
fn test_resolve_root_itself_is_accepted() {
    let base = layout();
    let resolved = resolve(&root(&base), "/").unwrap();

    assert_eq!(resolved, fs::canonicalize(root(&base)).unwrap());
}

#[test]
fn test_resolve_dot_segments_inside_root() {
    let base = layout();
    assert!(resolve(&root(&base), "/sub/../sub/./page.html").is_ok());
}

#[test]
fn test_resolve_rejects_traversal() {
    let base = layout();
    let www = root(&base);

    for path in [
        "/../outside.txt",
        "/sub/../../outside.txt",
        "/../www-evil/secret.txt",
        "/..",
        "/sub/../..",
    ] {
        assert!(
            matches!(resolve(&www, path), Err(ResolveError::OutsideRoot)),
            "{} escaped the root",
            path
        );
    }
}

#[test]
fn test_resolve_rejects_deep_traversal() {
    let base = layout();
    assert!(resolve(&root(&base), "../../../../../../../../etc/passwd").is_err());
    assert!(resolve(&root(&base), "/%2e%2e/outside.txt").is_err());
}

#[test]
fn test_resolve_double_slash_stays_under_root() {
    let base = layout();
    let result = resolve(&root(&base), "//etc/passwd");

    assert!(matches!(result, Err(ResolveError::Inaccessible(_))));
}

#[test]
fn test_resolve_missing_file() {
    let base = layout();
    let result = resolve(&root(&base), "/nope.html");

    assert!(matches!(result, Err(ResolveError::Inaccessible(_))));
}

#[test]
fn test_resolve_missing_root() {
    let base = layout();
    let result = resolve(&base.path().join("absent"), "/index.html");

    assert!(matches!(result, Err(ResolveError::Inaccessible(_))));
}

#[test]
fn test_resolve_length_limit() {
    let base = layout();
    let path = format!("/{}", "a/".repeat(MAX_FS_PATH / 2));

    assert!(matches!(resolve(&root(&base), &path), Err(ResolveError::TooLong)));
}

#[cfg(unix)]
#[test]
fn test_resolve_symlink_escaping_root_is_rejected() {
    let base = layout();
    let www = root(&base);
    std::os::unix::fs::symlink(base.path().join("outside.txt"), www.join("link.txt")).unwrap();
    std::os::unix::fs::symlink(base.path().join("www-evil"), www.join("evil")).unwrap();

    assert!(matches!(resolve(&www, "/link.txt"), Err(ResolveError::OutsideRoot)));
    assert!(matches!(resolve(&www, "/evil/secret.txt"), Err(ResolveError::OutsideRoot)));
}

#[cfg(unix)]
#[test]
fn test_resolve_symlink_inside_root_is_followed() {
    let base = layout();
    let www = root(&base);
    std::os::unix::fs::symlink(www.join("sub/page.html"), www.join("alias.html")).unwrap();

    let resolved = resolve(&www, "/alias.html").unwrap();
    assert!(resolved.ends_with(Path::new("sub/page.html")));
}

#[cfg(unix)]
#[test]
fn test_resolve_through_symlinked_root() {
    let base = layout();
    let link = base.path().join("www-link");
    std::os::unix::fs::symlink(root(&base), &link).unwrap();

    assert!(resolve(&link, "/index.html").is_ok());
    assert!(matches!(resolve(&link, "/../outside.txt"), Err(ResolveError::OutsideRoot)));
}
