use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use quay::http::request::RequestBuilder;
use quay::http::resolver::{Resolution, Resolver};
use tempfile::TempDir;

fn write_file(path: &Path, contents: &[u8], mode: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
}

/// `root/` with `index.html`, `docs/guide.txt`, an index-less `empty/`
/// directory and a private file. `secret.txt` sits next to the root.
fn site() -> (TempDir, Resolver) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");

    write_file(&root.join("index.html"), b"<h1>home</h1>", 0o644);
    write_file(&root.join("docs/guide.txt"), b"guide", 0o644);
    write_file(&root.join("private.txt"), b"hidden", 0o600);
    fs::create_dir_all(root.join("empty")).unwrap();
    write_file(&dir.path().join("secret.txt"), b"top secret", 0o644);

    let resolver = Resolver::new(&root, "index.html").unwrap();
    (dir, resolver)
}

fn expect_file(resolution: Resolution) -> quay::http::resolver::StaticFile {
    match resolution {
        Resolution::FileRequest(file) => file,
        other => panic!("expected a file, got {:?}", other),
    }
}

#[test]
fn test_serves_existing_file() {
    let (_dir, resolver) = site();
    let file = expect_file(resolver.resolve_path("/docs/guide.txt"));
    assert_eq!(&file.contents[..], b"guide");
    assert_eq!(file.content_type, "text/plain; charset=utf-8");
    assert!(file.path.starts_with(resolver.root()));
}

#[test]
fn test_directory_serves_index() {
    let (_dir, resolver) = site();
    let file = expect_file(resolver.resolve_path("/"));
    assert_eq!(&file.contents[..], b"<h1>home</h1>");
    assert_eq!(file.content_type, "text/html; charset=utf-8");
}

#[test]
fn test_directory_without_index_is_forbidden() {
    let (_dir, resolver) = site();
    assert!(matches!(
        resolver.resolve_path("/empty/"),
        Resolution::ForbiddenRequest
    ));
}

#[test]
fn test_missing_file_is_no_resource() {
    let (_dir, resolver) = site();
    assert!(matches!(
        resolver.resolve_path("/nope.html"),
        Resolution::NoResource
    ));
    assert!(matches!(
        resolver.resolve_path("/docs/guide.txt/deeper"),
        Resolution::NoResource
    ));
}

#[test]
fn test_parent_segments_are_forbidden() {
    let (_dir, resolver) = site();
    for path in ["/../secret.txt", "/docs/../../secret.txt", "/docs/../index.html", "/.."] {
        assert!(
            matches!(resolver.resolve_path(path), Resolution::ForbiddenRequest),
            "{} must be forbidden",
            path
        );
    }
}

#[test]
fn test_symlink_out_of_root_is_forbidden() {
    let (dir, resolver) = site();
    std::os::unix::fs::symlink(
        dir.path().join("secret.txt"),
        resolver.root().join("link.txt"),
    )
    .unwrap();

    assert!(matches!(
        resolver.resolve_path("/link.txt"),
        Resolution::ForbiddenRequest
    ));
}

#[test]
fn test_file_without_world_read_is_forbidden() {
    let (_dir, resolver) = site();
    assert!(matches!(
        resolver.resolve_path("/private.txt"),
        Resolution::ForbiddenRequest
    ));
}

#[test]
fn test_relative_path_is_forbidden() {
    let (_dir, resolver) = site();
    assert!(matches!(
        resolver.resolve_path("index.html"),
        Resolution::ForbiddenRequest
    ));
}

#[test]
fn test_resolve_ignores_query_string() {
    let (_dir, resolver) = site();
    let req = RequestBuilder::new()
        .path("/docs/guide.txt?v=2")
        .build()
        .unwrap();
    let file = expect_file(resolver.resolve(&req));
    assert_eq!(&file.contents[..], b"guide");
}

#[test]
fn test_root_must_be_a_directory() {
    let (dir, _resolver) = site();
    assert!(Resolver::new(dir.path().join("secret.txt"), "index.html").is_err());
    assert!(Resolver::new(dir.path().join("missing"), "index.html").is_err());
}
