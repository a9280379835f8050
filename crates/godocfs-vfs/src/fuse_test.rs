// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use fuser::FileType;
use godocfs::{DirEntry, NodeKind, OsError, Renderer, Workspace};
use rstest::{fixture, rstest};

use super::{Config, FOPEN_KEEP_CACHE, Filesystem, page};
use crate::Error;

#[derive(Debug)]
struct EchoRenderer;

#[async_trait::async_trait]
impl Renderer for EchoRenderer {
    async fn render(&self, package: &str) -> godocfs::Result<Bytes> {
        Ok(Bytes::from(format!("package {package}\n")))
    }
}

#[fixture]
fn tmpdir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("godocfs-vfs-test-")
        .tempdir()
        .expect("create a temp directory for test files")
}

fn filesystem(root: &Path) -> Filesystem {
    for dir in ["alpha/inner", "beta", ".git/objects"] {
        std::fs::create_dir_all(root.join(dir)).expect("create test directory");
    }
    std::fs::write(root.join("README"), "not shown").expect("create test file");
    let workspace = Workspace::new(root, Arc::new(EchoRenderer));
    let config = Config {
        uid: nix::unistd::Uid::from_raw(1234),
        gid: nix::unistd::Gid::from_raw(5678),
        ..Default::default()
    };
    Filesystem::new(workspace, &config)
}

fn entry(identity: u64, name: &str) -> DirEntry {
    DirEntry {
        identity,
        kind: NodeKind::Directory,
        name: name.into(),
    }
}

#[rstest]
fn test_required_mount_options_are_read_only() {
    let config = Config::default();
    assert!(config.mount_options.contains(&fuser::MountOption::RO));
    assert!(
        !config.mount_options.contains(&fuser::MountOption::RW),
        "godocfs must never be mounted writable"
    );
}

#[rstest]
#[case(0, &[1, 2, 3])]
#[case(1, &[2, 3])]
#[case(3, &[])]
#[case(10, &[])]
#[case(-1, &[1, 2, 3])]
fn test_page_resumes_after_offset(#[case] offset: i64, #[case] expected: &[u64]) {
    let entries = vec![entry(1, "a"), entry(2, "b"), entry(3, "c")];
    let page = page(&entries, offset);
    let identities: Vec<_> = page.iter().map(|(_, e)| e.identity).collect();
    assert_eq!(identities, expected);
    for (next_offset, entry) in page {
        assert_eq!(
            entries[next_offset as usize - 1], entry,
            "each offset should point just past its own entry"
        );
    }
}

#[rstest]
#[tokio::test]
async fn test_lookup_reports_owner_and_kind(tmpdir: tempfile::TempDir) {
    let fs = filesystem(tmpdir.path());

    let attr = fs.lookup_attr(1, "alpha".as_ref()).await.unwrap();
    assert_eq!(attr.ino, 101);
    assert_eq!(attr.kind, FileType::Directory);
    assert_eq!(attr.perm, 0o555);
    assert_eq!(attr.nlink, 2);
    assert_eq!((attr.uid, attr.gid), (1234, 5678));

    let attr = fs.lookup_attr(101, "godoc".as_ref()).await.unwrap();
    assert_eq!(attr.ino, 10100);
    assert_eq!(attr.kind, FileType::RegularFile);
    assert_eq!(attr.perm, 0o444);
    assert_eq!(attr.size, "package alpha\n".len() as u64);
}

#[rstest]
#[case("README")]
#[case(".git")]
#[case("missing")]
#[tokio::test]
async fn test_lookup_hidden_names_not_found(tmpdir: tempfile::TempDir, #[case] name: &str) {
    let fs = filesystem(tmpdir.path());
    let err = fs.lookup_attr(1, name.as_ref()).await.unwrap_err();
    assert_eq!(err.os_error(), Some(libc::ENOENT));
}

#[rstest]
#[tokio::test]
async fn test_lookup_in_document_is_not_a_directory(tmpdir: tempfile::TempDir) {
    let fs = filesystem(tmpdir.path());
    let err = fs.lookup_attr(100, "alpha".as_ref()).await.unwrap_err();
    assert!(matches!(err, Error::NotADirectory(100)), "{err:?}");
    assert_eq!(err.os_error(), Some(libc::ENOTDIR));
}

#[rstest]
#[tokio::test]
async fn test_open_read_release(tmpdir: tempfile::TempDir) {
    let fs = filesystem(tmpdir.path());
    let (fh, flags) = fs.open_handle(10200, libc::O_RDONLY).await.unwrap();
    assert_ne!(fh, 0, "handle zero is never allocated");
    assert_eq!(flags, FOPEN_KEEP_CACHE);

    let data = fs.read_handle(fh, 0, 4096).unwrap();
    assert_eq!(data, Bytes::from("package beta\n"));
    let data = fs.read_handle(fh, 8, 2).unwrap();
    assert_eq!(data, Bytes::from("be"));
    let data = fs.read_handle(fh, 1000, 10).unwrap();
    assert!(data.is_empty(), "reads past the end should be empty");

    let attr = fs.node_attr(10200, Some(fh)).await.unwrap();
    assert_eq!(attr.size, "package beta\n".len() as u64);

    fs.release_handle(fh).unwrap();
    let err = fs.read_handle(fh, 0, 10).unwrap_err();
    assert_eq!(err.os_error(), Some(libc::EBADF));
}

#[rstest]
#[case(libc::O_WRONLY)]
#[case(libc::O_RDWR)]
#[tokio::test]
async fn test_open_for_write_denied(tmpdir: tempfile::TempDir, #[case] flags: i32) {
    let fs = filesystem(tmpdir.path());
    let err = fs.open_handle(100, flags).await.unwrap_err();
    assert_eq!(err.os_error(), Some(libc::EACCES));
    assert!(fs.handles.is_empty(), "a denied open must not leave a handle");
}

#[rstest]
#[tokio::test]
async fn test_open_directory_is_a_directory(tmpdir: tempfile::TempDir) {
    let fs = filesystem(tmpdir.path());
    let err = fs.open_handle(1, libc::O_RDONLY).await.unwrap_err();
    assert_eq!(err.os_error(), Some(libc::EISDIR));
}

#[rstest]
#[tokio::test]
async fn test_readdir_pages_from_snapshot(tmpdir: tempfile::TempDir) {
    let fs = filesystem(tmpdir.path());
    let fh = fs.opendir_handle(1).await.unwrap();

    let listing = fs.dir_page(fh, 0).unwrap();
    let names: Vec<_> = listing
        .iter()
        .map(|(_, e)| e.name.to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["godoc", "alpha", "beta"]);

    // changes after opendir do not affect the open listing
    std::fs::create_dir(tmpdir.path().join("gamma")).unwrap();
    let rest = fs.dir_page(fh, 1).unwrap();
    let identities: Vec<_> = rest.iter().map(|(_, e)| e.identity).collect();
    assert_eq!(identities, [101, 102]);

    fs.release_handle(fh).unwrap();
    let fh = fs.opendir_handle(1).await.unwrap();
    assert_eq!(fs.dir_page(fh, 0).unwrap().len(), 4);
}

#[rstest]
#[tokio::test]
async fn test_opendir_document_is_not_a_directory(tmpdir: tempfile::TempDir) {
    let fs = filesystem(tmpdir.path());
    let err = fs.opendir_handle(100).await.unwrap_err();
    assert_eq!(err.os_error(), Some(libc::ENOTDIR));
}

#[rstest]
fn test_release_unknown_handle(tmpdir: tempfile::TempDir) {
    let fs = filesystem(tmpdir.path());
    let err = fs.release_handle(42).unwrap_err();
    assert!(matches!(err, Error::BadHandle(42)));
}

#[rstest]
#[tokio::test]
async fn test_deep_tree_is_served(tmpdir: tempfile::TempDir) {
    let deep = "k8s.io/kubernetes/staging/src/k8s.io/apimachinery/pkg/apis/meta/v1/validation";
    let fs = filesystem(tmpdir.path());
    std::fs::create_dir_all(tmpdir.path().join(deep)).unwrap();

    let mut ino = 1;
    for name in deep.split('/') {
        let fh = fs.opendir_handle(ino).await.unwrap();
        let listing = fs.dir_page(fh, 0).unwrap();
        fs.release_handle(fh).unwrap();
        let listed = listing
            .iter()
            .find(|(_, e)| e.name == name)
            .map(|(_, e)| e.identity)
            .unwrap_or_else(|| panic!("{name} should be listed under {ino}"));

        let attr = fs.lookup_attr(ino, name.as_ref()).await.unwrap();
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.ino, listed, "lookup and listing agree on {name}");
        ino = attr.ino;
    }

    let doc = fs.lookup_attr(ino, "godoc".as_ref()).await.unwrap();
    let (fh, _) = fs.open_handle(doc.ino, libc::O_RDONLY).await.unwrap();
    let data = fs.read_handle(fh, 0, 4096).unwrap();
    assert_eq!(data, Bytes::from(format!("package {deep}\n")));
    assert_eq!(doc.size, data.len() as u64);
}

#[rstest]
#[tokio::test]
async fn test_forgotten_nodes_are_released(tmpdir: tempfile::TempDir) {
    let fs = filesystem(tmpdir.path());
    let attr = fs.lookup_attr(1, "alpha".as_ref()).await.unwrap();
    fs.lookup_attr(1, "alpha".as_ref()).await.unwrap();
    assert_eq!(fs.nodes.get(&attr.ino).map(|k| k.lookups), Some(2));

    fs.forget_node(attr.ino, 1);
    assert!(fs.nodes.contains_key(&attr.ino), "one lookup is still held");
    fs.forget_node(attr.ino, 1);
    assert!(!fs.nodes.contains_key(&attr.ino));

    // shallow identities can still be found without the table
    let attr = fs.node_attr(attr.ino, None).await.unwrap();
    assert_eq!(attr.kind, FileType::Directory);
}

#[rstest]
#[tokio::test]
async fn test_failed_lookup_is_not_remembered(tmpdir: tempfile::TempDir) {
    let fs = filesystem(tmpdir.path());
    fs.lookup_attr(1, "missing".as_ref()).await.unwrap_err();
    assert!(fs.nodes.is_empty());
}
