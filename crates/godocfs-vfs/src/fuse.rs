// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use dashmap::DashMap;
use fuser::consts::*;
use dashmap::mapref::entry::Entry;
use fuser::{
    FileAttr, FileType, MountOption, ReplyData, ReplyDirectory, ReplyEntry, ReplyOpen, Request,
};
use godocfs::identity::ROOT_IDENTITY;
use godocfs::{Attributes, DirEntry, DirNode, DocNode, Node, NodeKind, OsError, Owner, Workspace};

use crate::{Error, Result};

#[cfg(test)]
#[path = "./fuse_test.rs"]
mod fuse_test;

/// The name reported for the mounted filesystem
pub const FS_NAME: &str = "godocfs";

/// Options to configure the FUSE filesystem and
/// its behavior at runtime
#[derive(Debug, Clone)]
pub struct Config {
    /// The user id that should own all files and directories
    pub uid: nix::unistd::Uid,
    /// The group id that should own all files and directories
    pub gid: nix::unistd::Gid,
    /// Mount options to be used when setting up
    pub mount_options: HashSet<MountOption>,
    /// How long the kernel may cache entries and attributes
    pub ttl: Duration,
}

impl Config {
    /// The mount options that every godocfs mount must have.
    pub fn required_mount_options() -> Vec<MountOption> {
        vec![
            MountOption::RO,
            MountOption::NoDev,
            MountOption::NoSuid,
            MountOption::FSName(FS_NAME.into()),
            MountOption::Subtype(FS_NAME.into()),
        ]
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            uid: nix::unistd::geteuid(),
            gid: nix::unistd::getegid(),
            mount_options: Self::required_mount_options().into_iter().collect(),
            ttl: Duration::from_secs(60),
        }
    }
}

/// Resolves inodes into workspace nodes and owns the open handles
struct Filesystem {
    workspace: Arc<Workspace>,
    ttl: Duration,
    /// Every node that the kernel currently holds a reference to
    nodes: DashMap<u64, Known>,
    next_handle: AtomicU64,
    handles: DashMap<u64, Handle>,
}

/// Where a node that was handed to the kernel can be found again.
///
/// Identities of deep directories wrap around and cannot be decoded
/// back into a path, so every node returned from a lookup is kept
/// here until the kernel forgets it.
struct Known {
    /// The directory itself, or the directory that holds the document
    dir: DirNode,
    kind: NodeKind,
    /// The number of lookups that the kernel has not yet forgotten
    lookups: u64,
}

enum Handle {
    /// An opened document, rendered once when it was opened
    Doc(DocNode),
    /// The entries of a directory as of the time it was opened
    Dir { entries: Vec<DirEntry> },
}

impl Filesystem {
    // establish a block size to report - this information
    // is not necessarily accurate, but commands like du
    // expect something realistic
    const BLOCK_SIZE: u32 = 512;

    fn new(workspace: Workspace, opts: &Config) -> Self {
        let owner = Owner {
            uid: opts.uid.as_raw(),
            gid: opts.gid.as_raw(),
        };
        Self {
            workspace: Arc::new(workspace.with_owner(owner)),
            ttl: opts.ttl,
            nodes: Default::default(),
            // we do not allocate handle 0, so skip it for now
            next_handle: AtomicU64::new(1),
            handles: Default::default(),
        }
    }

    fn allocate_handle_no(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn allocate_handle(&self, data: Handle) -> u64 {
        loop {
            let id = self.allocate_handle_no();
            if id == 0 {
                // the 'empty/zero' handle value is never allocated
                // so that the explicit lack of handle can be detected in
                // function calls that take handles or inodes
                continue;
            }
            match self.handles.entry(id) {
                // continue until we find a vacant entry for this handle
                Entry::Occupied(_) => continue,
                Entry::Vacant(v) => {
                    v.insert(data);
                    break id;
                }
            }
        }
    }

    fn attr_from_attributes(&self, attrs: &Attributes) -> FileAttr {
        // nothing in the tree keeps timestamps of its own
        let now = SystemTime::now();
        let kind = match attrs.kind {
            NodeKind::Directory => FileType::Directory,
            NodeKind::Document => FileType::RegularFile,
        };
        FileAttr {
            ino: attrs.identity,
            size: attrs.size,
            blocks: (attrs.size / Self::BLOCK_SIZE as u64) + 1,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            kind,
            perm: attrs.perm,
            nlink: if kind == FileType::Directory { 2 } else { 1 },
            uid: attrs.uid,
            gid: attrs.gid,
            rdev: 0,
            blksize: Self::BLOCK_SIZE,
            flags: 0,
        }
    }

    /// Find the node for an inode, preferring what the kernel was
    /// last told over decoding the identity.
    async fn resolve(&self, ino: u64) -> Result<Node> {
        let known = (ino != ROOT_IDENTITY)
            .then(|| self.nodes.get(&ino))
            .flatten()
            .map(|known| (known.kind, known.dir.clone()));
        let node = match known {
            Some((NodeKind::Directory, dir)) => Node::Dir(dir),
            Some((NodeKind::Document, dir)) => Node::Doc(dir.doc()),
            None => self.workspace.resolve(ino).await?,
        };
        Ok(node)
    }

    async fn resolve_dir(&self, ino: u64) -> Result<DirNode> {
        match self.resolve(ino).await? {
            Node::Dir(dir) => Ok(dir),
            Node::Doc(_) => Err(Error::NotADirectory(ino)),
        }
    }

    /// Record one more kernel reference to a node found under `parent`.
    fn remember(&self, parent: &DirNode, node: &Node) {
        let (dir, kind) = match node {
            Node::Dir(dir) => (dir.clone(), NodeKind::Directory),
            Node::Doc(_) => (parent.clone(), NodeKind::Document),
        };
        match self.nodes.entry(node.identity()) {
            Entry::Occupied(mut entry) => {
                // the latest lookup decides where an identity points
                let known = entry.get_mut();
                known.dir = dir;
                known.kind = kind;
                known.lookups += 1;
            }
            Entry::Vacant(entry) => {
                entry.insert(Known {
                    dir,
                    kind,
                    lookups: 1,
                });
            }
        }
    }

    /// Drop `nlookup` kernel references to a node.
    fn forget_node(&self, ino: u64, nlookup: u64) {
        if let Entry::Occupied(mut entry) = self.nodes.entry(ino) {
            let known = entry.get_mut();
            known.lookups = known.lookups.saturating_sub(nlookup);
            if known.lookups == 0 {
                entry.remove();
            }
        }
    }

    async fn lookup_attr(&self, parent: u64, name: &OsStr) -> Result<FileAttr> {
        let dir = self.resolve_dir(parent).await?;
        let mut node = dir.lookup(name).await?;
        let attrs = node.attributes().await?;
        self.remember(&dir, &node);
        Ok(self.attr_from_attributes(&attrs))
    }

    async fn node_attr(&self, ino: u64, fh: Option<u64>) -> Result<FileAttr> {
        // an open document answers with the content it will serve, so
        // that the size reported always matches what can be read
        if let Some(attrs) = fh
            .and_then(|fh| self.handles.get(&fh))
            .and_then(|handle| match handle.value() {
                Handle::Doc(doc) if doc.identity() == ino => doc.rendered_attributes(),
                _ => None,
            })
        {
            return Ok(self.attr_from_attributes(&attrs));
        }
        let mut node = self.resolve(ino).await?;
        let attrs = node.attributes().await?;
        Ok(self.attr_from_attributes(&attrs))
    }

    /// Render the document and keep it open, returning the new handle
    /// and the open flags to report.
    async fn open_handle(&self, ino: u64, flags: i32) -> Result<(u64, u32)> {
        let mut doc = match self.resolve(ino).await? {
            Node::Doc(doc) => doc,
            Node::Dir(_) => return Err(Error::IsADirectory(ino)),
        };
        let opened = doc.open(flags)?;
        doc.render().await?;
        let fh = self.allocate_handle(Handle::Doc(doc));
        let flags = if opened.keep_cache {
            FOPEN_KEEP_CACHE
        } else {
            0
        };
        Ok((fh, flags))
    }

    fn read_handle(&self, fh: u64, offset: i64, size: u32) -> Result<Bytes> {
        let Some(handle) = self.handles.get(&fh) else {
            return Err(Error::BadHandle(fh));
        };
        match handle.value() {
            Handle::Doc(doc) => Ok(doc.read(offset.max(0) as u64, size)),
            Handle::Dir { .. } => Err(Error::IsADirectory(fh)),
        }
    }

    async fn opendir_handle(&self, ino: u64) -> Result<u64> {
        let dir = self.resolve_dir(ino).await?;
        let entries = dir.read_dir_all().await?;
        Ok(self.allocate_handle(Handle::Dir { entries }))
    }

    /// The directory entries after `offset`, each with the offset of
    /// the entry that follows it.
    fn dir_page(&self, fh: u64, offset: i64) -> Result<Vec<(i64, DirEntry)>> {
        let Some(handle) = self.handles.get(&fh) else {
            return Err(Error::BadHandle(fh));
        };
        let Handle::Dir { entries } = handle.value() else {
            return Err(Error::NotADirectory(fh));
        };
        Ok(page(entries, offset))
    }

    fn release_handle(&self, fh: u64) -> Result<()> {
        match self.handles.remove(&fh) {
            Some(_) => Ok(()),
            None => Err(Error::BadHandle(fh)),
        }
    }
}

/// Select the entries of a directory listing that come after `offset`.
///
/// Offsets are positions in the listing: the entry at index `i` is
/// returned with offset `i + 1`, which is where the kernel resumes.
fn page(entries: &[DirEntry], offset: i64) -> Vec<(i64, DirEntry)> {
    let skip = usize::try_from(offset).unwrap_or(0);
    entries
        .iter()
        .enumerate()
        .skip(skip)
        .map(|(i, entry)| (i as i64 + 1, entry.clone()))
        .collect()
}

/// Extract the ok value from a result, or reply with an error in FUSE
macro_rules! unwrap {
    ($reply:ident, $op:expr) => {{
        match $op {
            Ok(r) => r,
            Err(err) => err!($reply, err),
        }
    }};
}

/// Reply with an error to FUSE and return
macro_rules! err {
    ($reply:ident, $err:expr) => {{
        let err = $err;
        let errno = err.os_error().unwrap_or(libc::EIO);
        if errno == libc::ENOENT {
            // the kernel probes for names that do not exist all the time
            tracing::debug!("{err}");
        } else {
            tracing::error!("{err:?}");
        }
        $reply.error(errno);
        return;
    }};
}

// these functions mirror the actual fuse ones and
// so we don't have much control over the shape
#[allow(clippy::too_many_arguments)]
impl Filesystem {
    async fn statfs(&self, _ino: u64, reply: fuser::ReplyStatfs) {
        // nothing is stored, so there is nothing to count
        reply.statfs(0, 0, 0, 0, 0, Self::BLOCK_SIZE, 255, Self::BLOCK_SIZE)
    }

    async fn lookup(&self, parent: u64, name: OsString, reply: ReplyEntry) {
        tracing::trace!("lookup {name:?} in {parent}");
        let attr = unwrap!(reply, self.lookup_attr(parent, &name).await);
        reply.entry(&self.ttl, &attr, 0);
    }

    async fn forget(&self, ino: u64, nlookup: u64) {
        tracing::trace!("forget {ino} x{nlookup}");
        self.forget_node(ino, nlookup);
    }

    async fn getattr(&self, ino: u64, fh: Option<u64>, reply: fuser::ReplyAttr) {
        tracing::trace!("getattr {ino}");
        let attr = unwrap!(reply, self.node_attr(ino, fh).await);
        reply.attr(&self.ttl, &attr);
    }

    async fn open(&self, ino: u64, flags: i32, reply: ReplyOpen) {
        let (fh, flags) = unwrap!(reply, self.open_handle(ino, flags).await);
        tracing::trace!("open {ino} = {fh}");
        reply.opened(fh, flags);
    }

    async fn read(
        &self,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let data = unwrap!(reply, self.read_handle(fh, offset, size));
        tracing::trace!("read {fh} = {}/{size}", data.len());
        reply.data(&data);
    }

    async fn release(
        &self,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        // ignore flush because we don't support write operations
        _flush: bool,
        reply: fuser::ReplyEmpty,
    ) {
        unwrap!(reply, self.release_handle(fh));
        reply.ok();
    }

    async fn opendir(&self, ino: u64, _flags: i32, reply: ReplyOpen) {
        let fh = unwrap!(reply, self.opendir_handle(ino).await);
        tracing::trace!("opendir {ino} = {fh}");
        #[allow(unused_mut)]
        let mut flags = 0;
        #[cfg(feature = "fuse-backend-abi-7-28")]
        {
            // listings are served from the snapshot taken above
            flags |= FOPEN_CACHE_DIR;
        }
        reply.opened(fh, flags);
    }

    async fn readdir(&self, _ino: u64, fh: u64, offset: i64, mut reply: ReplyDirectory) {
        tracing::trace!("readdir {fh} @{offset}");
        let entries = unwrap!(reply, self.dir_page(fh, offset));
        for (next_offset, entry) in entries {
            let kind = match entry.kind {
                NodeKind::Directory => FileType::Directory,
                NodeKind::Document => FileType::RegularFile,
            };
            let buffer_full = reply.add(entry.identity, next_offset, kind, &entry.name);
            if buffer_full {
                break;
            }
        }
        reply.ok();
    }

    async fn releasedir(&self, _ino: u64, fh: u64, _flags: i32, reply: fuser::ReplyEmpty) {
        unwrap!(reply, self.release_handle(fh));
        reply.ok()
    }
}

/// Represents a connected FUSE session.
///
/// This implements the [`fuser::Filesystem`] trait, receives
/// all requests and arranges for their async execution against
/// the projected workspace.
pub struct Session {
    fs: Arc<Filesystem>,
}

impl Session {
    /// Construct a new session which serves the provided workspace
    /// in its filesystem
    pub fn new(workspace: Workspace, opts: Config) -> Self {
        Self {
            fs: Arc::new(Filesystem::new(workspace, &opts)),
        }
    }
}

impl fuser::Filesystem for Session {
    fn init(
        &mut self,
        _req: &Request<'_>,
        config: &mut fuser::KernelConfig,
    ) -> std::result::Result<(), libc::c_int> {
        const DESIRED: &[(&str, u32)] = &[
            ("FUSE_ASYNC_READ", FUSE_ASYNC_READ),
            ("FUSE_FILE_OPS", FUSE_FILE_OPS),
            #[cfg(feature = "fuse-backend-abi-7-25")]
            ("FUSE_PARALLEL_DIROPS", FUSE_PARALLEL_DIROPS),
        ];
        let all_desired = DESIRED.iter().fold(0, |prev, (_, i)| prev | i);
        if let Err(unsupported) = config.add_capabilities(all_desired) {
            let rejected = DESIRED
                .iter()
                .filter_map(|d| (d.1 & unsupported != 0).then_some(d.0));
            for name in rejected {
                tracing::warn!("FUSE feature rejected: {name}");
            }
            if config.add_capabilities(all_desired & !unsupported).is_err() {
                return Err(libc::ENOSYS);
            }
        }
        tracing::info!(
            root = %self.fs.workspace.source_root().display(),
            "Filesystem initialized"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        tracing::info!("Filesystem destroyed");
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: fuser::ReplyStatfs) {
        let fs = Arc::clone(&self.fs);
        tokio::task::spawn(async move { fs.statfs(ino, reply).await });
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = name.to_owned();
        let fs = Arc::clone(&self.fs);
        tokio::task::spawn(async move { fs.lookup(parent, name, reply).await });
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        let fs = Arc::clone(&self.fs);
        tokio::task::spawn(async move { fs.forget(ino, nlookup).await });
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, fh: Option<u64>, reply: fuser::ReplyAttr) {
        let fs = Arc::clone(&self.fs);
        tokio::task::spawn(async move { fs.getattr(ino, fh, reply).await });
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let fs = Arc::clone(&self.fs);
        tokio::task::spawn(async move { fs.open(ino, flags, reply).await });
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let fs = Arc::clone(&self.fs);
        tokio::task::spawn(async move {
            fs.read(ino, fh, offset, size, flags, lock_owner, reply)
                .await
        });
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        flags: i32,
        lock_owner: Option<u64>,
        flush: bool,
        reply: fuser::ReplyEmpty,
    ) {
        let fs = Arc::clone(&self.fs);
        tokio::task::spawn(async move {
            fs.release(ino, fh, flags, lock_owner, flush, reply).await
        });
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let fs = Arc::clone(&self.fs);
        tokio::task::spawn(async move { fs.opendir(ino, flags, reply).await });
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        reply: ReplyDirectory,
    ) {
        let fs = Arc::clone(&self.fs);
        tokio::task::spawn(async move { fs.readdir(ino, fh, offset, reply).await });
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        flags: i32,
        reply: fuser::ReplyEmpty,
    ) {
        let fs = Arc::clone(&self.fs);
        tokio::task::spawn(async move { fs.releasedir(ino, fh, flags, reply).await });
    }
}
