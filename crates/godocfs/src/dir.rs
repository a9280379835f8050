// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::identity::{self, DOC_ORDINAL, MAX_ORDINAL};
use crate::{Attributes, DOC_NAME, DirEntry, DocNode, Error, Node, NodeKind, Result, Workspace};

#[cfg(test)]
#[path = "./dir_test.rs"]
mod dir_test;

/// A real directory of the source tree.
#[derive(Debug, Clone)]
pub struct DirNode {
    workspace: Arc<Workspace>,
    identity: u64,
    path: PathBuf,
    name: OsString,
}

impl DirNode {
    // directories can be listed and traversed, never written
    const PERM: u16 = 0o555;

    pub(crate) fn new(
        workspace: Arc<Workspace>,
        identity: u64,
        path: PathBuf,
        name: OsString,
    ) -> Self {
        Self {
            workspace,
            identity,
            path,
            name,
        }
    }

    pub fn identity(&self) -> u64 {
        self.identity
    }

    /// The real directory that this node mirrors.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &OsStr {
        &self.name
    }

    pub fn attributes(&self) -> Attributes {
        let owner = self.workspace.owner();
        Attributes {
            identity: self.identity,
            kind: NodeKind::Directory,
            perm: Self::PERM,
            size: 0,
            uid: owner.uid,
            gid: owner.gid,
        }
    }

    /// The synthetic document of this directory.
    pub fn doc(&self) -> DocNode {
        DocNode::new(
            Arc::clone(&self.workspace),
            identity::child_identity(self.identity, DOC_ORDINAL),
            self.identity,
            self.path.join(DOC_NAME),
        )
    }

    /// Find the child with the given name.
    pub async fn lookup(&self, name: &OsStr) -> Result<Node> {
        if name == DOC_NAME {
            return Ok(Node::Doc(self.doc()));
        }
        let subdirs = self.scan().await?;
        match subdirs.into_iter().find(|(_, n)| n == name) {
            Some((ordinal, name)) => Ok(Node::Dir(self.child(ordinal, name))),
            None => Err(Error::NotFound(self.path.join(name).display().to_string())),
        }
    }

    /// List the children of this directory.
    ///
    /// The synthetic document always comes first, followed by each
    /// visible subdirectory in scan order.
    pub async fn read_dir_all(&self) -> Result<Vec<DirEntry>> {
        let subdirs = self.scan().await?;
        let mut entries = Vec::with_capacity(subdirs.len() + 1);
        entries.push(DirEntry {
            identity: identity::child_identity(self.identity, DOC_ORDINAL),
            kind: NodeKind::Document,
            name: OsString::from(DOC_NAME),
        });
        for (ordinal, name) in subdirs {
            entries.push(DirEntry {
                identity: identity::child_identity(self.identity, ordinal),
                kind: NodeKind::Directory,
                name,
            });
        }
        Ok(entries)
    }

    /// Find the subdirectory with the given ordinal.
    pub(crate) async fn child_at(&self, ordinal: u64) -> Result<DirNode> {
        let subdirs = self.scan().await?;
        match subdirs.into_iter().find(|(o, _)| *o == ordinal) {
            Some((ordinal, name)) => Ok(self.child(ordinal, name)),
            None => Err(Error::NotFound(format!(
                "entry {ordinal} of {}",
                self.path.display()
            ))),
        }
    }

    fn child(&self, ordinal: u64, name: OsString) -> DirNode {
        DirNode::new(
            Arc::clone(&self.workspace),
            identity::child_identity(self.identity, ordinal),
            self.path.join(&name),
            name,
        )
    }

    /// Read the visible subdirectories of this directory, with their ordinals.
    ///
    /// Entries are ordered by name so that ordinals do not change
    /// between scans of an unchanged directory.
    async fn scan(&self) -> Result<Vec<(u64, OsString)>> {
        let scan_err = |err: io::Error| Error::ScanFailure(self.path.clone(), err);
        let mut read_dir = match tokio::fs::read_dir(&self.path).await {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound(self.path.display().to_string()));
            }
            Err(err) => return Err(scan_err(err)),
        };

        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(scan_err)? {
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                // removed while we were reading the directory
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(scan_err(err)),
            };
            // symlinks are reported as such and not followed
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if self.workspace.is_hidden(&name) {
                continue;
            }
            names.push(name);
        }
        names.sort();

        if names.len() as u64 > MAX_ORDINAL {
            tracing::warn!(
                path = %self.path.display(),
                count = names.len(),
                "too many subdirectories, only the first {MAX_ORDINAL} are visible"
            );
            names.truncate(MAX_ORDINAL as usize);
        }
        tracing::trace!(path = %self.path.display(), count = names.len(), "scanned directory");
        Ok((1..).zip(names).collect())
    }
}
