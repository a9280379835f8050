// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;

use crate::package::package_identifier;
use crate::{Attributes, Error, NodeKind, Result, Workspace};

#[cfg(test)]
#[path = "./doc_test.rs"]
mod doc_test;

/// The synthetic documentation file of one directory.
///
/// The content is produced by the workspace renderer the first time it
/// is needed and then kept for as long as this instance lives. A failed
/// render leaves the node unrendered.
#[derive(Debug)]
pub struct DocNode {
    workspace: Arc<Workspace>,
    identity: u64,
    parent_identity: u64,
    path: PathBuf,
    content: Option<Bytes>,
}

/// Advice to the transport about an opened document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opened {
    /// The content will not change while the handle is open and
    /// may be cached by the client.
    pub keep_cache: bool,
}

impl DocNode {
    const PERM: u16 = 0o444;

    pub(crate) fn new(
        workspace: Arc<Workspace>,
        identity: u64,
        parent_identity: u64,
        path: PathBuf,
    ) -> Self {
        Self {
            workspace,
            identity,
            parent_identity,
            path,
            content: None,
        }
    }

    pub fn identity(&self) -> u64 {
        self.identity
    }

    pub fn parent_identity(&self) -> u64 {
        self.parent_identity
    }

    /// The location of this document inside of the mirrored directory.
    ///
    /// Nothing exists at this path on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The identifier of the package that this document describes.
    pub fn package(&self) -> String {
        package_identifier(self.workspace.source_root(), &self.path)
    }

    pub fn is_rendered(&self) -> bool {
        self.content.is_some()
    }

    /// The rendered content, rendering it now if needed.
    pub async fn render(&mut self) -> Result<&Bytes> {
        let content = match self.content.take() {
            Some(content) => content,
            None => {
                let package = self.package();
                tracing::debug!(%package, "rendering documentation");
                self.workspace.renderer().render(&package).await?
            }
        };
        let content: &Bytes = self.content.insert(content);
        Ok(content)
    }

    /// Report the attributes of this document.
    ///
    /// The size must be exact, so the content is rendered here.
    pub async fn attributes(&mut self) -> Result<Attributes> {
        let size = self.render().await?.len() as u64;
        Ok(self.attributes_with_size(size))
    }

    /// The attributes of this document if it has already been rendered.
    pub fn rendered_attributes(&self) -> Option<Attributes> {
        self.content
            .as_ref()
            .map(|content| self.attributes_with_size(content.len() as u64))
    }

    fn attributes_with_size(&self, size: u64) -> Attributes {
        let owner = self.workspace.owner();
        Attributes {
            identity: self.identity,
            kind: NodeKind::Document,
            perm: Self::PERM,
            size,
            uid: owner.uid,
            gid: owner.gid,
        }
    }

    /// Check that the document may be opened with the given `open(2)` flags.
    pub fn open(&self, flags: i32) -> Result<Opened> {
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            return Err(Error::PermissionDenied(format!(
                "{} is read-only",
                self.path.display()
            )));
        }
        Ok(Opened { keep_cache: true })
    }

    /// Read up to `size` bytes of rendered content starting at `offset`.
    ///
    /// Reads past the end are short, and an unrendered document reads
    /// as empty. The renderer is never invoked from here.
    pub fn read(&self, offset: u64, size: u32) -> Bytes {
        let Some(content) = &self.content else {
            return Bytes::new();
        };
        let len = content.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(len);
        let end = start.saturating_add(size as usize).min(len);
        content.slice(start..end)
    }
}
