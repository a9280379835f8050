// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::identity::{self, DOC_ORDINAL, ROOT_IDENTITY};
use crate::render::{DocTool, Renderer};
use crate::{DOC_NAME, DirNode, Error, Node, Owner, ROOT_NAME, Result};

#[cfg(test)]
#[path = "./workspace_test.rs"]
mod workspace_test;

/// A source tree projected as a filesystem.
///
/// This is the shared, read-only context that every node is built
/// from. It holds no state about the tree itself; nodes are created
/// from fresh directory scans whenever they are needed.
#[derive(Debug)]
pub struct Workspace {
    source_root: PathBuf,
    hidden: HashSet<OsString>,
    renderer: Arc<dyn Renderer>,
    owner: Owner,
}

impl Workspace {
    /// Project `source_root`, rendering documents with `renderer`.
    pub fn new<P: Into<PathBuf>>(source_root: P, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            source_root: source_root.into(),
            hidden: [OsString::from(".git")].into_iter().collect(),
            renderer,
            owner: Owner::default(),
        }
    }

    /// Project the source tree of the configured workspace, rendering
    /// documents with the configured generator.
    pub fn from_config(config: &Config) -> Self {
        let renderer = Arc::new(DocTool::from_config(&config.generator));
        Self::new(config.source.source_root(), renderer).with_hidden(&config.source.hidden)
    }

    /// Replace the set of directory names that are never shown.
    pub fn with_hidden<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.hidden = names
            .into_iter()
            .map(|n| n.as_ref().to_os_string())
            .collect();
        self
    }

    /// Set the user and group reported as the owner of all nodes.
    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = owner;
        self
    }

    /// The real directory that is projected as the root.
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    /// True if a real directory with this name must not appear in the tree.
    ///
    /// The synthetic document name is always reserved, so a real directory
    /// that happens to share it is hidden rather than shadowing the document.
    pub fn is_hidden(&self, name: &OsStr) -> bool {
        name == DOC_NAME || self.hidden.contains(name)
    }

    /// The directory node for `/`.
    pub fn root(self: &Arc<Self>) -> DirNode {
        DirNode::new(
            Arc::clone(self),
            ROOT_IDENTITY,
            self.source_root.clone(),
            OsString::from(ROOT_NAME),
        )
    }

    /// Rebuild the node with the given identity by walking down from the root.
    ///
    /// Each step scans one directory, so the result reflects the tree as it
    /// is now. See [`crate::identity`] for when an older identity can
    /// resolve to a different node than it originally did.
    pub async fn resolve(self: &Arc<Self>, identity: u64) -> Result<Node> {
        let Some(ordinals) = identity::ordinal_path(identity) else {
            return Err(Error::NotFound(format!("inode {identity}")));
        };
        let mut dir = self.root();
        for ordinal in ordinals {
            if ordinal == DOC_ORDINAL {
                // always the last element of the path
                return Ok(Node::Doc(dir.doc()));
            }
            dir = dir.child_at(ordinal).await?;
        }
        Ok(Node::Dir(dir))
    }
}
