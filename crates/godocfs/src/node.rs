// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

use std::ffi::OsString;

use crate::{DirNode, DocNode, Result};

/// The kinds of node that exist in the projected tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A real directory from the source tree
    Directory,
    /// The synthetic, read-only documentation file of a directory
    Document,
}

/// The attributes reported for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    pub identity: u64,
    pub kind: NodeKind,
    /// Permission bits only, without the file type
    pub perm: u16,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
}

/// One entry in a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub identity: u64,
    pub kind: NodeKind,
    pub name: OsString,
}

/// The user and group that own every node in the tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

/// Either kind of node, as returned by a lookup
#[derive(Debug)]
pub enum Node {
    Dir(DirNode),
    Doc(DocNode),
}

impl Node {
    pub fn identity(&self) -> u64 {
        match self {
            Node::Dir(dir) => dir.identity(),
            Node::Doc(doc) => doc.identity(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Dir(_) => NodeKind::Directory,
            Node::Doc(_) => NodeKind::Document,
        }
    }

    /// Report the attributes of this node.
    ///
    /// For a document this renders its content if it has
    /// not been rendered already.
    pub async fn attributes(&mut self) -> Result<Attributes> {
        match self {
            Node::Dir(dir) => Ok(dir.attributes()),
            Node::Doc(doc) => doc.attributes().await,
        }
    }
}
