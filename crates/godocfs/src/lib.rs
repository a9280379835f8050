// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

//! A read-only projection of a source workspace with generated documentation.
//!
//! Every directory under the workspace's `src` directory appears as a
//! directory in the projection, and each one also contains a synthetic
//! [`DOC_NAME`] file whose content is produced by a [`Renderer`] for the
//! package at that path. Regular files and hidden directories of the
//! source tree are not shown.

#![deny(unsafe_op_in_unsafe_fn)]

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of the synthetic document found in every directory
pub const DOC_NAME: &str = "godoc";

/// The display name of the root directory
pub const ROOT_NAME: &str = "GOPATH";

pub mod config;
mod dir;
mod doc;
mod error;
#[cfg(test)]
mod fixtures;
pub mod identity;
mod node;
pub mod package;
pub mod render;
mod workspace;

pub use dir::DirNode;
pub use doc::{DocNode, Opened};
pub use error::{Error, OsError, Result};
pub use node::{Attributes, DirEntry, Node, NodeKind, Owner};
pub use render::{DocTool, Renderer};
pub use workspace::Workspace;
