// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

//! FUSE transport for godocfs.
//!
//! Serves a [`godocfs::Workspace`] to the kernel, resolving inodes back
//! into nodes on every request.

#![deny(missing_docs)]

mod error;
pub use error::{Error, Result};

#[cfg(unix)]
mod fuse;

#[cfg(unix)]
pub use fuse::{Config, Session};
