// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

use godocfs::OsError;
use thiserror::Error;

/// A specialized result for fuse operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors specific to fuse operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The kernel referred to a file handle that is not open.
    #[error("No open handle {0}")]
    BadHandle(u64),

    /// A file operation was attempted on a directory.
    #[error("Inode {0} is a directory")]
    IsADirectory(u64),

    /// A directory operation was attempted on a document.
    #[error("Inode {0} is not a directory")]
    NotADirectory(u64),

    /// An error from the projected workspace.
    #[error(transparent)]
    Workspace(#[from] godocfs::Error),
}

impl OsError for Error {
    fn os_error(&self) -> Option<i32> {
        match self {
            Error::BadHandle(_) => Some(libc::EBADF),
            Error::IsADirectory(_) => Some(libc::EISDIR),
            Error::NotADirectory(_) => Some(libc::ENOTDIR),
            Error::Workspace(err) => err.os_error(),
        }
    }
}
