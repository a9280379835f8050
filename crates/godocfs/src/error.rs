// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    #[error("No such entry: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Failed to read directory {0:?}")]
    ScanFailure(PathBuf, #[source] io::Error),

    #[error("Failed to run documentation generator '{program}'")]
    #[diagnostic(
        code("godocfs::generator_not_found"),
        help("Set generator.program (or GODOCFS_GENERATOR_PROGRAM) to a valid executable")
    )]
    GeneratorSpawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Documentation generator failed for package '{package}' ({status}): {stderr}")]
    GeneratorFailed {
        package: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("Documentation generator for package '{package}' did not finish within {timeout:?}")]
    GeneratorTimeout { package: String, timeout: Duration },

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// True if this error was produced by the documentation generator.
    pub fn is_generation_error(&self) -> bool {
        matches!(
            self,
            Error::GeneratorSpawn { .. }
                | Error::GeneratorFailed { .. }
                | Error::GeneratorTimeout { .. }
        )
    }
}

/// An error that can be reported to the kernel as an errno.
pub trait OsError {
    /// The errno that best describes this error, if any.
    fn os_error(&self) -> Option<i32>;
}

impl OsError for io::Error {
    fn os_error(&self) -> Option<i32> {
        self.raw_os_error()
    }
}

impl OsError for Error {
    fn os_error(&self) -> Option<i32> {
        match self {
            Error::NotFound(_) => Some(libc::ENOENT),
            Error::PermissionDenied(_) => Some(libc::EACCES),
            // a failed scan or render is reported as a plain i/o error on
            // the single request that triggered it
            Error::ScanFailure(..)
            | Error::GeneratorSpawn { .. }
            | Error::GeneratorFailed { .. }
            | Error::GeneratorTimeout { .. } => Some(libc::EIO),
            _ => None,
        }
    }
}
