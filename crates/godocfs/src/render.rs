// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

use std::process::Stdio;
use std::time::Duration;

use bytes::Bytes;

use crate::{Error, Result};

#[cfg(test)]
#[path = "./render_test.rs"]
mod render_test;

/// Produces the documentation for a single package.
#[async_trait::async_trait]
pub trait Renderer: std::fmt::Debug + Send + Sync {
    /// Render the documentation of the package with the given identifier.
    ///
    /// The empty identifier names the package at the root of the tree.
    async fn render(&self, package: &str) -> Result<Bytes>;
}

/// Renders documentation by running an external program,
/// `<program> <args...> <package>`, and capturing its standard output.
#[derive(Debug, Clone)]
pub struct DocTool {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl DocTool {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn from_config(config: &crate::config::Generator) -> Self {
        Self::new(config.program.clone())
            .with_args(config.args.iter().cloned())
            .with_timeout(config.timeout())
    }

    /// Arguments that are placed before the package identifier.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Stop waiting for (and kill) the program after this long.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait::async_trait]
impl Renderer for DocTool {
    async fn render(&self, package: &str) -> Result<Bytes> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .arg(package)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        tracing::debug!(?cmd, "rendering package documentation");

        let child = cmd.spawn().map_err(|source| Error::GeneratorSpawn {
            program: self.program.clone(),
            source,
        })?;
        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| Error::GeneratorTimeout {
                    package: package.to_string(),
                    timeout,
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(|source| Error::GeneratorSpawn {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(Error::GeneratorFailed {
                package: package.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        tracing::trace!(
            package,
            size = output.stdout.len(),
            "package documentation rendered"
        );
        Ok(Bytes::from(output.stdout))
    }
}
