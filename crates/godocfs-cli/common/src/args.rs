// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

use std::ffi::CStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_subscriber::prelude::*;

#[cfg(test)]
#[path = "./args_test.rs"]
mod args_test;

const GODOCFS_LOG: &str = "GODOCFS_LOG";
const SYSLOG_IDENTITY: &CStr = c"godocfs";

/// Command line flags for configuring log output
#[derive(Debug, Clone, Default, clap::Args)]
pub struct Logging {
    /// Make output more verbose, can be specified more than once
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Send logs to syslog instead of stderr
    #[clap(long, global = true)]
    pub syslog: bool,

    /// Also append all logs to this file
    #[clap(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Logging {
    /// Install the global tracing subscriber described by these flags
    pub fn configure(&self) -> Result<()> {
        configure_logging(self.verbose, self.syslog, self.log_file.as_deref())
    }
}

/// Build the filter directives for the given verbosity.
///
/// `existing` is used as-is when no verbosity was requested, and
/// `overrides` are appended so that they take precedence.
pub fn log_filter(verbosity: u8, existing: Option<String>, overrides: Option<String>) -> String {
    let mut config = match verbosity {
        0 => existing.unwrap_or_else(|| "godocfs=info,warn".to_string()),
        1 => "godocfs=debug,info".to_string(),
        2 => "godocfs=trace,info".to_string(),
        3 => "godocfs=trace,debug".to_string(),
        _ => "trace".to_string(),
    };
    if let Some(overrides) = overrides.filter(|o| !o.is_empty()) {
        config.push(',');
        config.push_str(&overrides);
    }
    config
}

pub fn configure_logging(verbosity: u8, syslog: bool, log_file: Option<&Path>) -> Result<()> {
    let config = log_filter(
        verbosity,
        std::env::var(GODOCFS_LOG).ok(),
        std::env::var("RUST_LOG").ok(),
    );
    let env_filter = tracing_subscriber::filter::EnvFilter::from(config);

    let syslog_log = if syslog {
        let (options, facility) = Default::default();
        let writer = syslog_tracing::Syslog::new(SYSLOG_IDENTITY, options, facility)
            .context("Failed to initialize syslog logging")?;
        let layer = tracing_subscriber::fmt::layer()
            .without_time()
            .with_ansi(false)
            .with_target(verbosity > 2)
            .with_writer(writer);
        Some(layer)
    } else {
        None
    };

    let stderr_log = (!syslog).then(|| {
        tracing_subscriber::fmt::layer()
            .without_time()
            .with_target(verbosity > 2)
            .with_writer(std::io::stderr)
    });

    let file_log = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file));
            Some(layer)
        }
        None => None,
    };

    let sub = tracing_subscriber::registry()
        .with(env_filter)
        .with(syslog_log)
        .with(stderr_log)
        .with(file_log);
    tracing::subscriber::set_global_default(sub).context("Failed to install logging")?;
    Ok(())
}

/// Log a failed command, including any help that comes with the error.
pub fn report_error(err: &anyhow::Error) {
    tracing::error!("{err:#}");
    let help = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<godocfs::Error>())
        .and_then(|cause| miette::Diagnostic::help(cause).map(|help| help.to_string()));
    if let Some(help) = help {
        tracing::info!("{help}");
    }
}

/// Turn the result of a command into a process exit code
#[macro_export]
macro_rules! handle_result {
    ($result:ident) => {{
        match $result {
            Err(err) => {
                $crate::report_error(&err);
                1
            }
            Ok(code) => code,
        }
    }};
}
