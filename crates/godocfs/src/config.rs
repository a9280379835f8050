// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;

#[cfg(test)]
#[path = "./config_test.rs"]
mod config_test;

/// The subdirectory of the workspace root that is projected as the mount root
pub const SOURCE_DIR_NAME: &str = "src";

static FALLBACK_WORKSPACE_ROOT: &str = "/tmp/go";

/// Where the projected tree comes from and what parts of it are visible
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Source {
    /// The workspace root, whose `src` directory becomes the mount root
    pub root: PathBuf,

    /// Directory names that are never shown in the mounted tree
    pub hidden: Vec<String>,
}

impl Default for Source {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
            hidden: vec![".git".to_string()],
        }
    }
}

impl Source {
    /// The real directory that is mounted as `/`.
    pub fn source_root(&self) -> PathBuf {
        self.root.join(SOURCE_DIR_NAME)
    }
}

/// How the documentation for a package is produced
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Generator {
    /// The executable to run
    pub program: String,

    /// Arguments given before the package identifier
    pub args: Vec<String>,

    /// Kill the generator if it runs longer than this many seconds.
    ///
    /// Zero, the default, lets the generator run for as long as it needs.
    pub timeout_seconds: u64,
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            program: "go".to_string(),
            args: vec!["doc".to_string()],
            timeout_seconds: 0,
        }
    }
}

impl Generator {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }
}

/// Behavior of the mounted filesystem
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Filesystem {
    /// How long the kernel may cache entries and attributes, in seconds
    pub ttl_seconds: u64,
}

impl Default for Filesystem {
    fn default() -> Self {
        Self { ttl_seconds: 60 }
    }
}

impl Filesystem {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Configuration values for godocfs.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    // These sub-types should aim to only have one level of
    // values within them, otherwise they become impossible to address
    // with environment variables.
    pub source: Source,
    pub generator: Generator,
    pub filesystem: Filesystem,
}

impl Config {
    /// Load the config from disk and the environment
    pub fn load() -> Result<Self> {
        load_config()
    }

    /// Parse a config from a string in the given format.
    pub fn load_string<S: AsRef<str>>(conf: S, format: config::FileFormat) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(conf.as_ref(), format))
            .build()?;
        Ok(Config::deserialize(config)?)
    }
}

/// The first entry of `$GOPATH`, or `~/go` when it is not set.
fn default_workspace_root() -> PathBuf {
    if let Some(first) = std::env::var_os("GOPATH")
        .as_deref()
        .and_then(|paths| std::env::split_paths(paths).find(|p| !p.as_os_str().is_empty()))
    {
        return first;
    }
    dirs::home_dir()
        .map(|home| home.join("go"))
        .unwrap_or_else(|| PathBuf::from(FALLBACK_WORKSPACE_ROOT))
}

/// Load the godocfs configuration.
///
/// This includes the default, user, and system configurations (if they exist)
/// and any `GODOCFS_<SECTION>_<NAME>` environment overrides.
pub fn load_config() -> Result<Config> {
    use config::{Config as RawConfig, File};

    let mut config_builder = RawConfig::builder()
        // the system config can also be in any support format: toml, yaml, json, ini, etc
        .add_source(File::with_name("/etc/godocfs").required(false));

    if let Some(config_dir) = dirs::config_dir() {
        let user_config = config_dir.join("godocfs").join("godocfs");
        // the user config can also be in any support format: toml, yaml, json, ini, etc
        config_builder = config_builder
            .add_source(File::with_name(&format!("{}", user_config.display())).required(false));
    }

    for (var, value) in std::env::vars() {
        let Some(tail) = var.strip_prefix("GODOCFS_") else {
            continue;
        };
        let Some((section, name)) = tail.split_once('_') else {
            // a value with no section is not a configuration
            // value, and can be skipped (eg: GODOCFS_LOG)
            continue;
        };

        let key = format!("{}.{}", section.to_lowercase(), name.to_lowercase());
        config_builder = config_builder.set_override(key, value)?;
    }

    let config = config_builder.build()?;
    Ok(Config::deserialize(config)?)
}
