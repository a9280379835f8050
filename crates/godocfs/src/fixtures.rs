// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use rstest::fixture;

use crate::{Error, Renderer, Result, Workspace};

#[allow(dead_code)]
pub fn init_logging() {
    let sub = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::new("godocfs=trace"))
        .without_time()
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(sub);
}

#[fixture]
pub fn tmpdir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("godocfs-test-")
        .tempdir()
        .expect("create a temp directory for test files")
}

/// A renderer that records what it was asked for.
#[derive(Debug, Default)]
pub struct FakeRenderer {
    fail: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeRenderer {
    /// A renderer whose every render fails like a generator exiting with 1.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// The content rendered for the given package.
    pub fn expected(package: &str) -> Bytes {
        Bytes::from(format!("package {package}\n\nfunc Hello() string\n"))
    }

    /// Package identifiers that were rendered, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, package: &str) -> Result<Bytes> {
        self.calls.lock().unwrap().push(package.to_string());
        if self.fail {
            return Err(Error::GeneratorFailed {
                package: package.to_string(),
                status: exit_status(1),
                stderr: format!("doc: no such package {package}"),
            });
        }
        Ok(Self::expected(package))
    }
}

fn exit_status(code: i32) -> std::process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    // the raw wait status stores the exit code in the second byte
    std::process::ExitStatus::from_raw(code << 8)
}

/// Create each of the given directories (and parents) under `root`.
pub fn make_dirs(root: &Path, dirs: &[&str]) {
    for dir in dirs {
        std::fs::create_dir_all(root.join(dir)).expect("create test directory");
    }
}

/// A workspace over `root` that renders with a new [`FakeRenderer`].
pub fn fake_workspace(root: &Path) -> (Arc<Workspace>, Arc<FakeRenderer>) {
    let renderer = Arc::new(FakeRenderer::default());
    let workspace = Workspace::new(root, Arc::clone(&renderer) as Arc<dyn Renderer>);
    (Arc::new(workspace), renderer)
}
