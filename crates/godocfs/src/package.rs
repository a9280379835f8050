// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

//! Mapping between paths in the projected tree and package identifiers.

use std::path::{Component, Path};

use relative_path::RelativePathBuf;

#[cfg(test)]
#[path = "./package_test.rs"]
mod package_test;

/// Compute the package identifier for a node in the projected tree.
///
/// The package is the directory that contains `node_path`, which is
/// normally the path of a synthetic document. It is taken relative to
/// `source_root` and joined with `/`. The source root itself is the
/// empty identifier. Paths outside of `source_root` are not
/// rejected here; they produce an identifier that the documentation
/// generator will fail to find.
pub fn package_identifier(source_root: &Path, node_path: &Path) -> String {
    let relative = node_path.strip_prefix(source_root).unwrap_or(node_path);
    let mut package = RelativePathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => package.push(&*name.to_string_lossy()),
            // leading separators and drive prefixes are dropped
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
            Component::ParentDir => package.push(".."),
        }
    }
    // the directory portion, whether or not the node is a document
    package.pop();
    package.into_string()
}
