// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

//! Node identities (inode numbers) for the projected tree.
//!
//! There is no table of allocated inodes. Every node's identity is a pure
//! function of its parent's identity and its position in the parent:
//!
//! ```text
//! identity = parent * SLOTS + ordinal
//! ```
//!
//! where ordinal `0` is always the synthetic document and ordinals
//! `1..SLOTS` are the visible subdirectories of the parent in scan order.
//! The consequence is that an identity is only meaningful for as long as
//! the directories along its path keep the same set of subdirectories.
//! If a directory gains or loses a subdirectory, its later siblings are
//! renumbered and any identity handed out before the change may now
//! name a different directory, or nothing at all.
//!
//! The arithmetic wraps around. Below the ninth level of directories the
//! identity no longer fits in 64 bits, so deep identities are still unique
//! with high likelihood but can no longer be decoded with [`ordinal_path`].
//! Anything that must find deep nodes again by identity has to remember
//! where it saw them.

#[cfg(test)]
#[path = "./identity_test.rs"]
mod identity_test;

/// The identity of the mount root, as required by FUSE.
pub const ROOT_IDENTITY: u64 = 1;

/// The number of child slots available under every directory.
pub const SLOTS: u64 = 100;

/// The ordinal reserved for the synthetic document of a directory.
pub const DOC_ORDINAL: u64 = 0;

/// The largest ordinal that a subdirectory can be given.
pub const MAX_ORDINAL: u64 = SLOTS - 1;

/// Compute the identity of the child at `ordinal` under `parent`.
pub fn child_identity(parent: u64, ordinal: u64) -> u64 {
    debug_assert!(ordinal < SLOTS, "ordinal {ordinal} does not fit in a slot");
    parent.wrapping_mul(SLOTS).wrapping_add(ordinal)
}

/// Split an identity into its parent identity and ordinal.
///
/// Returns `None` for the root and for any value that cannot have been
/// produced by [`child_identity`].
pub fn split_identity(identity: u64) -> Option<(u64, u64)> {
    if identity <= ROOT_IDENTITY {
        return None;
    }
    let parent = identity / SLOTS;
    if parent < ROOT_IDENTITY {
        return None;
    }
    Some((parent, identity % SLOTS))
}

/// The ordinals that lead from the root to the node with this identity.
///
/// Only identities that did not wrap around decode to the node they were
/// given to. The root itself is an empty path. A [`DOC_ORDINAL`] can only appear as
/// the last element, any other placement yields `None`.
pub fn ordinal_path(identity: u64) -> Option<Vec<u64>> {
    if identity == ROOT_IDENTITY {
        return Some(Vec::new());
    }
    let mut ordinals = Vec::new();
    let mut current = identity;
    while current != ROOT_IDENTITY {
        let (parent, ordinal) = split_identity(current)?;
        ordinals.push(ordinal);
        current = parent;
    }
    ordinals.reverse();
    let (_, ancestors) = ordinals.split_last()?;
    if ancestors.contains(&DOC_ORDINAL) {
        // documents have no children
        return None;
    }
    Some(ordinals)
}
