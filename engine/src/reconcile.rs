//! Reconciliation of a local index against a remote index.
//!
//! This is the core of `pull`. Given the metadata index of both stores, it
//! produces the patch list that brings the local store in line with the
//! remote.
//!
//! # Algorithm
//!
//! 1. Walk the local index in key order:
//!    - key missing remotely → `remove` (remote-removed)
//!    - fingerprint differs → `update` (remote-updated)
//!    - fingerprint equal → nothing
//! 2. Walk the remote index in key order; every key missing locally →
//!    `update` (remote-added)
//!
//! Fingerprint equality is the only conflict signal. There are no clocks or
//! timestamps, so a differing remote fingerprint always wins over the local
//! one. Patches touch independent keys and can be applied in any order.

use crate::commit::{Patch, Reason};
use crate::meta::MetaIndex;

/// Compute the patches that make `local` match `remote`.
///
/// Output order is the local pass followed by the remote pass.
pub fn diff(local: &MetaIndex, remote: &MetaIndex) -> Vec<Patch> {
    let mut patches = Vec::new();

    // Keys gone from the remote, and keys whose content changed there.
    for (key, entry) in local.iter() {
        match remote.get(key) {
            None => patches.push(Patch::Remove {
                key: key.clone(),
                reason: Reason::RemoteRemoved,
            }),
            Some(remote_entry) if remote_entry.fingerprint != entry.fingerprint => {
                patches.push(Patch::Update {
                    key: key.clone(),
                    reason: Reason::RemoteUpdated,
                })
            }
            Some(_) => {}
        }
    }

    // Keys the local store has never seen.
    for key in remote.keys() {
        if !local.contains(key) {
            patches.push(Patch::Update {
                key: key.clone(),
                reason: Reason::RemoteAdded,
            });
        }
    }

    patches
}

/// Apply patches to an index as if they had been applied to the store,
/// taking fingerprints from `remote`.
///
/// Used to predict the local index after a pull without performing I/O.
pub fn apply_to_index(local: &MetaIndex, remote: &MetaIndex, patches: &[Patch]) -> MetaIndex {
    let mut next = local.clone();
    for patch in patches {
        match patch {
            Patch::Update { key, .. } => match remote.fingerprint(key) {
                Some(fingerprint) => next.insert(key.clone(), fingerprint),
                None => {
                    next.remove(key);
                }
            },
            Patch::Remove { key, .. } => {
                next.remove(key);
            }
        }
    }
    next
}
