//! Commit and patch types for expressing pending mutations.
//!
//! Changes never touch a store directly from the sync layer; they are
//! expressed as commits, queued, and applied later against a store pair.
//! Reconciliation produces patches, which are a restricted form of commit.

use crate::{Key, Value};
use serde::{Deserialize, Serialize};

/// Which store a commit mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// The local persistent store
    Local,
    /// The remote object store
    Remote,
}

impl Target {
    /// The other side of the pair, i.e. the source for `set`/`update`.
    pub fn opposite(self) -> Self {
        match self {
            Target::Local => Target::Remote,
            Target::Remote => Target::Local,
        }
    }
}

/// Why a commit was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reason {
    LocalWrite,
    LocalDelete,
    RemoteAdded,
    RemoteUpdated,
    RemoteRemoved,
}

/// Where a commit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Staging {
    /// Created by a direct API call
    Queued,
    /// Created by reconciliation
    Patching,
}

/// Write a carried value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCommit {
    /// Key to write
    pub key: Key,
    /// Authoritative value
    pub value: Value,
    /// Store being mutated
    pub target: Target,
    /// Why this commit exists
    pub reason: Reason,
    /// Origin of the commit
    pub staging: Staging,
}

/// Copy the current value from the source store into the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommit {
    /// Key to copy
    pub key: Key,
    /// Store being mutated
    pub target: Target,
    /// Why this commit exists
    pub reason: Reason,
    /// Origin of the commit
    pub staging: Staging,
}

/// Remove a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveCommit {
    /// Key to remove
    pub key: Key,
    /// Store being mutated
    pub target: Target,
    /// Why this commit exists
    pub reason: Reason,
    /// Origin of the commit
    pub staging: Staging,
}

/// A pending mutation intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Commit {
    Set(SetCommit),
    Update(UpdateCommit),
    Remove(RemoveCommit),
}

impl Commit {
    /// A local write that must reach the remote.
    pub fn local_write(key: impl Into<Key>, value: Value) -> Self {
        Commit::Set(SetCommit {
            key: key.into(),
            value,
            target: Target::Remote,
            reason: Reason::LocalWrite,
            staging: Staging::Queued,
        })
    }

    /// A local delete that must reach the remote.
    pub fn local_delete(key: impl Into<Key>) -> Self {
        Commit::Remove(RemoveCommit {
            key: key.into(),
            target: Target::Remote,
            reason: Reason::LocalDelete,
            staging: Staging::Queued,
        })
    }

    /// Get the key this commit targets.
    pub fn key(&self) -> &Key {
        match self {
            Commit::Set(c) => &c.key,
            Commit::Update(c) => &c.key,
            Commit::Remove(c) => &c.key,
        }
    }

    /// Get the store this commit mutates.
    pub fn target(&self) -> Target {
        match self {
            Commit::Set(c) => c.target,
            Commit::Update(c) => c.target,
            Commit::Remove(c) => c.target,
        }
    }

    /// Get the reason code.
    pub fn reason(&self) -> Reason {
        match self {
            Commit::Set(c) => c.reason,
            Commit::Update(c) => c.reason,
            Commit::Remove(c) => c.reason,
        }
    }

    /// Get the staging marker.
    pub fn staging(&self) -> Staging {
        match self {
            Commit::Set(c) => c.staging,
            Commit::Update(c) => c.staging,
            Commit::Remove(c) => c.staging,
        }
    }

    /// Short name of the variant, as used in the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Commit::Set(_) => "set",
            Commit::Update(_) => "update",
            Commit::Remove(_) => "remove",
        }
    }
}

/// Reconciler output: what must change locally to match the remote.
///
/// Always targets the local store. There is no `set` form because remote
/// values are fetched lazily when an `update` is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Patch {
    Update { key: Key, reason: Reason },
    Remove { key: Key, reason: Reason },
}

impl Patch {
    /// Get the key this patch targets.
    pub fn key(&self) -> &Key {
        match self {
            Patch::Update { key, .. } | Patch::Remove { key, .. } => key,
        }
    }

    /// Get the reason code.
    pub fn reason(&self) -> Reason {
        match self {
            Patch::Update { reason, .. } | Patch::Remove { reason, .. } => *reason,
        }
    }
}

impl From<Patch> for Commit {
    fn from(patch: Patch) -> Self {
        match patch {
            Patch::Update { key, reason } => Commit::Update(UpdateCommit {
                key,
                target: Target::Local,
                reason,
                staging: Staging::Patching,
            }),
            Patch::Remove { key, reason } => Commit::Remove(RemoveCommit {
                key,
                target: Target::Local,
                reason,
                staging: Staging::Patching,
            }),
        }
    }
}
