//! Metadata index: the per-store summary of key → content fingerprint.
//!
//! Reconciliation compares two indexes instead of two value sets, so the
//! index must always agree with the store it describes: every stored key has
//! exactly one entry, and no entry outlives its value.

use crate::{Fingerprint, Key};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Index entry for a single key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaEntry {
    /// Content fingerprint (etag) of the stored value
    pub fingerprint: Fingerprint,
}

impl MetaEntry {
    /// Create an entry for the given fingerprint.
    pub fn new(fingerprint: impl Into<Fingerprint>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
        }
    }
}

/// Mapping from key to fingerprint record.
///
/// Uses BTreeMap so iteration, serialization and therefore patch order are
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaIndex {
    entries: BTreeMap<Key, MetaEntry>,
}

impl MetaIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the entry for a key.
    pub fn get(&self, key: &str) -> Option<&MetaEntry> {
        self.entries.get(key)
    }

    /// Get the fingerprint for a key.
    pub fn fingerprint(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.fingerprint.as_str())
    }

    /// Record (or replace) the fingerprint for a key.
    pub fn insert(&mut self, key: impl Into<Key>, fingerprint: impl Into<Fingerprint>) {
        self.entries.insert(key.into(), MetaEntry::new(fingerprint));
    }

    /// Drop the entry for a key, returning it if present.
    pub fn remove(&mut self, key: &str) -> Option<MetaEntry> {
        self.entries.remove(key)
    }

    /// Check whether a key is indexed.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &MetaEntry)> {
        self.entries.iter()
    }

    /// Iterate keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }

    /// Number of indexed keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<Key>, F: Into<Fingerprint>> FromIterator<(K, F)> for MetaIndex {
    fn from_iter<I: IntoIterator<Item = (K, F)>>(iter: I) -> Self {
        let mut index = MetaIndex::new();
        for (key, fingerprint) in iter {
            index.insert(key, fingerprint);
        }
        index
    }
}
