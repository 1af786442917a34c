//! In-process object store behaving like a cloud bucket.

use super::remote::{ListPage, ObjectClient, ObjectError, ObjectSummary, DEFAULT_PAGE_SIZE};
use crate::codec::sha256_fingerprint;
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    etag: String,
}

/// A bucket held in memory.
///
/// Mirrors the quirks the remote adapter must cope with: etags come back
/// wrapped in double quotes, listings are capped at [`DEFAULT_PAGE_SIZE`]
/// entries per page and continue from a marker. Failures can be injected
/// to exercise retry paths.
#[derive(Debug, Default)]
pub struct MemoryObjectClient {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    offline: AtomicBool,
    injected: Mutex<VecDeque<String>>,
    list_calls: AtomicUsize,
    put_calls: AtomicUsize,
}

impl MemoryObjectClient {
    /// Create an empty bucket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call fail with a backend error.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.injected_queue().push_back(message.into());
    }

    /// Fail every call until switched back on.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of listing requests served.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of uploads served.
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Check if the bucket is empty.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn injected_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.injected.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn check_available(&self) -> Result<(), ObjectError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ObjectError::Backend("object store unreachable".into()));
        }
        match self.injected_queue().pop_front() {
            Some(message) => Err(ObjectError::Backend(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn get_object(&self, name: &str) -> Result<Vec<u8>, ObjectError> {
        self.check_available()?;
        self.objects
            .read()
            .await
            .get(name)
            .map(|o| o.body.clone())
            .ok_or_else(|| ObjectError::NotFound(name.to_string()))
    }

    async fn put_object(&self, name: &str, body: Vec<u8>) -> Result<String, ObjectError> {
        self.check_available()?;
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let etag = format!("\"{}\"", sha256_fingerprint(&body));
        self.objects.write().await.insert(
            name.to_string(),
            StoredObject {
                body,
                etag: etag.clone(),
            },
        );
        Ok(etag)
    }

    async fn delete_object(&self, name: &str) -> Result<(), ObjectError> {
        self.check_available()?;
        self.objects.write().await.remove(name);
        Ok(())
    }

    async fn list_objects(
        &self,
        prefix: &str,
        marker: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, ObjectError> {
        self.check_available()?;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let max_keys = max_keys.clamp(1, DEFAULT_PAGE_SIZE);

        let objects = self.objects.read().await;
        let lower = match marker {
            Some(m) => Bound::Excluded(m.to_string()),
            None => Bound::Included(prefix.to_string()),
        };
        let mut matching = objects
            .range((lower, Bound::Unbounded))
            .skip_while(|(name, _)| !name.starts_with(prefix) && name.as_str() < prefix)
            .take_while(|(name, _)| name.starts_with(prefix));

        let page: Vec<ObjectSummary> = matching
            .by_ref()
            .take(max_keys)
            .map(|(name, object)| ObjectSummary {
                name: name.clone(),
                etag: object.etag.clone(),
            })
            .collect();
        let truncated = matching.next().is_some();

        Ok(ListPage {
            next_marker: if truncated {
                page.last().map(|o| o.name.clone())
            } else {
                None
            },
            objects: page,
        })
    }
}
