//! Remote store: the storage contract over a paginated object store.

use super::{validate_user_key, AsyncStorage};
use crate::codec::{unquote_etag, Codec, JsonCodec};
use crate::{error::Result, Error, Fingerprint, Key, MetaIndex, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// Default (and typical maximum) number of objects per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Suffix appended to every object name.
pub const OBJECT_SUFFIX: &str = ".json";

/// Errors reported by an object store client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectError {
    #[error("no such object: {0}")]
    NotFound(String),

    #[error("object store backend error: {0}")]
    Backend(String),
}

impl From<ObjectError> for Error {
    fn from(err: ObjectError) -> Self {
        Error::Remote(err.to_string())
    }
}

/// One entry of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Full object name
    pub name: String,
    /// Entity tag as reported by the backend, possibly quoted
    pub etag: String,
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects on this page, in name order
    pub objects: Vec<ObjectSummary>,
    /// Marker to pass for the next page; `None` once the listing is exhausted
    pub next_marker: Option<String>,
}

/// Minimal client surface of an object store (S3, OSS, GCS, ...).
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Fetch an object's content.
    async fn get_object(&self, name: &str) -> std::result::Result<Vec<u8>, ObjectError>;

    /// Create or overwrite an object, returning its etag.
    async fn put_object(&self, name: &str, body: Vec<u8>) -> std::result::Result<String, ObjectError>;

    /// Delete an object.
    async fn delete_object(&self, name: &str) -> std::result::Result<(), ObjectError>;

    /// List objects whose name starts with `prefix`, strictly after `marker`,
    /// returning at most `max_keys` entries.
    async fn list_objects(
        &self,
        prefix: &str,
        marker: Option<&str>,
        max_keys: usize,
    ) -> std::result::Result<ListPage, ObjectError>;
}

/// The remote side of a synchronizer.
///
/// Key `k` lives in object `<instance>/<k>.json`. Fingerprints are the
/// object etags with surrounding quotes removed, so they compare equal to
/// locally computed fingerprints when both sides hash the same bytes.
pub struct ObjectStoreStorage<C: ObjectClient> {
    instance_name: String,
    client: C,
    codec: Arc<dyn Codec>,
    page_size: usize,
}

impl<C: ObjectClient> ObjectStoreStorage<C> {
    /// Create an adapter over `client`.
    pub fn new(instance_name: impl Into<String>, client: C) -> Self {
        Self {
            instance_name: instance_name.into(),
            client,
            codec: Arc::new(JsonCodec),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Use a different value codec.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Set the listing page size (clamped to at least 1).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn prefix(&self) -> String {
        format!("{}/", self.instance_name)
    }

    /// Object name holding `key`.
    pub fn object_name(&self, key: &str) -> String {
        format!("{}/{}{}", self.instance_name, key, OBJECT_SUFFIX)
    }

    /// Key stored in `name`, if the name belongs to this instance.
    pub fn key_for(&self, name: &str) -> Option<Key> {
        name.strip_prefix(&self.prefix())?
            .strip_suffix(OBJECT_SUFFIX)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }
}

#[async_trait]
impl<C: ObjectClient> AsyncStorage for ObjectStoreStorage<C> {
    fn instance_name(&self) -> &str {
        &self.instance_name
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        validate_user_key(key)?;
        match self.client.get_object(&self.object_name(key)).await {
            Ok(body) => Ok(Some(self.codec.decode(&body)?)),
            Err(ObjectError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<Fingerprint> {
        validate_user_key(key)?;
        let body = self.codec.encode(&value)?;
        let etag = self.client.put_object(&self.object_name(key), body).await?;
        tracing::trace!(instance = %self.instance_name, key, %etag, "remote put");
        Ok(unquote_etag(&etag).to_string())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        validate_user_key(key)?;
        match self.client.delete_object(&self.object_name(key)).await {
            Ok(()) | Err(ObjectError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn meta_index(&self) -> Result<MetaIndex> {
        let prefix = self.prefix();
        let mut index = MetaIndex::new();
        let mut marker: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .client
                .list_objects(&prefix, marker.as_deref(), self.page_size)
                .await?;
            pages += 1;

            for object in page.objects {
                match self.key_for(&object.name) {
                    Some(key) if validate_user_key(&key).is_ok() => {
                        index.insert(key, unquote_etag(&object.etag))
                    }
                    Some(_) => {
                        tracing::debug!(name = %object.name, "skipping reserved object in listing")
                    }
                    None => {
                        tracing::debug!(name = %object.name, "skipping foreign object in listing")
                    }
                }
            }

            match page.next_marker {
                Some(next) if marker.as_deref() != Some(next.as_str()) => marker = Some(next),
                Some(next) => {
                    return Err(Error::Remote(format!(
                        "listing did not advance past marker {next}"
                    )))
                }
                None => break,
            }
        }

        tracing::debug!(
            instance = %self.instance_name,
            keys = index.len(),
            pages,
            "listed remote index"
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryObjectClient, ObjectClient};
    use serde_json::json;

    fn remote(page_size: usize) -> ObjectStoreStorage<MemoryObjectClient> {
        ObjectStoreStorage::new("docs", MemoryObjectClient::new()).with_page_size(page_size)
    }

    #[test]
    fn name_mapping() {
        let storage = remote(10);
        assert_eq!(storage.object_name("a"), "docs/a.json");
        assert_eq!(storage.key_for("docs/a.json").as_deref(), Some("a"));
        assert_eq!(storage.key_for("docs/x/y.json").as_deref(), Some("x/y"));
        assert_eq!(storage.key_for("docs/a.txt"), None);
        assert_eq!(storage.key_for("other/a.json"), None);
        assert_eq!(storage.key_for("docs/.json"), None);
    }

    #[tokio::test]
    async fn set_returns_unquoted_etag() {
        let storage = remote(10);
        let fp = storage.set("a", json!(1)).await.unwrap();

        assert!(!fp.contains('"'));
        assert_eq!(
            storage.meta_index().await.unwrap().fingerprint("a"),
            Some(fp.as_str())
        );
    }

    #[tokio::test]
    async fn reserved_names_stay_out_of_the_index() {
        let storage = remote(10);
        storage
            .client()
            .put_object("docs/@evil.json", b"1".to_vec())
            .await
            .unwrap();
        storage.set("good", json!(2)).await.unwrap();

        let index = storage.meta_index().await.unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.contains("good"));
    }

    #[tokio::test]
    async fn missing_object_is_none() {
        let storage = remote(10);
        assert!(storage.get("missing").await.unwrap().is_none());
        storage.remove("missing").await.unwrap();
    }

    #[tokio::test]
    async fn backend_errors_propagate() {
        let storage = remote(10);
        storage.client().fail_next("bucket offline");

        let err = storage.get("a").await.unwrap_err();
        assert!(matches!(err, Error::Remote(ref msg) if msg.contains("bucket offline")));
    }

    #[tokio::test]
    async fn listing_walks_every_page() {
        let storage = remote(3);
        for i in 0..10 {
            storage.set(&format!("k{i:02}"), json!(i)).await.unwrap();
        }
        // An object from another instance shares the bucket.
        storage
            .client()
            .put_object("other/k00.json", b"0".to_vec())
            .await
            .unwrap();

        let index = storage.meta_index().await.unwrap();
        assert_eq!(index.len(), 10);
        assert_eq!(index.keys().next().map(String::as_str), Some("k00"));
        assert_eq!(index.keys().last().map(String::as_str), Some("k09"));
        assert_eq!(storage.client().list_calls(), 4);
    }

    #[tokio::test]
    async fn listing_exactly_at_page_boundary() {
        let storage = remote(5);
        for i in 0..5 {
            storage.set(&format!("k{i}"), json!(i)).await.unwrap();
        }
        assert_eq!(storage.meta_index().await.unwrap().len(), 5);
    }
}
