//! In-process stores backed by mutex-guarded maps.

use super::{
    MetadataStore, ObjectHead, ObjectStore, PutOptions, ScanPage, ScanRequest, StoreError,
    scan_sorted,
};
use crate::types::ImageRecord;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Unavailable("store lock poisoned".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
}

/// Object store keeping every body in memory, keyed by `(bucket, key)`.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly, e.g. an upload with an arbitrary content type.
    pub fn insert(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: Option<&str>) {
        let object = StoredObject {
            body,
            content_type: content_type.map(str::to_string),
            cache_control: None,
        };
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((bucket.to_string(), key.to_string()), object);
    }

    /// Snapshot of one stored object.
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// All keys in a bucket, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<(String, String), StoredObject>>, StoreError> {
        self.objects.lock().map_err(poisoned)
    }

    fn not_found(bucket: &str, key: &str) -> StoreError {
        StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

impl ObjectStore for MemoryObjectStore {
    fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead, StoreError> {
        let objects = self.lock()?;
        let object = objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| Self::not_found(bucket, key))?;
        Ok(ObjectHead {
            content_type: object.content_type.clone(),
            content_length: object.body.len() as u64,
            cache_control: object.cache_control.clone(),
        })
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let objects = self.lock()?;
        objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.body.clone())
            .ok_or_else(|| Self::not_found(bucket, key))
    }

    fn put(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        options: &PutOptions,
    ) -> Result<(), StoreError> {
        let object = StoredObject {
            body: body.to_vec(),
            content_type: Some(options.content_type.clone()),
            cache_control: options.cache_control.clone(),
        };
        self.lock()?
            .insert((bucket.to_string(), key.to_string()), object);
        Ok(())
    }
}

/// Metadata store ordered by `image_id`, so scans page deterministically.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: Mutex<BTreeMap<String, ImageRecord>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn upsert(&self, record: &ImageRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(poisoned)?
            .insert(record.image_id.clone(), record.clone());
        Ok(())
    }

    fn get(&self, image_id: &str) -> Result<Option<ImageRecord>, StoreError> {
        Ok(self.records.lock().map_err(poisoned)?.get(image_id).cloned())
    }

    fn scan(&self, request: &ScanRequest<'_>) -> Result<ScanPage, StoreError> {
        let records = self.records.lock().map_err(poisoned)?;
        Ok(scan_sorted(records.values().cloned(), request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::record;

    fn opts(content_type: &str) -> PutOptions {
        PutOptions {
            content_type: content_type.to_string(),
            cache_control: Some("public, max-age=60".to_string()),
        }
    }

    #[test]
    fn put_then_head_and_get() {
        let store = MemoryObjectStore::new();
        store.put("b", "k.jpg", b"abc", &opts("image/jpeg")).unwrap();

        let head = store.head("b", "k.jpg").unwrap();
        assert_eq!(head.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(head.content_length, 3);
        assert_eq!(head.cache_control.as_deref(), Some("public, max-age=60"));
        assert_eq!(store.get("b", "k.jpg").unwrap(), b"abc");
    }

    #[test]
    fn missing_object_is_not_found() {
        let store = MemoryObjectStore::new();
        assert!(matches!(
            store.head("b", "nope"),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(store.get("b", "nope"), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn buckets_are_separate() {
        let store = MemoryObjectStore::new();
        store.insert("one", "k", b"1".to_vec(), None);
        assert!(store.get("two", "k").is_err());
        assert_eq!(store.keys("one"), vec!["k"]);
        assert!(store.keys("two").is_empty());
    }

    #[test]
    fn put_overwrites() {
        let store = MemoryObjectStore::new();
        store.put("b", "k", b"old", &opts("image/png")).unwrap();
        store.put("b", "k", b"new", &opts("image/jpeg")).unwrap();
        let object = store.object("b", "k").unwrap();
        assert_eq!(object.body, b"new");
        assert_eq!(object.content_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn insert_without_content_type() {
        let store = MemoryObjectStore::new();
        store.insert("b", "k", vec![], None);
        assert_eq!(store.head("b", "k").unwrap().content_type, None);
    }

    #[test]
    fn upsert_replaces_by_id() {
        let store = MemoryMetadataStore::new();
        let mut first = record("cat.png");
        store.upsert(&first).unwrap();
        first.original.width = 42;
        store.upsert(&first).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("cat.png").unwrap().unwrap().original.width, 42);
    }

    #[test]
    fn get_missing_is_none() {
        assert_eq!(MemoryMetadataStore::new().get("ghost.png").unwrap(), None);
    }

    #[test]
    fn scan_pages_in_id_order() {
        let store = MemoryMetadataStore::new();
        for id in ["c.png", "a.png", "b.png"] {
            store.upsert(&record(id)).unwrap();
        }
        let first = store.scan(&ScanRequest::new(2)).unwrap();
        assert_eq!(first.items[0].image_id, "a.png");
        assert_eq!(first.next.as_deref(), Some("b.png"));

        let second = store
            .scan(&ScanRequest::new(2).start_after(first.next.as_deref()))
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].image_id, "c.png");
        assert_eq!(second.next, None);
    }
}
