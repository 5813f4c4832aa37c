//! Storage interfaces the pipeline and read API depend on.
//!
//! Two collaborators live outside this crate in production: a binary
//! [`ObjectStore`] (uploads and published variants) and a [`MetadataStore`]
//! holding one [`ImageRecord`] per image id. Both are traits so a deployment
//! can plug in its own clients, and so tests can substitute in-memory doubles.
//!
//! Clients are built once at process start and shared by reference. Both
//! traits require `Send + Sync`; implementations hold no per-call state.
//!
//! | Implementation | Module | Use |
//! |---|---|---|
//! | [`MemoryObjectStore`], [`MemoryMetadataStore`] | [`memory`] | tests, embedding |
//! | [`FsObjectStore`], [`FsMetadataStore`] | [`fs`] | the CLI, local runs |
//!
//! ## Scan contract
//!
//! [`MetadataStore::scan`] walks records in ascending `image_id` order,
//! starting strictly after `start_after` when given. The optional filter is
//! applied during the walk and `limit` bounds the number of *returned*
//! records. `next` is the id of the last returned record when the walk
//! stopped at the limit with records still left to examine, and `None`
//! otherwise. It is opaque to callers: pass it back as `start_after`.

pub mod fs;
pub mod memory;

pub use fs::{FsMetadataStore, FsObjectStore};
pub use memory::{MemoryMetadataStore, MemoryObjectStore};

use crate::types::ImageRecord;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Object metadata returned by [`ObjectStore::head`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectHead {
    pub content_type: Option<String>,
    pub content_length: u64,
    pub cache_control: Option<String>,
}

/// Headers stored alongside an object on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: String,
    pub cache_control: Option<String>,
}

/// Binary object storage addressed by bucket and key.
pub trait ObjectStore: Send + Sync {
    /// Fetch metadata only. Never transfers the body.
    fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead, StoreError>;

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Create or overwrite an object.
    fn put(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        options: &PutOptions,
    ) -> Result<(), StoreError>;
}

/// Predicate applied to records during a scan.
pub type RecordFilter<'a> = &'a (dyn Fn(&ImageRecord) -> bool + Sync);

/// Parameters for [`MetadataStore::scan`]. See the [module docs](self).
#[derive(Clone, Copy)]
pub struct ScanRequest<'a> {
    pub limit: usize,
    pub start_after: Option<&'a str>,
    pub filter: Option<RecordFilter<'a>>,
}

impl<'a> ScanRequest<'a> {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            start_after: None,
            filter: None,
        }
    }

    pub fn start_after(mut self, token: Option<&'a str>) -> Self {
        self.start_after = token;
        self
    }

    pub fn filter(mut self, filter: RecordFilter<'a>) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// One page of scan results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanPage {
    pub items: Vec<ImageRecord>,
    pub next: Option<String>,
}

/// Keyed record storage with upsert semantics.
pub trait MetadataStore: Send + Sync {
    /// Insert or replace the record with the same `image_id`.
    fn upsert(&self, record: &ImageRecord) -> Result<(), StoreError>;

    fn get(&self, image_id: &str) -> Result<Option<ImageRecord>, StoreError>;

    fn scan(&self, request: &ScanRequest<'_>) -> Result<ScanPage, StoreError>;
}

/// Apply the scan contract to records already sorted by `image_id`.
///
/// Shared by the bundled stores so they page identically.
pub(crate) fn scan_sorted<I>(records: I, request: &ScanRequest<'_>) -> ScanPage
where
    I: IntoIterator<Item = ImageRecord>,
{
    let mut remaining = records
        .into_iter()
        .skip_while(|r| {
            request
                .start_after
                .is_some_and(|after| r.image_id.as_str() <= after)
        })
        .peekable();

    let mut items = Vec::new();
    while items.len() < request.limit {
        let Some(record) = remaining.next() else {
            break;
        };
        if request.filter.is_none_or(|keep| keep(&record)) {
            items.push(record);
        }
    }

    let next = if items.len() == request.limit && remaining.peek().is_some() {
        items.last().map(|r| r.image_id.clone())
    } else {
        None
    };

    ScanPage { items, next }
}
