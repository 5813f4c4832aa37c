//! Shared test utilities.
//!
//! Synthetic image bytes, ready-made records, test clocks, and store doubles
//! that fail on purpose.
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let objects = MemoryObjectStore::new();
//! objects.insert("images", "raw/cat.png", png_bytes(800, 600), Some("image/png"));
//!
//! let metadata = seeded_metadata(150);
//! assert_eq!(metadata.len(), 150);
//! ```

use crate::process::Clock;
use crate::store::{
    MemoryMetadataStore, MemoryObjectStore, MetadataStore, ObjectHead, ObjectStore, PutOptions,
    ScanPage, ScanRequest, StoreError,
};
use crate::types::{ImageRecord, OriginalImage, VariantLocation};
use chrono::{DateTime, Duration, TimeZone, Utc};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Mutex;

// =========================================================================
// Image bytes
// =========================================================================

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

/// An RGB PNG with a gradient, so resizes have something to chew on.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Png)
}

/// A half-transparent RGBA PNG.
pub fn rgba_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, _| Rgba([200, 40, (x % 256) as u8, 128]));
    encode(DynamicImage::ImageRgba8(image), ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Jpeg)
}

// =========================================================================
// Records and time
// =========================================================================

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Clock that always reports the same instant.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Clock that starts at `start` and advances by `step` on every read.
pub struct SteppingClock {
    next: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl SteppingClock {
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            next: Mutex::new(start),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut next = self.next.lock().unwrap();
        let now = *next;
        *next = now + self.step;
        now
    }
}

/// A record as the pipeline would write it for `raw/<filename>`.
pub fn record(filename: &str) -> ImageRecord {
    let variants = BTreeMap::from([
        (
            "thumbnail".to_string(),
            VariantLocation {
                key: format!("public/thumbs/{filename}"),
            },
        ),
        (
            "optimized".to_string(),
            VariantLocation {
                key: format!("public/optimized/{filename}"),
            },
        ),
    ]);
    ImageRecord {
        image_id: filename.to_string(),
        filename: filename.to_string(),
        uploaded_at: fixed_time(),
        original: OriginalImage {
            bucket: "images".to_string(),
            key: format!("raw/{filename}"),
            byte_size: 1024,
            width: 800,
            height: 600,
            encoding: "image/png".to_string(),
        },
        variants,
    }
}

/// A metadata store holding `img-000.png` .. `img-<count-1>.png`.
pub fn seeded_metadata(count: usize) -> MemoryMetadataStore {
    let store = MemoryMetadataStore::new();
    for i in 0..count {
        store.upsert(&record(&format!("img-{i:03}.png"))).unwrap();
    }
    store
}

// =========================================================================
// Failing stores
// =========================================================================

fn offline(what: &str) -> StoreError {
    StoreError::Unavailable(format!("{what} store offline"))
}

/// Reads pass through to the wrapped store; every write fails.
pub struct FailingPutStore {
    inner: MemoryObjectStore,
}

impl FailingPutStore {
    pub fn new(inner: MemoryObjectStore) -> Self {
        Self { inner }
    }
}

impl ObjectStore for FailingPutStore {
    fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead, StoreError> {
        self.inner.head(bucket, key)
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.get(bucket, key)
    }

    fn put(&self, _: &str, _: &str, _: &[u8], _: &PutOptions) -> Result<(), StoreError> {
        Err(offline("object"))
    }
}

/// Metadata store where every call fails.
pub struct FailingMetadataStore;

impl MetadataStore for FailingMetadataStore {
    fn upsert(&self, _: &ImageRecord) -> Result<(), StoreError> {
        Err(offline("metadata"))
    }

    fn get(&self, _: &str) -> Result<Option<ImageRecord>, StoreError> {
        Err(offline("metadata"))
    }

    fn scan(&self, _: &ScanRequest<'_>) -> Result<ScanPage, StoreError> {
        Err(offline("metadata"))
    }
}
