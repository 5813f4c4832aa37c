//! Shared types persisted by the pipeline and served by the read API.
//!
//! [`ImageRecord`] is the only entity this crate stores. The pipeline writes it
//! as its final step and the query service returns it verbatim, so both sides
//! must agree on the JSON shape: camelCase keys, timestamps in RFC 3339.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata describing one ingested image and its published variants.
///
/// Keyed by `image_id`, which is derived from the filename, so re-ingesting the
/// same filename overwrites the previous record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub image_id: String,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub original: OriginalImage,
    /// Variant name (`thumbnail`, `optimized`) → published location.
    pub variants: BTreeMap<String, VariantLocation>,
}

/// The source object as it was decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalImage {
    pub bucket: String,
    pub key: String,
    pub byte_size: u64,
    pub width: u32,
    pub height: u32,
    /// MIME type of the detected raster format, e.g. `image/png`.
    pub encoding: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantLocation {
    pub key: String,
}

impl ImageRecord {
    /// Key of a named variant, if the record has one.
    pub fn variant_key(&self, name: &str) -> Option<&str> {
        self.variants.get(name).map(|v| v.key.as_str())
    }
}
