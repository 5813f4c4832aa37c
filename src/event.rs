//! Upload notifications.
//!
//! The pipeline is triggered by a batch of "object created" notifications in
//! the S3 shape:
//!
//! ```json
//! {"Records": [{"s3": {"bucket": {"name": "images"}, "object": {"key": "raw/my+cat.png"}}}]}
//! ```
//!
//! Object keys arrive URL-encoded with `+` for spaces; [`NotificationBatch::uploads`]
//! normalizes them with [`decode_object_key`].

use crate::naming::decode_object_key;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("malformed notification: {0}")]
    Json(#[from] serde_json::Error),
    #[error("object key {key:?} is not valid UTF-8 once decoded")]
    InvalidKey { key: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<Notification>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub s3: S3Entity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Key exactly as delivered, still encoded.
    pub key: String,
}

/// One uploaded object with its key decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub bucket: String,
    pub key: String,
}

impl NotificationBatch {
    pub fn from_json(json: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(json)?)
    }

    /// A batch announcing a single upload. `key` is encoded the way
    /// notifications carry it.
    pub fn single(bucket: &str, key: &str) -> Self {
        Self {
            records: vec![Notification {
                s3: S3Entity {
                    bucket: BucketRef {
                        name: bucket.to_string(),
                    },
                    object: ObjectRef {
                        key: encode_object_key(key),
                    },
                },
            }],
        }
    }

    /// Decoded uploads in delivery order.
    pub fn uploads(&self) -> Result<Vec<Upload>, EventError> {
        self.records
            .iter()
            .map(|record| {
                let raw = &record.s3.object.key;
                let key = decode_object_key(raw)
                    .map_err(|_| EventError::InvalidKey { key: raw.clone() })?;
                Ok(Upload {
                    bucket: record.s3.bucket.name.clone(),
                    key,
                })
            })
            .collect()
    }
}

/// Inverse of [`decode_object_key`] for the characters notifications escape.
fn encode_object_key(key: &str) -> String {
    use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

    const KEY: &AsciiSet = &NON_ALPHANUMERIC
        .remove(b'/')
        .remove(b'-')
        .remove(b'_')
        .remove(b'.')
        .remove(b'~')
        .remove(b' ');
    utf8_percent_encode(key, KEY).to_string().replace(' ', "+")
}
