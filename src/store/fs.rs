//! Local-directory stores used by the command-line front end.
//!
//! ```text
//! <root>/
//! ├── objects/<bucket>/<key>          # object bodies, key path kept as-is
//! ├── headers/<bucket>/<key>.json     # content type + cache control
//! └── records/<table>/<id>.json       # one ImageRecord per file
//! ```
//!
//! Writes go through a temp file and a rename so readers never see a torn
//! body or record.

use super::{
    MetadataStore, ObjectHead, ObjectStore, PutOptions, ScanPage, ScanRequest, StoreError,
    scan_sorted,
};
use crate::types::ImageRecord;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Characters kept verbatim in record file names.
const RECORD_NAME: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'-').remove(b'_');

#[derive(Debug, Serialize, Deserialize)]
struct StoredHeaders {
    content_type: Option<String>,
    cache_control: Option<String>,
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::InvalidKey(path.display().to_string()))?;
    std::fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| StoreError::InvalidKey(path.display().to_string()))?;
    let tmp = path.with_file_name(format!(".{file_name}.tmp.{}", std::process::id()));

    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(tmp, path)?;
    Ok(())
}

/// Reject keys that would escape the store root or collapse into a directory.
fn relative_key_path(key: &str) -> Result<PathBuf, StoreError> {
    let path = Path::new(key);
    let valid = !key.is_empty()
        && !key.ends_with('/')
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(path.to_path_buf())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

fn relative_bucket_path(bucket: &str) -> Result<PathBuf, StoreError> {
    if bucket.contains('/') {
        return Err(StoreError::InvalidKey(bucket.to_string()));
    }
    relative_key_path(bucket)
}

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn body_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        Ok(self
            .root
            .join("objects")
            .join(relative_bucket_path(bucket)?)
            .join(relative_key_path(key)?))
    }

    fn headers_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self
            .root
            .join("headers")
            .join(relative_bucket_path(bucket)?)
            .join(relative_key_path(key)?)
            .into_os_string();
        path.push(".json");
        Ok(PathBuf::from(path))
    }

    fn map_missing(err: std::io::Error, bucket: &str, key: &str) -> StoreError {
        if err.kind() == ErrorKind::NotFound {
            StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }
        } else {
            StoreError::Io(err)
        }
    }
}

impl ObjectStore for FsObjectStore {
    fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead, StoreError> {
        let body = self.body_path(bucket, key)?;
        let meta = std::fs::metadata(&body).map_err(|e| Self::map_missing(e, bucket, key))?;
        if !meta.is_file() {
            return Err(Self::map_missing(ErrorKind::NotFound.into(), bucket, key));
        }
        // Objects copied in by hand have no headers file: report no content type.
        let headers = match std::fs::read(self.headers_path(bucket, key)?) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => StoredHeaders {
                content_type: None,
                cache_control: None,
            },
            Err(e) => return Err(e.into()),
        };
        Ok(ObjectHead {
            content_type: headers.content_type,
            content_length: meta.len(),
            cache_control: headers.cache_control,
        })
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let body = self.body_path(bucket, key)?;
        std::fs::read(body).map_err(|e| Self::map_missing(e, bucket, key))
    }

    fn put(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        options: &PutOptions,
    ) -> Result<(), StoreError> {
        let headers = StoredHeaders {
            content_type: Some(options.content_type.clone()),
            cache_control: options.cache_control.clone(),
        };
        write_atomic(&self.body_path(bucket, key)?, body)?;
        write_atomic(
            &self.headers_path(bucket, key)?,
            &serde_json::to_vec_pretty(&headers)?,
        )
    }
}

/// Metadata store keeping one JSON document per record.
#[derive(Debug, Clone)]
pub struct FsMetadataStore {
    dir: PathBuf,
}

impl FsMetadataStore {
    pub fn new(root: impl Into<PathBuf>, table: &str) -> Result<Self, StoreError> {
        let dir = root
            .into()
            .join("records")
            .join(relative_bucket_path(table)?);
        Ok(Self { dir })
    }

    fn record_path(&self, image_id: &str) -> PathBuf {
        let name = utf8_percent_encode(image_id, RECORD_NAME).to_string();
        self.dir.join(format!("{name}.json"))
    }

    fn read_record(path: &Path) -> Result<ImageRecord, StoreError> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn all_records(&self) -> Result<Vec<ImageRecord>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| StoreError::Io(e.into()))?;
            let path = entry.path();
            // Temp files end in `.tmp.<pid>`, so the extension check skips them.
            let is_record =
                entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "json");
            if is_record {
                records.push(Self::read_record(path)?);
            }
        }
        records.sort_by(|a, b| a.image_id.cmp(&b.image_id));
        Ok(records)
    }
}

impl MetadataStore for FsMetadataStore {
    fn upsert(&self, record: &ImageRecord) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.record_path(&record.image_id), &json)
    }

    fn get(&self, image_id: &str) -> Result<Option<ImageRecord>, StoreError> {
        match Self::read_record(&self.record_path(image_id)) {
            Ok(record) => Ok(Some(record)),
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Full directory walk on every call; cost grows with the table.
    fn scan(&self, request: &ScanRequest<'_>) -> Result<ScanPage, StoreError> {
        Ok(scan_sorted(self.all_records()?, request))
    }
}
