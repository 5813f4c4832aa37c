//! The ingestion pipeline.
//!
//! Turns a batch of upload notifications into published variants plus one
//! metadata record per image. Each item walks a linear sequence of stages:
//!
//! ```text
//! Received → ContentValidated → Decoded → VariantsGenerated
//!          → VariantsPublished → MetadataPersisted → Done
//! ```
//!
//! | Stage transition | Work | Store calls |
//! |---|---|---|
//! | Received → ContentValidated | [`validate_content_type`] | one `head` |
//! | ContentValidated → Decoded | fetch body, [`ImageBackend::decode`] | one `get` |
//! | Decoded → VariantsGenerated | [`generate_variants`] | none |
//! | VariantsGenerated → VariantsPublished | [`publish_variant`] per variant | one `put` each |
//! | VariantsPublished → MetadataPersisted | [`write_metadata`] | one `upsert` |
//!
//! Stage functions return `Result<_, ProcessError>`; the batch loop in
//! [`Pipeline::process_batch`] inspects each result and applies the configured
//! [`FailurePolicy`]:
//!
//! - **abort** (default): the first failure ends the batch with a
//!   [`BatchError`]. Items after it are not attempted, so the whole batch can
//!   be redelivered. Items before it stay published; reprocessing them
//!   overwrites the same keys and record.
//! - **isolate**: the failure is recorded as [`ItemOutcome::Failed`] and the
//!   loop moves on.
//!
//! A failure after variants are published leaves those objects in place with
//! no record pointing at them. There is no cleanup and no retry.
//!
//! ## Progress events
//!
//! When given a `Sender<ProcessEvent>`, the pipeline reports each item as it
//! finishes. The CLI prints them via [`crate::output::format_process_event`].

use crate::config::{AppConfig, FailurePolicy};
use crate::event::Upload;
use crate::imaging::{
    BackendError, FitSettings, GeneratedVariant, ImageBackend, VariantSpec, generate_variants,
};
use crate::naming::{filename_from_key, variant_key};
use crate::store::{MetadataStore, ObjectStore, PutOptions, StoreError};
use crate::types::{ImageRecord, OriginalImage, VariantLocation};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Content type of every published variant.
pub const VARIANT_CONTENT_TYPE: &str = "image/jpeg";
/// Cache directive of every published variant. Keys are stable per filename,
/// but a variant is only rewritten when its source is re-uploaded.
pub const VARIANT_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("{key}: unsupported content type {content_type:?}")]
    UnsupportedContentType { key: String, content_type: String },
    #[error("{key}: could not decode image: {source}")]
    Decode {
        key: String,
        #[source]
        source: BackendError,
    },
    #[error("{key}: could not encode variant: {source}")]
    Encode {
        key: String,
        #[source]
        source: BackendError,
    },
    #[error("{key}: store read failed: {source}")]
    StoreRead {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("{key}: store write failed: {source}")]
    StoreWrite {
        key: String,
        #[source]
        source: StoreError,
    },
}

/// Where an item is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    ContentValidated,
    Decoded,
    VariantsGenerated,
    VariantsPublished,
    MetadataPersisted,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::ContentValidated => "content validated",
            Stage::Decoded => "decoded",
            Stage::VariantsGenerated => "variants generated",
            Stage::VariantsPublished => "variants published",
            Stage::MetadataPersisted => "metadata persisted",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Source of `uploadedAt` timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ============================================================================
// Stage functions
// ============================================================================

/// Check the declared content type of `bucket/key` with a single `head` call.
///
/// Returns the lower-cased content type. Anything not starting with `image/`
/// (including a missing type) is rejected.
pub fn validate_content_type(
    objects: &dyn ObjectStore,
    bucket: &str,
    key: &str,
) -> Result<String, ProcessError> {
    let head = objects
        .head(bucket, key)
        .map_err(|source| ProcessError::StoreRead {
            key: key.to_string(),
            source,
        })?;
    let content_type = head.content_type.unwrap_or_default().to_ascii_lowercase();
    if !content_type.starts_with("image/") {
        return Err(ProcessError::UnsupportedContentType {
            key: key.to_string(),
            content_type,
        });
    }
    Ok(content_type)
}

/// Write one encoded variant to `bucket/key` and return the key.
pub fn publish_variant(
    objects: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    variant: &GeneratedVariant,
) -> Result<String, ProcessError> {
    let options = PutOptions {
        content_type: VARIANT_CONTENT_TYPE.to_string(),
        cache_control: Some(VARIANT_CACHE_CONTROL.to_string()),
    };
    objects
        .put(bucket, key, &variant.bytes, &options)
        .map_err(|source| ProcessError::StoreWrite {
            key: key.to_string(),
            source,
        })?;
    Ok(key.to_string())
}

/// Build the record for a processed image and upsert it.
///
/// `variants` maps variant name to published key. The record is keyed by the
/// filename, so a re-upload replaces the previous record.
pub fn write_metadata(
    metadata: &dyn MetadataStore,
    original: OriginalImage,
    variants: &BTreeMap<String, String>,
    uploaded_at: DateTime<Utc>,
) -> Result<ImageRecord, ProcessError> {
    let filename = filename_from_key(&original.key).to_string();
    let record = ImageRecord {
        image_id: filename.clone(),
        filename,
        uploaded_at,
        variants: variants
            .iter()
            .map(|(name, key)| (name.clone(), VariantLocation { key: key.clone() }))
            .collect(),
        original,
    };
    metadata
        .upsert(&record)
        .map_err(|source| ProcessError::StoreWrite {
            key: record.original.key.clone(),
            source,
        })?;
    Ok(record)
}

// ============================================================================
// Outcomes and events
// ============================================================================

/// Result of one notification in a batch.
#[derive(Debug)]
pub enum ItemOutcome {
    Processed(ImageRecord),
    /// Key outside the raw prefix, or with no filename. Not an error.
    Skipped { bucket: String, key: String },
    /// Only produced under [`FailurePolicy::Isolate`].
    Failed {
        key: String,
        stage: Stage,
        error: ProcessError,
    },
}

/// Everything a batch did, in delivery order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedSummary {
    pub image_id: String,
    pub thumb_key: Option<String>,
    pub opt_key: Option<String>,
}

/// The batch response body: `{"processed": [{imageId, thumbKey, optKey}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub processed: Vec<ProcessedSummary>,
}

impl BatchReport {
    pub fn processed(&self) -> impl Iterator<Item = &ImageRecord> {
        self.outcomes.iter().filter_map(|o| match o {
            ItemOutcome::Processed(record) => Some(record),
            _ => None,
        })
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::Failed { .. }))
            .count()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            processed: self
                .processed()
                .map(|record| ProcessedSummary {
                    image_id: record.image_id.clone(),
                    thumb_key: record.variant_key(crate::imaging::THUMBNAIL).map(str::to_string),
                    opt_key: record.variant_key(crate::imaging::OPTIMIZED).map(str::to_string),
                })
                .collect(),
        }
    }
}

/// A batch stopped by an item failure under [`FailurePolicy::Abort`].
#[derive(Error, Debug)]
#[error("batch aborted at {key} (last stage reached: {stage}): {source}")]
pub struct BatchError {
    pub key: String,
    /// The last stage the item reached before failing.
    pub stage: Stage,
    #[source]
    pub source: ProcessError,
    /// Outcomes of the items handled before the failure.
    pub completed: Vec<ItemOutcome>,
}

/// Per-variant detail carried by [`ProcessEvent::ItemProcessed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantInfo {
    pub name: String,
    pub key: String,
    pub width: u32,
    pub height: u32,
    pub byte_size: usize,
}

/// Progress events for the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    BatchStarted {
        item_count: usize,
    },
    ItemSkipped {
        index: usize,
        key: String,
    },
    ItemProcessed {
        index: usize,
        image_id: String,
        key: String,
        width: u32,
        height: u32,
        variants: Vec<VariantInfo>,
    },
    ItemFailed {
        index: usize,
        key: String,
        stage: Stage,
        error: String,
    },
}

// ============================================================================
// Pipeline
// ============================================================================

/// Everything the pipeline reads from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Bucket variants are published to.
    pub bucket: String,
    pub raw_prefix: String,
    pub public_prefix: String,
    pub variants: Vec<VariantSpec>,
    pub fit: FitSettings,
    pub on_item_failure: FailurePolicy,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            bucket: config.bucket.clone(),
            raw_prefix: config.raw_prefix.clone(),
            public_prefix: config.public_prefix.clone(),
            variants: config.variant_specs(),
            fit: config.fit_settings(),
            on_item_failure: config.ingest.on_item_failure,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Item failure paired with the stage it had reached.
struct StageFailure {
    stage: Stage,
    error: ProcessError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, StageFailure>;
}

impl<T> AtStage<T> for Result<T, ProcessError> {
    fn at(self, stage: Stage) -> Result<T, StageFailure> {
        self.map_err(|error| StageFailure { stage, error })
    }
}

/// The ingestion pipeline with its collaborators injected.
pub struct Pipeline<'a, B: ImageBackend> {
    objects: &'a dyn ObjectStore,
    metadata: &'a dyn MetadataStore,
    backend: &'a B,
    clock: &'a dyn Clock,
    settings: PipelineSettings,
    events: Option<Sender<ProcessEvent>>,
}

impl<'a, B: ImageBackend> Pipeline<'a, B> {
    pub fn new(
        objects: &'a dyn ObjectStore,
        metadata: &'a dyn MetadataStore,
        backend: &'a B,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            objects,
            metadata,
            backend,
            clock: &SystemClock,
            settings,
            events: None,
        }
    }

    pub fn with_clock(mut self, clock: &'a dyn Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: Sender<ProcessEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: ProcessEvent) {
        if let Some(tx) = &self.events {
            // The receiver going away only silences progress output.
            tx.send(event).ok();
        }
    }

    /// Process every upload of a batch, in order.
    ///
    /// Notifications are decoded into uploads with
    /// [`NotificationBatch::uploads`](crate::event::NotificationBatch::uploads) first.
    pub fn process_batch(&self, uploads: &[Upload]) -> Result<BatchReport, BatchError> {
        info!(items = uploads.len(), "batch started");
        self.emit(ProcessEvent::BatchStarted {
            item_count: uploads.len(),
        });

        let mut report = BatchReport::default();
        for (index, upload) in uploads.iter().enumerate() {
            let position = index + 1;

            if !self.should_process(&upload.key) {
                debug!(key = %upload.key, "skipping key outside raw prefix");
                self.emit(ProcessEvent::ItemSkipped {
                    index: position,
                    key: upload.key.clone(),
                });
                report.outcomes.push(ItemOutcome::Skipped {
                    bucket: upload.bucket.clone(),
                    key: upload.key.clone(),
                });
                continue;
            }

            match self.process_item(position, upload) {
                Ok(record) => report.outcomes.push(ItemOutcome::Processed(record)),
                Err(StageFailure { stage, error }) => {
                    self.emit(ProcessEvent::ItemFailed {
                        index: position,
                        key: upload.key.clone(),
                        stage,
                        error: error.to_string(),
                    });
                    match self.settings.on_item_failure {
                        FailurePolicy::Abort => {
                            error!(key = %upload.key, %stage, error = %error, "item failed, aborting batch");
                            return Err(BatchError {
                                key: upload.key.clone(),
                                stage,
                                source: error,
                                completed: report.outcomes,
                            });
                        }
                        FailurePolicy::Isolate => {
                            warn!(key = %upload.key, %stage, error = %error, "item failed, continuing");
                            report.outcomes.push(ItemOutcome::Failed {
                                key: upload.key.clone(),
                                stage,
                                error,
                            });
                        }
                    }
                }
            }
        }

        info!(
            processed = report.processed().count(),
            skipped = report.skipped_count(),
            failed = report.failed_count(),
            "batch finished"
        );
        Ok(report)
    }

    fn should_process(&self, key: &str) -> bool {
        key.starts_with(&self.settings.raw_prefix) && !filename_from_key(key).is_empty()
    }

    fn process_item(&self, index: usize, upload: &Upload) -> Result<ImageRecord, StageFailure> {
        let Upload { bucket, key } = upload;
        let mut stage = Stage::Received;
        debug!(%key, %stage, "stage reached");

        validate_content_type(self.objects, bucket, key).at(stage)?;
        stage = Stage::ContentValidated;
        debug!(%key, %stage, "stage reached");

        let bytes = self
            .objects
            .get(bucket, key)
            .map_err(|source| ProcessError::StoreRead {
                key: key.clone(),
                source,
            })
            .at(stage)?;
        let decoded = self
            .backend
            .decode(&bytes)
            .map_err(|source| ProcessError::Decode {
                key: key.clone(),
                source,
            })
            .at(stage)?;
        stage = Stage::Decoded;
        debug!(
            %key,
            %stage,
            width = decoded.dimensions.width,
            height = decoded.dimensions.height,
            "stage reached"
        );

        let generated = generate_variants(
            self.backend,
            &decoded,
            &self.settings.variants,
            &self.settings.fit,
        )
        .map_err(|source| ProcessError::Encode {
            key: key.clone(),
            source,
        })
        .at(stage)?;
        stage = Stage::VariantsGenerated;
        debug!(%key, %stage, "stage reached");

        let filename = filename_from_key(key);
        let mut published = BTreeMap::new();
        let mut infos = Vec::with_capacity(generated.len());
        for variant in &generated {
            let target = variant_key(&self.settings.public_prefix, &variant.folder, filename);
            let written =
                publish_variant(self.objects, &self.settings.bucket, &target, variant).at(stage)?;
            infos.push(VariantInfo {
                name: variant.name.clone(),
                key: written.clone(),
                width: variant.width,
                height: variant.height,
                byte_size: variant.bytes.len(),
            });
            published.insert(variant.name.clone(), written);
        }
        stage = Stage::VariantsPublished;
        debug!(%key, %stage, "stage reached");

        let original = OriginalImage {
            bucket: bucket.clone(),
            key: key.clone(),
            byte_size: bytes.len() as u64,
            width: decoded.dimensions.width,
            height: decoded.dimensions.height,
            encoding: decoded.encoding.clone(),
        };
        let record =
            write_metadata(self.metadata, original, &published, self.clock.now()).at(stage)?;
        stage = Stage::MetadataPersisted;
        debug!(%key, %stage, "stage reached");

        info!(%key, image_id = %record.image_id, stage = %Stage::Done, "image processed");
        self.emit(ProcessEvent::ItemProcessed {
            index,
            image_id: record.image_id.clone(),
            key: key.clone(),
            width: decoded.dimensions.width,
            height: decoded.dimensions.height,
            variants: infos,
        });
        Ok(record)
    }
}
