//! # img-ingest
//!
//! Ingests uploaded images into web-ready renditions and serves their metadata.
//!
//! An upload under the raw prefix (`raw/cat.png`) triggers the pipeline, which
//! checks the declared content type, decodes the pixels, produces a thumbnail
//! and an optimized JPEG, publishes them under the public prefix, and records
//! one metadata document keyed by filename. A small read API lists and looks up
//! those documents.
//!
//! # Architecture: Two Halves Sharing One Record
//!
//! ```text
//! Ingest   notification  →  validate → decode → variants → publish → record
//! Query    GET /images[/<id>]  →  list (paged) | lookup (get, then scan)
//! ```
//!
//! The halves share nothing but [`types::ImageRecord`] and the
//! [`store::MetadataStore`] it lives in. Both take their stores by reference,
//! so the same code runs against the in-memory stores in tests, the local
//! directory stores used by the CLI, or a deployment's own clients.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`event`] | Upload notification batches and key decoding |
//! | [`process`] | The staged ingestion pipeline, batch failure policy, progress events |
//! | [`query`] | Route dispatch, paged listing, lookup with fallback |
//! | [`imaging`] | Containment fit math, decode/encode backend, variant generation |
//! | [`store`] | Object and metadata store traits plus memory and filesystem implementations |
//! | [`config`] | `config.toml` loading, merging with stock defaults, validation |
//! | [`types`] | The persisted `ImageRecord` |
//! | [`naming`] | Key decoding, filename identity, published key layout |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Filename Is Identity
//!
//! The record id is the last segment of the upload key. Re-uploading a file
//! with the same name, from any folder, overwrites the same variant keys and
//! the same record. This keeps published URLs predictable from the filename
//! alone, at the cost of collisions between folders.
//!
//! ## Abort by Default
//!
//! The first failing item fails the whole batch so the trigger can redeliver
//! it. Items before it stay published and reprocessing is idempotent. Batches
//! that should keep going past bad uploads opt into
//! [`config::FailurePolicy::Isolate`].
//!
//! ## JPEG Everywhere
//!
//! Every variant is JPEG regardless of the source format. Alpha is dropped.
//! Variant keys keep the source filename, so the stored content type is what
//! clients should trust.

pub mod config;
pub mod event;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod process;
pub mod query;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
