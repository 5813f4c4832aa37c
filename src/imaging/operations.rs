//! High-level image operations.
//!
//! These functions combine calculations with backend execution: they take the
//! configured variant specs, compute concrete resize parameters, and call the
//! backend once per variant.

use super::backend::{BackendError, Decoded, Dimensions, ImageBackend};
use super::calculations::calculate_contain_dimensions;
use super::params::{FitSettings, ResizeParams, VariantSpec};
use rayon::prelude::*;
use tracing::debug;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// One encoded rendition, ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedVariant {
    pub name: String,
    pub folder: String,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Plan a variant without executing it.
pub fn plan_variant(source: Dimensions, spec: &VariantSpec, settings: &FitSettings) -> ResizeParams {
    let (width, height) = calculate_contain_dimensions(
        (source.width, source.height),
        spec.budget,
        settings.allow_upscale,
    );
    ResizeParams {
        width,
        height,
        quality: settings.quality,
    }
}

/// Produce one encoded buffer per spec.
///
/// Variants are encoded in parallel on the rayon pool and returned in the
/// order of `specs`. The first failure wins; no partial list is returned.
pub fn generate_variants<B: ImageBackend>(
    backend: &B,
    decoded: &Decoded<B::Raster>,
    specs: &[VariantSpec],
    settings: &FitSettings,
) -> Result<Vec<GeneratedVariant>> {
    specs
        .par_iter()
        .map(|spec| {
            let params = plan_variant(decoded.dimensions, spec, settings);
            let bytes = backend.encode_variant(&decoded.raster, &params)?;
            debug!(
                variant = %spec.name,
                width = params.width,
                height = params.height,
                bytes = bytes.len(),
                "variant encoded"
            );
            Ok(GeneratedVariant {
                name: spec.name.clone(),
                folder: spec.folder.clone(),
                width: params.width,
                height: params.height,
                bytes,
            })
        })
        .collect()
}
