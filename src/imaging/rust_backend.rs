//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Detect format | `image::guess_format` (magic bytes, not the declared content type) |
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::load_from_memory_with_format` |
//! | Resize | `DynamicImage::resize_exact` with `Triangle` (bilinear) filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` at the configured quality |
//!
//! Variants are always JPEG. Alpha is flattened away by converting to RGB8
//! first because the JPEG encoder rejects RGBA input.

use super::backend::{BackendError, Decoded, Dimensions, ImageBackend};
use super::params::{Quality, ResizeParams};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

/// Formats whose decoders are compiled in.
const DECODABLE_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

/// MIME types of the source formats this backend can decode.
pub fn supported_input_types() -> Vec<&'static str> {
    DECODABLE_FORMATS
        .iter()
        .filter(|fmt| fmt.reading_enabled())
        .map(|fmt| fmt.to_mime_type())
        .collect()
}

/// Backend built on the `image` crate.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn detect_format(bytes: &[u8]) -> Result<ImageFormat, BackendError> {
    let format = image::guess_format(bytes)
        .map_err(|e| BackendError::ProcessingFailed(format!("Unrecognized image data: {e}")))?;
    if !DECODABLE_FORMATS.contains(&format) {
        return Err(BackendError::ProcessingFailed(format!(
            "Unsupported image format: {}",
            format.to_mime_type()
        )));
    }
    Ok(format)
}

fn encode_jpeg(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value());
    rgb.write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {e}")))?;
    Ok(buf)
}

impl ImageBackend for RustBackend {
    type Raster = DynamicImage;

    fn decode(&self, bytes: &[u8]) -> Result<Decoded<DynamicImage>, BackendError> {
        let format = detect_format(bytes)?;
        let raster = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| BackendError::ProcessingFailed(format!("Failed to decode: {e}")))?;
        let (width, height) = raster.dimensions();
        Ok(Decoded {
            raster,
            dimensions: Dimensions { width, height },
            encoding: format.to_mime_type().to_string(),
        })
    }

    fn encode_variant(
        &self,
        raster: &DynamicImage,
        params: &ResizeParams,
    ) -> Result<Vec<u8>, BackendError> {
        if raster.dimensions() == (params.width, params.height) {
            return encode_jpeg(raster, params.quality);
        }
        let resized = raster.resize_exact(params.width, params.height, FilterType::Triangle);
        encode_jpeg(&resized, params.quality)
    }
}
