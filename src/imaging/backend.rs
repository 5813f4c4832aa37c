//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations the pipeline needs:
//! decode an uploaded buffer, and resize + encode one variant of it.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests use the recording `MockBackend` in this module so pipeline
//! logic can run without real pixels.

use super::params::ResizeParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// A decoded source image.
///
/// `raster` is whatever the backend needs to produce variants later; the rest
/// of the crate only looks at `dimensions` and `encoding`.
#[derive(Debug, Clone)]
pub struct Decoded<R> {
    pub raster: R,
    pub dimensions: Dimensions,
    /// MIME type of the detected source format, e.g. `image/png`.
    pub encoding: String,
}

/// Trait for image processing backends.
pub trait ImageBackend: Sync {
    /// Backend-specific decoded pixel data.
    type Raster: Sync;

    /// Decode raw bytes. Fails if the bytes are not a supported raster format.
    fn decode(&self, bytes: &[u8]) -> Result<Decoded<Self::Raster>, BackendError>;

    /// Resize to exactly `params.width` x `params.height` and encode as JPEG.
    fn encode_variant(
        &self,
        raster: &Self::Raster,
        params: &ResizeParams,
    ) -> Result<Vec<u8>, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::Quality;
    use std::sync::Mutex;

    /// Mock backend that records operations without touching pixels.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    ///
    /// Decoding pops from `decode_results`; an empty queue is a decode error.
    /// Encoding returns the ASCII bytes `"{width}x{height}"` so published
    /// objects can be checked for the dimensions they were encoded at.
    #[derive(Default)]
    pub struct MockBackend {
        pub decode_results: Mutex<Vec<Dimensions>>,
        pub encoding: Mutex<String>,
        pub encode_error: Mutex<Option<String>>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Decode { byte_len: usize },
        Encode { width: u32, height: u32, quality: u8 },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue decode results. Popped from the back, so list them last-first
        /// when more than one item is processed.
        pub fn with_dimensions(dims: Vec<Dimensions>) -> Self {
            Self {
                decode_results: Mutex::new(dims),
                encoding: Mutex::new("image/png".to_string()),
                ..Self::default()
            }
        }

        pub fn failing_encode(self, message: &str) -> Self {
            *self.encode_error.lock().unwrap() = Some(message.to_string());
            self
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn encoded_sizes(&self) -> Vec<(u32, u32)> {
            let mut sizes: Vec<(u32, u32)> = self
                .get_operations()
                .into_iter()
                .filter_map(|op| match op {
                    RecordedOp::Encode { width, height, .. } => Some((width, height)),
                    RecordedOp::Decode { .. } => None,
                })
                .collect();
            // rayon may encode variants in any order
            sizes.sort_unstable();
            sizes
        }
    }

    impl ImageBackend for MockBackend {
        type Raster = Dimensions;

        fn decode(&self, bytes: &[u8]) -> Result<Decoded<Dimensions>, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Decode {
                byte_len: bytes.len(),
            });

            let dims = self
                .decode_results
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| BackendError::ProcessingFailed("No mock dimensions".to_string()))?;
            Ok(Decoded {
                raster: dims,
                dimensions: dims,
                encoding: self.encoding.lock().unwrap().clone(),
            })
        }

        fn encode_variant(
            &self,
            _raster: &Dimensions,
            params: &ResizeParams,
        ) -> Result<Vec<u8>, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Encode {
                width: params.width,
                height: params.height,
                quality: params.quality.value(),
            });
            if let Some(message) = self.encode_error.lock().unwrap().clone() {
                return Err(BackendError::ProcessingFailed(message));
            }
            Ok(format!("{}x{}", params.width, params.height).into_bytes())
        }
    }

    #[test]
    fn mock_records_decode() {
        let backend = MockBackend::with_dimensions(vec![Dimensions {
            width: 800,
            height: 600,
        }]);

        let decoded = backend.decode(b"fake-bytes").unwrap();
        assert_eq!(decoded.dimensions.width, 800);
        assert_eq!(decoded.dimensions.height, 600);
        assert_eq!(decoded.encoding, "image/png");

        let ops = backend.get_operations();
        assert_eq!(ops, vec![RecordedOp::Decode { byte_len: 10 }]);
    }

    #[test]
    fn mock_decode_without_results_fails() {
        let backend = MockBackend::new();
        assert!(matches!(
            backend.decode(b"x"),
            Err(BackendError::ProcessingFailed(_))
        ));
    }

    #[test]
    fn mock_records_encode() {
        let backend = MockBackend::new();
        let bytes = backend
            .encode_variant(
                &Dimensions {
                    width: 10,
                    height: 10,
                },
                &ResizeParams {
                    width: 320,
                    height: 240,
                    quality: Quality::new(85),
                },
            )
            .unwrap();

        assert_eq!(bytes, b"320x240");
        assert!(matches!(
            &backend.get_operations()[0],
            RecordedOp::Encode {
                width: 320,
                height: 240,
                quality: 85
            }
        ));
    }

    #[test]
    fn mock_encode_failure() {
        let backend = MockBackend::new().failing_encode("disk full");
        let result = backend.encode_variant(
            &Dimensions {
                width: 1,
                height: 1,
            },
            &ResizeParams {
                width: 1,
                height: 1,
                quality: Quality::default(),
            },
        );
        assert!(matches!(result, Err(BackendError::ProcessingFailed(m)) if m == "disk full"));
    }
}
