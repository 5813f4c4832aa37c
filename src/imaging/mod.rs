//! Image processing in pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::guess_format` + `image::load_from_memory_with_format` |
//! | **Fit** | [`calculate_contain_dimensions`] |
//! | **Resize → JPEG** | `resize_exact` (bilinear) + `JpegEncoder` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Budgets, quality, and variant specs
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: [`generate_variants`], combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Decoded, Dimensions, ImageBackend};
pub use calculations::calculate_contain_dimensions;
pub use operations::{GeneratedVariant, generate_variants, plan_variant};
pub use params::{
    Budget, BudgetParseError, FitSettings, OPTIMIZED, Quality, ResizeParams, THUMBNAIL,
    VariantSpec,
};
pub use rust_backend::RustBackend;
