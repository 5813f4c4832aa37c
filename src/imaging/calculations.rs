//! Pure calculation functions for variant dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::Budget;

/// Calculate containment-fit dimensions for a source inside a budget.
///
/// The scale factor is the smaller of `max_width / width` and
/// `max_height / height`, so the limiting side lands exactly on its bound and
/// the other side stays within its own. Aspect ratio is preserved up to
/// rounding; both outputs are at least 1px and never exceed the budget.
///
/// With `allow_upscale`, sources smaller than the budget are scaled up until a
/// side touches the box. Without it, they keep their own size.
///
/// # Examples
/// ```
/// # use img_ingest::imaging::{Budget, calculate_contain_dimensions};
/// // 800x600 into 320x320 → width limits → 320x240
/// assert_eq!(calculate_contain_dimensions((800, 600), Budget::new(320, 320), true), (320, 240));
///
/// // 800x600 into 1280x1280, upscaling allowed → 1280x960
/// assert_eq!(calculate_contain_dimensions((800, 600), Budget::new(1280, 1280), true), (1280, 960));
///
/// // same, shrink-only → unchanged
/// assert_eq!(calculate_contain_dimensions((800, 600), Budget::new(1280, 1280), false), (800, 600));
/// ```
pub fn calculate_contain_dimensions(
    source: (u32, u32),
    budget: Budget,
    allow_upscale: bool,
) -> (u32, u32) {
    let (src_w, src_h) = (source.0.max(1), source.1.max(1));
    let Budget {
        max_width,
        max_height,
    } = budget;

    let scale_w = max_width as f64 / src_w as f64;
    let scale_h = max_height as f64 / src_h as f64;
    let mut scale = scale_w.min(scale_h);
    if !allow_upscale {
        scale = scale.min(1.0);
    }

    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_width.max(1));
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_height.max(1));
    (w, h)
}
