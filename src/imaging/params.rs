//! Parameter types for variant generation.
//!
//! These structs describe *what* to produce, not *how*. The
//! [`operations`](super::operations) module turns them into concrete resize
//! requests for the [`backend`](super::backend), which does the pixel work.
//!
//! ## Types
//!
//! - [`Quality`]: JPEG quality (0–100, default 85). Clamped on construction.
//! - [`Budget`]: A `WxH` bounding box a variant must fit inside.
//! - [`VariantSpec`]: A named budget plus the folder its output is published under.
//! - [`FitSettings`]: Quality and upscaling policy shared by every variant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Name of the small rendition.
pub const THUMBNAIL: &str = "thumbnail";
/// Name of the large rendition.
pub const OPTIMIZED: &str = "optimized";

/// Lossy encoding quality.
///
/// Accepts 0–100. The JPEG encoder rejects 0, so it is stored as 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid size budget {0:?}: expected WxH with positive integers, e.g. 320x320")]
pub struct BudgetParseError(pub String);

/// Maximum output dimensions for one variant, written `WxH` in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Budget {
    pub max_width: u32,
    pub max_height: u32,
}

impl Budget {
    pub const fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width,
            max_height,
        }
    }
}

impl FromStr for Budget {
    type Err = BudgetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let (w, h) = lower
            .split_once('x')
            .ok_or_else(|| BudgetParseError(s.to_string()))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .ok()
                .filter(|&n| n > 0)
                .ok_or_else(|| BudgetParseError(s.to_string()))
        };
        Ok(Self::new(parse(w)?, parse(h)?))
    }
}

impl TryFrom<String> for Budget {
    type Error = BudgetParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Budget> for String {
    fn from(budget: Budget) -> Self {
        budget.to_string()
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.max_width, self.max_height)
    }
}

/// A named rendition: its budget and the folder it is published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSpec {
    pub name: String,
    pub folder: String,
    pub budget: Budget,
}

/// Settings applied to every variant of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitSettings {
    pub quality: Quality,
    /// Allow scaling sources up to fill the budget. When false, sources that
    /// already fit are kept at their own size.
    pub allow_upscale: bool,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            quality: Quality::default(),
            allow_upscale: true,
        }
    }
}

/// Parameters for a single resize + encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeParams {
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
}
