//! Service configuration.
//!
//! Handles loading, validating, and merging a `config.toml`. Stock defaults
//! are serialized to a TOML table, the user file (if any) is merged on top,
//! and the result is deserialized and validated. A user file only needs the
//! keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! bucket = "images"           # Bucket variants are published to
//! table = "ImageMetadata"     # Metadata table / collection name
//! raw_prefix = "raw/"         # Only uploads under this prefix are ingested
//! public_prefix = "public/"   # Variants are published under this prefix
//!
//! [variants]
//! thumbnail = "320x320"       # WxH budget, published under <public_prefix>thumbs/
//! optimized = "1280x1280"     # WxH budget, published under <public_prefix>optimized/
//! quality = 85                # JPEG quality (0-100)
//! allow_upscale = true        # Scale small sources up to fill the budget
//!
//! [ingest]
//! on_item_failure = "abort"   # "abort" ends the batch; "isolate" keeps going
//!
//! [processing]
//! max_processes = 4           # Max parallel encoders (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{Budget, FitSettings, OPTIMIZED, Quality, THUMBNAIL, VariantSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration loaded from `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Bucket variants are published to.
    pub bucket: String,
    /// Metadata table / collection name.
    pub table: String,
    /// Uploads outside this prefix are ignored.
    pub raw_prefix: String,
    /// Published variants live under this prefix.
    pub public_prefix: String,
    /// Variant budgets and encoding.
    pub variants: VariantsConfig,
    /// Batch failure behavior.
    pub ingest: IngestConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bucket: "images".to_string(),
            table: "ImageMetadata".to_string(),
            raw_prefix: "raw/".to_string(),
            public_prefix: "public/".to_string(),
            variants: VariantsConfig::default(),
            ingest: IngestConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::Validation("bucket must not be empty".into()));
        }
        if self.table.trim().is_empty() {
            return Err(ConfigError::Validation("table must not be empty".into()));
        }
        for (name, prefix) in [
            ("raw_prefix", &self.raw_prefix),
            ("public_prefix", &self.public_prefix),
        ] {
            if prefix.is_empty() || !prefix.ends_with('/') {
                return Err(ConfigError::Validation(format!(
                    "{name} must be non-empty and end with '/'"
                )));
            }
        }
        if self.raw_prefix == self.public_prefix {
            return Err(ConfigError::Validation(
                "raw_prefix and public_prefix must differ".into(),
            ));
        }
        if self.variants.quality > 100 {
            return Err(ConfigError::Validation(
                "variants.quality must be 0-100".into(),
            ));
        }
        Ok(())
    }

    /// The configured renditions, in publish order.
    pub fn variant_specs(&self) -> Vec<VariantSpec> {
        vec![
            VariantSpec {
                name: THUMBNAIL.to_string(),
                folder: "thumbs".to_string(),
                budget: self.variants.thumbnail,
            },
            VariantSpec {
                name: OPTIMIZED.to_string(),
                folder: "optimized".to_string(),
                budget: self.variants.optimized,
            },
        ]
    }

    pub fn fit_settings(&self) -> FitSettings {
        FitSettings {
            quality: Quality::new(self.variants.quality),
            allow_upscale: self.variants.allow_upscale,
        }
    }
}

/// Variant budgets and encoding settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VariantsConfig {
    pub thumbnail: Budget,
    pub optimized: Budget,
    /// JPEG quality (0 = worst, 100 = best).
    pub quality: u32,
    pub allow_upscale: bool,
}

impl Default for VariantsConfig {
    fn default() -> Self {
        Self {
            thumbnail: Budget::new(320, 320),
            optimized: Budget::new(1280, 1280),
            quality: 85,
            allow_upscale: true,
        }
    }
}

/// What a batch does when one of its items fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failure and fail the whole batch. Later items are
    /// left for redelivery.
    #[default]
    Abort,
    /// Record the failure and continue with the next item.
    Isolate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    pub on_item_failure: FailurePolicy,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel encoder threads.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(AppConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<AppConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: AppConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from a file, falling back to stock defaults when it is absent.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    resolve_config(stock_defaults_value(), load_raw_config(path)?)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# img-ingest configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# Bucket that published variants are written to.
bucket = "images"

# Metadata table / collection holding one record per image.
table = "ImageMetadata"

# Only uploads whose key starts with this prefix are ingested.
# Everything else in an upload notification is skipped silently.
raw_prefix = "raw/"

# Variants are published as <public_prefix><folder>/<filename>,
# e.g. public/thumbs/cat.png and public/optimized/cat.png.
public_prefix = "public/"

# ---------------------------------------------------------------------------
# Variants
# ---------------------------------------------------------------------------
[variants]
# Bounding boxes as WxH. Each variant is scaled to fit inside its box with
# the source aspect ratio preserved. No cropping.
thumbnail = "320x320"
optimized = "1280x1280"

# JPEG quality for every variant (0 = worst, 100 = best).
quality = 85

# Scale sources smaller than the box up until they touch it.
# Set to false to keep small sources at their own size.
allow_upscale = true

# ---------------------------------------------------------------------------
# Ingest
# ---------------------------------------------------------------------------
[ingest]
# "abort"   - the first failing item fails the whole batch; later items are
#             not attempted and are expected to be redelivered.
# "isolate" - failures are recorded per item and the batch continues.
on_item_failure = "abort"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel encoder threads.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = AppConfig::default();
        assert_eq!(config.bucket, "images");
        assert_eq!(config.table, "ImageMetadata");
        assert_eq!(config.raw_prefix, "raw/");
        assert_eq!(config.public_prefix, "public/");
        assert_eq!(config.variants.thumbnail, Budget::new(320, 320));
        assert_eq!(config.variants.optimized, Budget::new(1280, 1280));
        assert_eq!(config.variants.quality, 85);
        assert!(config.variants.allow_upscale);
        assert_eq!(config.ingest.on_item_failure, FailurePolicy::Abort);
    }

    #[test]
    fn variant_specs_use_thumbs_folder() {
        let specs = AppConfig::default().variant_specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "thumbnail");
        assert_eq!(specs[0].folder, "thumbs");
        assert_eq!(specs[1].name, "optimized");
        assert_eq!(specs[1].folder, "optimized");
        assert_eq!(specs[1].budget, Budget::new(1280, 1280));
    }

    #[test]
    fn fit_settings_follow_config() {
        let mut config = AppConfig::default();
        config.variants.quality = 70;
        config.variants.allow_upscale = false;
        let fit = config.fit_settings();
        assert_eq!(fit.quality.value(), 70);
        assert!(!fit.allow_upscale);
    }

    #[test]
    fn parse_partial_config() {
        let config: AppConfig = toml::from_str(
            r#"
bucket = "media"

[variants]
thumbnail = "150x100"
"#,
        )
        .unwrap();
        assert_eq!(config.bucket, "media");
        assert_eq!(config.variants.thumbnail, Budget::new(150, 100));
        // Unspecified defaults preserved
        assert_eq!(config.variants.optimized, Budget::new(1280, 1280));
        assert_eq!(config.raw_prefix, "raw/");
    }

    #[test]
    fn parse_isolate_policy() {
        let config: AppConfig = toml::from_str(
            r#"
[ingest]
on_item_failure = "isolate"
"#,
        )
        .unwrap();
        assert_eq!(config.ingest.on_item_failure, FailurePolicy::Isolate);
    }

    #[test]
    fn bad_budget_is_parse_error() {
        let result: Result<AppConfig, _> = toml::from_str(
            r#"
[variants]
thumbnail = "big"
"#,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("invalid size budget"), "{err}");
    }

    #[test]
    fn unknown_key_rejected() {
        let result: Result<AppConfig, _> = toml::from_str(
            r#"
[variants]
qualty = 90
"#,
        );
        assert!(result.unwrap_err().to_string().contains("unknown field"));
    }

    #[test]
    fn unknown_policy_rejected() {
        let result: Result<AppConfig, _> = toml::from_str(
            r#"
[ingest]
on_item_failure = "retry"
"#,
        );
        assert!(result.is_err());
    }

    // =========================================================================
    // validate tests
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_quality_boundary_ok() {
        let mut config = AppConfig::default();
        config.variants.quality = 100;
        assert!(config.validate().is_ok());
        config.variants.quality = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_quality_too_high() {
        let mut config = AppConfig::default();
        config.variants.quality = 101;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_empty_bucket() {
        let mut config = AppConfig::default();
        config.bucket = " ".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_prefix_needs_trailing_slash() {
        let mut config = AppConfig::default();
        config.raw_prefix = "raw".into();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("raw_prefix"), "{err}");
    }

    #[test]
    fn validate_prefixes_must_differ() {
        let mut config = AppConfig::default();
        config.public_prefix = "raw/".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // Processing config tests
    // =========================================================================

    #[test]
    fn effective_threads_bounded_by_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let threads = |max_processes| effective_threads(&ProcessingConfig { max_processes });
        assert_eq!(threads(None), cores);
        assert_eq!(threads(Some(99999)), cores);
        assert_eq!(threads(Some(1)), 1);
        assert_eq!(threads(Some(0)), 1);
    }

    // =========================================================================
    // Loading and merging
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
table = "Photos"

[variants]
optimized = "2048x2048"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.table, "Photos");
        assert_eq!(config.variants.optimized, Budget::new(2048, 2048));
        // Sibling keys in the overridden section keep their stock values.
        assert_eq!(config.variants.thumbnail, Budget::new(320, 320));
        assert_eq!(config.variants.quality, 85);
        assert_eq!(config.bucket, "images");
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "public_prefix = \"raw/\"\n").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: AppConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        assert!(content.contains("[variants]"));
        assert!(content.contains("[ingest]"));
        assert!(content.contains("[processing]"));
    }
}
