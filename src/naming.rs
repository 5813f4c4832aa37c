//! Object key conventions shared by the pipeline and the read API.
//!
//! ## Keys in notifications
//!
//! Upload notifications carry keys URL-encoded with `+` for spaces, the way
//! object stores emit them. [`decode_object_key`] turns `raw/my+cat%21.png`
//! into `raw/my cat!.png` before anything else looks at the key.
//!
//! ## Identity
//!
//! The filename is the last `/`-separated segment of the decoded key, and it
//! doubles as the record id. Uploading `raw/cat.png` and later
//! `raw/2024/cat.png` therefore targets the same record and the same variant
//! keys; the second run overwrites the first.
//!
//! ## Published keys
//!
//! ```text
//! <public_prefix><folder>/<filename>
//! public/thumbs/cat.png
//! public/optimized/cat.png
//! ```
//!
//! Variant keys keep the original filename (including its extension) even
//! though variants are always JPEG; the stored content type is what clients
//! should trust.

use percent_encoding::percent_decode_str;
use std::str::Utf8Error;

/// Normalize a key as delivered in an upload notification.
///
/// `+` becomes a space first, then percent escapes are decoded. A literal
/// plus sign therefore has to arrive as `%2B`.
pub fn decode_object_key(raw: &str) -> Result<String, Utf8Error> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
}

/// Percent-decode an identifier taken from a request path or query string.
///
/// Unlike [`decode_object_key`], `+` is left alone. Invalid UTF-8 falls back
/// to the raw input so a lookup still reports what was tried.
pub fn decode_identifier(raw: &str) -> String {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Base name of an object key: everything after the last `/`.
pub fn filename_from_key(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Published location of a variant.
pub fn variant_key(public_prefix: &str, folder: &str, filename: &str) -> String {
    format!("{public_prefix}{folder}/{filename}")
}
