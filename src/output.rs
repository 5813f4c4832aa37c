//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Ingest
//!
//! ```text
//! Batch (3 uploads)
//! 001 cat.png 800x600
//!     Source: raw/cat.png
//!     thumbnail: 320x240 → public/thumbs/cat.png (14.2 KB)
//!     optimized: 1280x960 → public/optimized/cat.png (210.7 KB)
//! 002 skipped
//!     Source: docs/readme.txt
//! 003 failed (received)
//!     Source: raw/notes.txt
//!     Error: raw/notes.txt: unsupported content type "text/plain"
//!
//! Processed 1, skipped 1, failed 1
//! ```
//!
//! ## Query
//!
//! ```text
//! 200 OK
//! {
//!   "items": [],
//!   "next": null
//! }
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::process::{BatchError, BatchReport, ProcessEvent};
use crate::query::ApiResponse;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn format_bytes(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "",
    }
}

// ============================================================================
// Ingest
// ============================================================================

/// Format one pipeline progress event.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::BatchStarted { item_count } => {
            let noun = if *item_count == 1 { "upload" } else { "uploads" };
            vec![format!("Batch ({} {})", item_count, noun)]
        }
        ProcessEvent::ItemSkipped { index, key } => vec![
            format!("{} skipped", format_index(*index)),
            format!("{}Source: {}", indent(1), key),
        ],
        ProcessEvent::ItemProcessed {
            index,
            image_id,
            key,
            width,
            height,
            variants,
        } => {
            let mut lines = vec![
                format!("{} {} {}x{}", format_index(*index), image_id, width, height),
                format!("{}Source: {}", indent(1), key),
            ];
            for variant in variants {
                lines.push(format!(
                    "{}{}: {}x{} \u{2192} {} ({})",
                    indent(1),
                    variant.name,
                    variant.width,
                    variant.height,
                    variant.key,
                    format_bytes(variant.byte_size)
                ));
            }
            lines
        }
        ProcessEvent::ItemFailed {
            index,
            key,
            stage,
            error,
        } => vec![
            format!("{} failed ({})", format_index(*index), stage),
            format!("{}Source: {}", indent(1), key),
            format!("{}Error: {}", indent(1), error),
        ],
    }
}

/// Closing summary line for a finished batch.
pub fn format_batch_report(report: &BatchReport) -> Vec<String> {
    vec![
        String::new(),
        format!(
            "Processed {}, skipped {}, failed {}",
            report.processed().count(),
            report.skipped_count(),
            report.failed_count()
        ),
    ]
}

pub fn print_batch_report(report: &BatchReport) {
    for line in format_batch_report(report) {
        println!("{}", line);
    }
}

/// Summary for a batch that stopped at a failing item.
pub fn format_batch_error(err: &BatchError) -> Vec<String> {
    vec![
        String::new(),
        format!(
            "Batch aborted at {} after {} completed item(s)",
            err.key,
            err.completed.len()
        ),
        format!("{}Stage: {}", indent(1), err.stage),
        format!("{}Error: {}", indent(1), err.source),
    ]
}

pub fn print_batch_error(err: &BatchError) {
    for line in format_batch_error(err) {
        println!("{}", line);
    }
}

// ============================================================================
// Query
// ============================================================================

/// Status line followed by the pretty-printed body.
pub fn format_response(response: &ApiResponse) -> Vec<String> {
    let status = match reason_phrase(response.status) {
        "" => response.status.to_string(),
        reason => format!("{} {}", response.status, reason),
    };
    let body =
        serde_json::to_string_pretty(&response.body).unwrap_or_else(|_| response.body_string());
    std::iter::once(status)
        .chain(body.lines().map(str::to_string))
        .collect()
}

pub fn print_response(response: &ApiResponse) {
    for line in format_response(response) {
        println!("{}", line);
    }
}
